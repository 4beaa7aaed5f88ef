//! Business hours gate

use cadence_common::types::ActiveDays;
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Whether `now` falls on an active weekday inside `[start_hour, end_hour)`
/// local time in `tz`
pub fn is_business_hours(
    tz: Tz,
    active_days: ActiveDays,
    start_hour: u32,
    end_hour: u32,
    now: DateTime<Utc>,
) -> bool {
    let local = now.with_timezone(&tz);
    let hour = local.hour();
    active_days.contains(local.weekday()) && hour >= start_hour && hour < end_hour
}

/// Gate result with a display label, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessHoursStatus {
    pub is_business_hours: bool,
    /// "Business hours", "Inactive day" or "Outside hours"
    pub label: &'static str,
    /// Local wall-clock time, `HH:MM`
    pub local_time: String,
}

pub fn business_hours_status(
    tz: Tz,
    active_days: ActiveDays,
    start_hour: u32,
    end_hour: u32,
    now: DateTime<Utc>,
) -> BusinessHoursStatus {
    let local = now.with_timezone(&tz);
    let open = is_business_hours(tz, active_days, start_hour, end_hour, now);

    let label = if open {
        "Business hours"
    } else if !active_days.contains(local.weekday()) {
        "Inactive day"
    } else {
        "Outside hours"
    };

    BusinessHoursStatus {
        is_business_hours: open,
        label,
        local_time: local.format("%H:%M").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_window_is_half_open() {
        // 2024-01-03 is a Wednesday
        let nine = Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        let five = Utc.with_ymd_and_hms(2024, 1, 3, 17, 0, 0).unwrap();
        let before_five = Utc.with_ymd_and_hms(2024, 1, 3, 16, 59, 59).unwrap();

        assert!(is_business_hours(Tz::UTC, ActiveDays::weekdays(), 9, 17, nine));
        assert!(is_business_hours(Tz::UTC, ActiveDays::weekdays(), 9, 17, before_five));
        assert!(!is_business_hours(Tz::UTC, ActiveDays::weekdays(), 9, 17, five));
    }

    #[test]
    fn test_inactive_day_is_closed_at_any_hour() {
        let days = ActiveDays::from_days([Weekday::Mon, Weekday::Tue]);
        // 2024-01-03 is a Wednesday
        for hour in 0..24 {
            let now = Utc.with_ymd_and_hms(2024, 1, 3, hour, 30, 0).unwrap();
            assert!(!is_business_hours(Tz::UTC, days, 0, 24, now));
        }
    }

    #[test]
    fn test_uses_local_time() {
        // Monday 23:00 UTC is Tuesday 10:00 in Sydney (AEDT)
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        let tuesday_only = ActiveDays::from_days([Weekday::Tue]);
        assert!(is_business_hours(Tz::Australia__Sydney, tuesday_only, 9, 17, now));
        assert!(!is_business_hours(Tz::UTC, tuesday_only, 9, 17, now));
    }

    #[test]
    fn test_status_labels() {
        // Saturday noon
        let saturday = Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap();
        let status = business_hours_status(Tz::UTC, ActiveDays::weekdays(), 9, 17, saturday);
        assert_eq!(status.label, "Inactive day");
        assert_eq!(status.local_time, "12:00");

        let evening = Utc.with_ymd_and_hms(2024, 1, 3, 20, 15, 0).unwrap();
        let status = business_hours_status(Tz::UTC, ActiveDays::weekdays(), 9, 17, evening);
        assert_eq!(status.label, "Outside hours");
        assert!(!status.is_business_hours);

        let morning = Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap();
        let status = business_hours_status(Tz::UTC, ActiveDays::weekdays(), 9, 17, morning);
        assert_eq!(status.label, "Business hours");
    }
}
