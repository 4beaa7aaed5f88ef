//! Send scheduling
//!
//! Pure functions deciding when a contact's next sequence email goes out,
//! whether an instant is inside a campaign's sending window, and which
//! sender identity takes the email.

pub mod business_hours;
pub mod rotation;
pub mod timezone;
pub mod timing;

pub use business_hours::{business_hours_status, is_business_hours, BusinessHoursStatus};
pub use rotation::{pick_sender, pick_sender_excluding, NoAvailableSender};
pub use timezone::{derive_timezone, parse_timezone, resolve_timezone};
pub use timing::{derived_send_time, next_send, NextSend};

use cadence_common::config::SchedulingConfig;
use cadence_common::types::ActiveDays;
use cadence_storage::models::CampaignSettings;
use chrono_tz::Tz;
use thiserror::Error;

/// Campaign configuration that leaves nothing to schedule
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("invalid active days: {0}")]
    InvalidActiveDays(String),

    #[error("no active days configured")]
    NoActiveDays,

    #[error("invalid sending window: {0}")]
    InvalidWindow(String),

    #[error("unknown default timezone: {0}")]
    UnknownTimezone(String),
}

/// Effective sending policy of one campaign
#[derive(Debug, Clone, PartialEq)]
pub struct SendingPolicy {
    pub active_days: ActiveDays,
    pub start_hour: u32,
    pub end_hour: u32,
    /// Delay for follow-up steps without `timing_days`
    pub default_follow_up_days: i64,
    pub default_timezone: Tz,
    pub daily_contacts_limit: i64,
}

impl SendingPolicy {
    /// Merge stored campaign settings over configured defaults
    pub fn resolve(
        settings: Option<&CampaignSettings>,
        config: &SchedulingConfig,
    ) -> Result<Self, SchedulingError> {
        let default_timezone = parse_timezone(&config.default_timezone)
            .ok_or_else(|| SchedulingError::UnknownTimezone(config.default_timezone.clone()))?;

        let (active_days, (start_hour, end_hour), daily_limit) = match settings {
            Some(s) => (
                s.parsed_active_days()
                    .map_err(SchedulingError::InvalidActiveDays)?,
                s.window(config.business_start_hour, config.business_end_hour)
                    .map_err(SchedulingError::InvalidWindow)?,
                s.daily_contacts_limit
                    .unwrap_or(config.default_daily_contacts_limit),
            ),
            None => (
                ActiveDays::default(),
                (config.business_start_hour, config.business_end_hour),
                config.default_daily_contacts_limit,
            ),
        };

        if active_days.is_empty() {
            return Err(SchedulingError::NoActiveDays);
        }
        if start_hour >= end_hour || end_hour > 24 {
            return Err(SchedulingError::InvalidWindow(format!(
                "{}..{}",
                start_hour, end_hour
            )));
        }

        Ok(Self {
            active_days,
            start_hour,
            end_hour,
            default_follow_up_days: config.default_follow_up_days.max(0),
            default_timezone,
            daily_contacts_limit: i64::from(daily_limit.max(0)),
        })
    }
}

impl Default for SendingPolicy {
    fn default() -> Self {
        Self {
            active_days: ActiveDays::weekdays(),
            start_hour: 9,
            end_hour: 17,
            default_follow_up_days: 1,
            default_timezone: Tz::UTC,
            daily_contacts_limit: 35,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Utc, Weekday};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn settings(days: &[&str], start: Option<&str>, end: Option<&str>) -> CampaignSettings {
        CampaignSettings {
            campaign_id: Uuid::new_v4(),
            active_days: days.iter().map(|d| d.to_string()).collect(),
            sending_start_time: start.map(String::from),
            sending_end_time: end.map(String::from),
            daily_contacts_limit: Some(10),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_defaults_without_settings() {
        let policy = SendingPolicy::resolve(None, &SchedulingConfig::default()).unwrap();
        assert_eq!(policy, SendingPolicy::default());
    }

    #[test]
    fn test_settings_override_defaults() {
        let s = settings(&["Sat", "Sun"], Some("10:00"), Some("14:30"));
        let policy = SendingPolicy::resolve(Some(&s), &SchedulingConfig::default()).unwrap();
        assert_eq!(policy.active_days, ActiveDays::from_days([Weekday::Sat, Weekday::Sun]));
        assert_eq!((policy.start_hour, policy.end_hour), (10, 14));
        assert_eq!(policy.daily_contacts_limit, 10);
    }

    #[test]
    fn test_configuration_errors() {
        let config = SchedulingConfig::default();
        assert_eq!(
            SendingPolicy::resolve(Some(&settings(&[], None, None)), &config),
            Err(SchedulingError::NoActiveDays)
        );
        assert!(matches!(
            SendingPolicy::resolve(Some(&settings(&["Mon"], Some("17:00"), Some("09:00"))), &config),
            Err(SchedulingError::InvalidWindow(_))
        ));
        assert!(matches!(
            SendingPolicy::resolve(Some(&settings(&["Caturday"], None, None)), &config),
            Err(SchedulingError::InvalidActiveDays(_))
        ));

        let bad_tz = SchedulingConfig {
            default_timezone: "Mars/Olympus".into(),
            ..SchedulingConfig::default()
        };
        assert!(matches!(
            SendingPolicy::resolve(None, &bad_tz),
            Err(SchedulingError::UnknownTimezone(_))
        ));
    }
}
