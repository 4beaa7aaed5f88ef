//! Next-send computation
//!
//! Every contact gets a stable local time of day derived from its id, so a
//! recomputation with unchanged contact state always lands on the same
//! instant. Only `due_now` depends on the current time.

use super::business_hours::is_business_hours;
use super::timezone::resolve_timezone;
use super::SendingPolicy;
use cadence_common::types::ActiveDays;
use cadence_common::Error;
use cadence_storage::models::{Contact, SequenceStep};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;

/// When and whether to send a contact's next sequence step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextSend {
    /// Scheduled time has passed and the business-hours gate is open
    pub due_now: bool,
    pub scheduled_at: DateTime<Utc>,
    /// Step that will be sent
    pub step_number: i32,
    /// IANA name of the timezone used
    pub timezone: String,
    /// `scheduled_at` as local wall-clock time
    pub local_send_time: String,
}

/// 31-multiplier string hash with 32-bit wrapping
pub(crate) fn contact_hash(value: &str) -> i32 {
    value
        .chars()
        .fold(0i32, |hash, c| hash.wrapping_mul(31).wrapping_add(c as i32))
}

/// Stable local send time for a contact inside `[start_hour, end_hour)`
pub fn derived_send_time(contact_id: &str, start_hour: u32, end_hour: u32) -> NaiveTime {
    let seed = (i64::from(contact_hash(contact_id)) + 1).rem_euclid(1000);
    let span = i64::from(end_hour.saturating_sub(start_hour).max(1));
    let hour = i64::from(start_hour) + seed % span;
    let minute = (seed * 7) % 60;
    NaiveTime::from_hms_opt(hour as u32, minute as u32, 0).unwrap_or_default()
}

/// Local date and time in `tz` as a UTC instant. Ambiguous times take the
/// earlier instant; times inside a DST gap move to the end of the gap.
pub(crate) fn localize(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let mut local = date.and_time(time);
    for _ in 0..(24 * 60) {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(t) => return t.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => local += Duration::minutes(1),
        }
    }
    Utc.from_utc_datetime(&local)
}

/// First date on or after `date` whose weekday is active
fn next_active_date(date: NaiveDate, active_days: ActiveDays) -> NaiveDate {
    let mut candidate = date;
    for _ in 0..7 {
        if active_days.contains(chrono::Datelike::weekday(&candidate)) {
            return candidate;
        }
        candidate += Duration::days(1);
    }
    candidate
}

/// Compute the contact's next send, or `None` when nothing is left to send.
///
/// `steps` must be ordered by `step_number`; the contact's `sequence_step`
/// counts the steps already sent.
pub fn next_send(
    contact: &Contact,
    steps: &[SequenceStep],
    policy: &SendingPolicy,
    now: DateTime<Utc>,
) -> Option<NextSend> {
    if contact.is_terminal() || policy.active_days.is_empty() {
        return None;
    }

    let sent = contact.steps_sent();
    let step = steps.get(sent)?;

    let tz = resolve_timezone(
        contact.timezone.as_deref(),
        contact.location.as_deref(),
        policy.default_timezone,
    );
    let send_time = derived_send_time(&contact.id.to_string(), policy.start_hour, policy.end_hour);

    let timing_days = match step.timing_days {
        Some(days) => i64::from(days.max(0)),
        None if sent == 0 => 0,
        None => policy.default_follow_up_days,
    };

    let anchor = if sent == 0 {
        let enrolled = contact.created_at.with_timezone(&tz).date_naive();
        if timing_days == 0 {
            // same day if the slot is still ahead of enrollment, else the next day
            if localize(tz, enrolled, send_time) <= contact.created_at {
                enrolled + Duration::days(1)
            } else {
                enrolled
            }
        } else {
            enrolled + Duration::days(timing_days)
        }
    } else {
        let last = match contact.last_contacted_at {
            Some(at) => at,
            None => {
                let issue = Error::DataIntegrity(format!(
                    "contact {} is at step {} without last_contacted_at",
                    contact.id, contact.sequence_step
                ));
                warn!(error = %issue, "Anchoring follow-up on now");
                now
            }
        };
        last.with_timezone(&tz).date_naive() + Duration::days(timing_days)
    };

    let date = next_active_date(anchor, policy.active_days);
    let scheduled_at = localize(tz, date, send_time);
    let due_now = now >= scheduled_at
        && is_business_hours(
            tz,
            policy.active_days,
            policy.start_hour,
            policy.end_hour,
            now,
        );

    Some(NextSend {
        due_now,
        scheduled_at,
        step_number: step.step_number,
        timezone: tz.name().to_string(),
        local_send_time: scheduled_at
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
    })
}
