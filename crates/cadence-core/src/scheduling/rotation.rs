//! Sender rotation
//!
//! Least-recently-used selection among senders with remaining daily
//! capacity. The pick is advisory; the caller must claim the send through
//! `SenderRepository::claim_send` and re-pick if the claim is lost.

use cadence_common::types::SenderId;
use cadence_storage::models::CampaignSender;
use chrono::NaiveDate;
use thiserror::Error;

/// Every sender is inactive or at its daily limit
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no available sender ({considered} considered)")]
pub struct NoAvailableSender {
    pub considered: usize,
}

/// Pick the eligible sender used longest ago. Never-used senders come
/// first; ties keep list order.
pub fn pick_sender(
    senders: &[CampaignSender],
    today: NaiveDate,
) -> Result<&CampaignSender, NoAvailableSender> {
    pick_sender_excluding(senders, today, &[])
}

/// Same as [`pick_sender`], skipping senders whose claim was already lost
pub fn pick_sender_excluding<'a>(
    senders: &'a [CampaignSender],
    today: NaiveDate,
    excluded: &[SenderId],
) -> Result<&'a CampaignSender, NoAvailableSender> {
    senders
        .iter()
        .filter(|s| s.has_capacity(today) && !excluded.contains(&s.id))
        .min_by_key(|s| s.last_used_at)
        .ok_or(NoAvailableSender {
            considered: senders.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
    }

    fn sender(email: &str, sent: i32, last_used_hour: Option<u32>) -> CampaignSender {
        CampaignSender {
            id: Uuid::new_v4(),
            campaign_id: Uuid::nil(),
            user_id: Uuid::nil(),
            email: email.into(),
            name: None,
            auth_type: "smtp".into(),
            daily_limit: 50,
            emails_sent_today: sent,
            counter_date: Some(today()),
            last_used_at: last_used_hour.map(|h| Utc.with_ymd_and_hms(2024, 1, 3, h, 0, 0).unwrap()),
            rotation_priority: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_picks_least_recently_used() {
        let senders = vec![
            sender("a@x.com", 3, Some(10)),
            sender("b@x.com", 1, Some(8)),
            sender("c@x.com", 9, Some(9)),
        ];
        assert_eq!(pick_sender(&senders, today()).unwrap().email, "b@x.com");
    }

    #[test]
    fn test_never_used_first_and_ties_keep_order() {
        let senders = vec![
            sender("a@x.com", 0, Some(8)),
            sender("b@x.com", 0, None),
            sender("c@x.com", 0, None),
        ];
        assert_eq!(pick_sender(&senders, today()).unwrap().email, "b@x.com");
    }

    #[test]
    fn test_all_at_limit() {
        let senders: Vec<_> = (0..3)
            .map(|i| sender(&format!("s{}@x.com", i), 50, None))
            .collect();
        assert_eq!(
            pick_sender(&senders, today()).err(),
            Some(NoAvailableSender { considered: 3 })
        );
        assert!(pick_sender(&[], today()).is_err());
    }

    #[test]
    fn test_skips_inactive_and_stale_counters_reset() {
        let mut inactive = sender("a@x.com", 0, None);
        inactive.is_active = false;
        let mut yesterday_full = sender("b@x.com", 50, Some(12));
        yesterday_full.counter_date = today().pred_opt();
        let senders = vec![inactive, yesterday_full];
        assert_eq!(pick_sender(&senders, today()).unwrap().email, "b@x.com");
    }

    #[test]
    fn test_exclusion() {
        let senders = vec![sender("a@x.com", 0, None), sender("b@x.com", 0, Some(9))];
        let first = senders[0].id;
        assert_eq!(
            pick_sender_excluding(&senders, today(), &[first]).unwrap().email,
            "b@x.com"
        );
    }
}
