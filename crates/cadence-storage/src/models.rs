//! Database models

use cadence_common::types::{
    ActiveDays, AttachmentMeta, CampaignId, CampaignStatus, ContactId, EmailStatus,
    InboxMessageId, RunId, SenderId, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }
}

/// One email of a campaign sequence
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SequenceStep {
    pub id: Uuid,
    pub campaign_id: CampaignId,
    /// 1-based, contiguous within a campaign
    pub step_number: i32,
    /// Days to wait after the previous step (or enrollment for step 1)
    pub timing_days: Option<i32>,
    pub subject: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Per-campaign sending policy
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignSettings {
    pub campaign_id: CampaignId,
    pub active_days: Vec<String>,
    /// `HH:MM`, only the hour is used
    pub sending_start_time: Option<String>,
    /// `HH:MM`, only the hour is used
    pub sending_end_time: Option<String>,
    pub daily_contacts_limit: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignSettings {
    /// Parse the stored weekday labels
    pub fn parsed_active_days(&self) -> Result<ActiveDays, String> {
        ActiveDays::from_labels(&self.active_days)
    }

    /// Business window as `(start_hour, end_hour)`, falling back to the
    /// given defaults for unset bounds
    pub fn window(&self, default_start: u32, default_end: u32) -> Result<(u32, u32), String> {
        let start = match &self.sending_start_time {
            Some(value) => parse_hour(value)?,
            None => default_start,
        };
        let end = match &self.sending_end_time {
            Some(value) => parse_hour(value)?,
            None => default_end,
        };
        if start >= end {
            return Err(format!("Empty sending window {}..{}", start, end));
        }
        Ok((start, end))
    }
}

/// Parse the hour out of `HH` or `HH:MM`. `24:00` is accepted as an end bound.
pub fn parse_hour(value: &str) -> Result<u32, String> {
    let hour = value
        .trim()
        .split(':')
        .next()
        .unwrap_or_default()
        .parse::<u32>()
        .map_err(|_| format!("Invalid time: {}", value))?;
    if hour > 24 {
        return Err(format!("Invalid time: {}", value));
    }
    Ok(hour)
}

/// Contact model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub campaign_id: CampaignId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub timezone: Option<String>,
    /// Number of sequence steps already sent
    pub sequence_step: i32,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub email_status: String,
    /// Cached next send instant
    pub next_email_due: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Get status enum
    pub fn status_enum(&self) -> Option<EmailStatus> {
        self.email_status.parse().ok()
    }

    /// Whether the contact is in a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status_enum().map(|s| s.is_terminal()).unwrap_or(false)
    }

    /// Steps already sent, with negative values read as 0
    pub fn steps_sent(&self) -> usize {
        self.sequence_step.max(0) as usize
    }

    /// First and last name joined, if any
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Sender identity attached to a campaign
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignSender {
    pub id: SenderId,
    pub campaign_id: CampaignId,
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub auth_type: String,
    pub daily_limit: i32,
    pub emails_sent_today: i32,
    /// Day `emails_sent_today` belongs to
    pub counter_date: Option<NaiveDate>,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Reserved, not used for selection
    pub rotation_priority: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CampaignSender {
    /// Sends counted for `today`; a counter from another day reads as 0
    pub fn sent_on(&self, today: NaiveDate) -> i32 {
        if self.counter_date == Some(today) {
            self.emails_sent_today
        } else {
            0
        }
    }

    /// Whether the sender can take another email today
    pub fn has_capacity(&self, today: NaiveDate) -> bool {
        self.is_active && self.sent_on(today) < self.daily_limit
    }
}

/// Tracking row status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Failed,
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendStatus::Sent => write!(f, "sent"),
            SendStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SendStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(SendStatus::Sent),
            "failed" => Ok(SendStatus::Failed),
            _ => Err(format!("Invalid send status: {}", s)),
        }
    }
}

/// Outbound email tracking row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailSend {
    pub id: Uuid,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub sender_id: Option<SenderId>,
    pub sequence_step: i32,
    pub status: String,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create tracking row input
#[derive(Debug, Clone)]
pub struct NewEmailSend {
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub sender_id: Option<SenderId>,
    pub sequence_step: i32,
    pub status: SendStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Automation event row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AutomationLog {
    pub id: Uuid,
    pub run_id: RunId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub sender_id: Option<SenderId>,
    pub log_type: String,
    pub status: String,
    pub message: String,
    pub skip_reason: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Create automation event input
#[derive(Debug, Clone)]
pub struct NewAutomationLog {
    pub run_id: RunId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub sender_id: Option<SenderId>,
    pub log_type: String,
    pub status: String,
    pub message: String,
    pub skip_reason: Option<String>,
    pub details: serde_json::Value,
}

/// Conditional step advance after a successful send
#[derive(Debug, Clone)]
pub struct ContactAdvance {
    pub contact_id: ContactId,
    /// Step the caller observed; the update only applies if it still holds
    pub expected_step: i32,
    /// Value stored in `sequence_step` on success
    pub next_step: i32,
    pub contacted_at: DateTime<Utc>,
    pub email_status: EmailStatus,
    pub next_email_due: Option<DateTime<Utc>>,
}

/// Stored inbox message
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InboxMessage {
    pub id: InboxMessageId,
    pub user_id: UserId,
    pub message_id: String,
    pub conversation_id: String,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub contact_email: String,
    pub sender_email: String,
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub direction: String,
    pub channel: String,
    pub status: String,
    pub folder: String,
    pub has_attachments: bool,
    pub attachments: serde_json::Value,
    pub in_reply_to: Option<String>,
    pub reference_ids: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub provider: String,
    pub provider_data: serde_json::Value,
}

/// Create inbox message input
#[derive(Debug, Clone)]
pub struct NewInboxMessage {
    pub user_id: UserId,
    pub message_id: String,
    pub conversation_id: String,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub contact_email: String,
    pub sender_email: String,
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub direction: String,
    pub status: String,
    pub attachments: Vec<AttachmentMeta>,
    pub in_reply_to: Option<String>,
    pub reference_ids: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub provider: String,
    pub provider_data: serde_json::Value,
}

/// Conversation thread summary
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InboxThread {
    pub id: Uuid,
    pub conversation_id: String,
    pub user_id: UserId,
    pub campaign_id: Option<CampaignId>,
    pub contact_email: String,
    pub subject: String,
    pub last_message_at: DateTime<Utc>,
    pub last_message_preview: String,
    pub message_count: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Thread upsert input
#[derive(Debug, Clone)]
pub struct ThreadUpsert {
    pub conversation_id: String,
    pub user_id: UserId,
    pub campaign_id: Option<CampaignId>,
    pub contact_email: String,
    pub subject: String,
    pub last_message_at: DateTime<Utc>,
    pub last_message_preview: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings(start: Option<&str>, end: Option<&str>) -> CampaignSettings {
        CampaignSettings {
            campaign_id: Uuid::new_v4(),
            active_days: vec!["Mon".into(), "Tue".into()],
            sending_start_time: start.map(String::from),
            sending_end_time: end.map(String::from),
            daily_contacts_limit: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_window_parsing() {
        assert_eq!(settings(None, None).window(9, 17), Ok((9, 17)));
        assert_eq!(settings(Some("08:30"), Some("18:00")).window(9, 17), Ok((8, 18)));
        assert!(settings(Some("18:00"), Some("08:00")).window(9, 17).is_err());
        assert!(settings(Some("noon"), None).window(9, 17).is_err());
    }

    #[test]
    fn test_sender_counter_resets_daily() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let sender = CampaignSender {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            email: "a@example.com".into(),
            name: None,
            auth_type: "smtp".into(),
            daily_limit: 2,
            emails_sent_today: 2,
            counter_date: today.pred_opt(),
            last_used_at: None,
            rotation_priority: None,
            is_active: true,
            created_at: Utc::now(),
        };
        assert_eq!(sender.sent_on(today), 0);
        assert!(sender.has_capacity(today));

        let exhausted = CampaignSender {
            counter_date: Some(today),
            ..sender
        };
        assert!(!exhausted.has_capacity(today));
    }
}
