//! Common types for Cadence

use chrono::{DateTime, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

/// Unique identifier for users (campaign owners)
pub type UserId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for campaign senders
pub type SenderId = Uuid;

/// Unique identifier for inbox messages
pub type InboxMessageId = Uuid;

/// Unique identifier for an automation run
pub type RunId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }

    /// Extract and parse the address from a `Name <user@example.com>` header value
    pub fn from_header(value: &str) -> Option<Self> {
        Self::parse(&extract_address(value))
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

fn angle_addr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^>]+)>").expect("static regex"))
}

fn bare_addr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^\s<>]+@[^\s<>]+)").expect("static regex"))
}

/// Extract a lowercase bare address from a header value such as
/// `"Jane Doe" <Jane@Example.com>`. Values without an address are
/// returned trimmed and lowercased.
pub fn extract_address(value: &str) -> String {
    let captured = angle_addr_re()
        .captures(value)
        .or_else(|| bare_addr_re().captures(value))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(value);

    captured.trim().to_lowercase()
}

/// Contact email status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmailStatus {
    Unknown,
    Scheduled,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Replied,
    Unsubscribed,
    Bounced,
    Paused,
}

impl EmailStatus {
    /// Terminal statuses never receive another sequence email
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EmailStatus::Completed
                | EmailStatus::Replied
                | EmailStatus::Unsubscribed
                | EmailStatus::Bounced
        )
    }

    /// All terminal statuses, as stored
    pub fn terminal_labels() -> [&'static str; 4] {
        ["Completed", "Replied", "Unsubscribed", "Bounced"]
    }
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailStatus::Unknown => write!(f, "Unknown"),
            EmailStatus::Scheduled => write!(f, "Scheduled"),
            EmailStatus::InProgress => write!(f, "In Progress"),
            EmailStatus::Completed => write!(f, "Completed"),
            EmailStatus::Replied => write!(f, "Replied"),
            EmailStatus::Unsubscribed => write!(f, "Unsubscribed"),
            EmailStatus::Bounced => write!(f, "Bounced"),
            EmailStatus::Paused => write!(f, "Paused"),
        }
    }
}

impl std::str::FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" => Ok(EmailStatus::Unknown),
            "Scheduled" => Ok(EmailStatus::Scheduled),
            "In Progress" => Ok(EmailStatus::InProgress),
            "Completed" => Ok(EmailStatus::Completed),
            "Replied" => Ok(EmailStatus::Replied),
            "Unsubscribed" => Ok(EmailStatus::Unsubscribed),
            "Bounced" => Ok(EmailStatus::Bounced),
            "Paused" => Ok(EmailStatus::Paused),
            _ => Err(format!("Invalid email status: {}", s)),
        }
    }
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Warming,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "Draft"),
            CampaignStatus::Active => write!(f, "Active"),
            CampaignStatus::Paused => write!(f, "Paused"),
            CampaignStatus::Warming => write!(f, "Warming"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(CampaignStatus::Draft),
            "Active" => Ok(CampaignStatus::Active),
            "Paused" => Ok(CampaignStatus::Paused),
            "Warming" => Ok(CampaignStatus::Warming),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Set of weekdays on which a campaign may send.
///
/// Stored as labels (`["Mon", "Tue", ...]`); any label chrono accepts
/// (`Mon`, `monday`, ...) parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ActiveDays(u8);

impl ActiveDays {
    /// No active days
    pub const fn none() -> Self {
        Self(0)
    }

    /// Every day of the week
    pub const fn all() -> Self {
        Self(0b0111_1111)
    }

    /// Monday through Friday
    pub const fn weekdays() -> Self {
        Self(0b0001_1111)
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    /// Build from a list of weekdays
    pub fn from_days(days: impl IntoIterator<Item = Weekday>) -> Self {
        Self(days.into_iter().fold(0, |acc, d| acc | Self::bit(d)))
    }

    /// Parse from stored labels
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, String> {
        let mut days = Vec::with_capacity(labels.len());
        for label in labels {
            let day = label
                .as_ref()
                .trim()
                .parse::<Weekday>()
                .map_err(|_| format!("Invalid weekday: {}", label.as_ref()))?;
            days.push(day);
        }
        Ok(Self::from_days(days))
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Active days in Monday-first order
    pub fn days(&self) -> Vec<Weekday> {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter(|d| self.contains(*d))
        .collect()
    }

    /// Short labels, as stored
    pub fn labels(&self) -> Vec<String> {
        self.days().iter().map(|d| d.to_string()).collect()
    }
}

impl Default for ActiveDays {
    fn default() -> Self {
        Self::weekdays()
    }
}

impl TryFrom<Vec<String>> for ActiveDays {
    type Error = String;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_labels(&value)
    }
}

impl From<ActiveDays> for Vec<String> {
    fn from(value: ActiveDays) -> Self {
        value.labels()
    }
}

/// Inbound webhook providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundProvider {
    Mailgun,
    MailerSend,
    Smtp,
    SendGrid,
}

impl std::fmt::Display for InboundProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InboundProvider::Mailgun => write!(f, "mailgun"),
            InboundProvider::MailerSend => write!(f, "mailersend"),
            InboundProvider::Smtp => write!(f, "smtp"),
            InboundProvider::SendGrid => write!(f, "sendgrid"),
        }
    }
}

/// Direction of an inbox message relative to the campaign sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl std::fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageDirection::Inbound => write!(f, "inbound"),
            MessageDirection::Outbound => write!(f, "outbound"),
        }
    }
}

/// Attachment metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// Filename
    pub filename: Option<String>,

    /// Content type
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Size in bytes
    #[serde(default)]
    pub size: usize,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("user@example.com").unwrap();
        assert_eq!(email.local, "user");
        assert_eq!(email.domain, "example.com");
        assert_eq!(email.to_string(), "user@example.com");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
    }

    #[test]
    fn test_extract_address() {
        assert_eq!(extract_address("Jane Doe <Jane@Example.com>"), "jane@example.com");
        assert_eq!(extract_address("  bob@example.com "), "bob@example.com");
        assert_eq!(
            extract_address("reply from carol@example.org today"),
            "carol@example.org"
        );
        assert_eq!(extract_address(""), "");
    }

    #[test]
    fn test_email_status_roundtrip_labels() {
        assert_eq!("In Progress".parse::<EmailStatus>(), Ok(EmailStatus::InProgress));
        assert_eq!(EmailStatus::InProgress.to_string(), "In Progress");
        assert!(EmailStatus::Replied.is_terminal());
        assert!(!EmailStatus::Paused.is_terminal());
        assert!("in progress".parse::<EmailStatus>().is_err());
    }

    #[test]
    fn test_active_days_labels() {
        let days = ActiveDays::from_labels(&["Mon", "wednesday", "Fri"]).unwrap();
        assert!(days.contains(Weekday::Mon));
        assert!(days.contains(Weekday::Wed));
        assert!(!days.contains(Weekday::Tue));
        assert_eq!(days.labels(), vec!["Mon", "Wed", "Fri"]);
        assert!(ActiveDays::from_labels(&["Funday"]).is_err());
    }

    #[test]
    fn test_active_days_serde() {
        let days: ActiveDays = serde_json::from_str(r#"["Sat","Sun"]"#).unwrap();
        assert_eq!(days, ActiveDays::from_days([Weekday::Sat, Weekday::Sun]));
        assert_eq!(serde_json::to_string(&ActiveDays::weekdays()).unwrap(),
            r#"["Mon","Tue","Wed","Thu","Fri"]"#);
    }
}
