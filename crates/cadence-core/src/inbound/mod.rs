//! Inbound email handling
//!
//! Provider webhooks are verified, normalized into [`InboundEmail`], and
//! handed to the [`InboxProcessor`] which threads and stores them.

pub mod conversation;
pub mod normalize;
pub mod processor;
pub mod reply;
pub mod signature;

pub use conversation::conversation_id;
pub use normalize::{
    normalize_mailersend, normalize_mailgun, normalize_sendgrid, normalize_smtp, MailerSendEvent,
    MailgunForm, SendGridForm, SmtpRelayPayload,
};
pub use processor::{InboundOutcome, InboxProcessor};
pub use reply::{decode_quoted_printable, extract_reply};
pub use signature::{verify_bearer, verify_mailersend, verify_mailgun};

use cadence_common::types::{AttachmentMeta, InboundProvider};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Provider-independent inbound email
#[derive(Debug, Clone)]
pub struct InboundEmail {
    pub provider: InboundProvider,
    /// Bare lowercase sender address
    pub from: String,
    /// Bare lowercase recipient address
    pub to: String,
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<AttachmentMeta>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    /// Raw provider fields kept for debugging
    pub provider_data: serde_json::Value,
}

/// Webhook rejection reasons
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Unsupported event type: {0}")]
    UnsupportedEvent(String),
}
