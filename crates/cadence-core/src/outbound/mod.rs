//! Outbound email delivery
//!
//! The automation runner hands rendered emails to an [`EmailSender`]. The
//! provider is chosen by `[outbound] provider` in the configuration.

pub mod sendgrid;
pub mod smtp;

pub use sendgrid::SendGridSender;
pub use smtp::SmtpSender;

use async_trait::async_trait;
use cadence_common::config::OutboundConfig;
use cadence_common::{Error, Result};
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::info;
use uuid::Uuid;

/// A rendered email ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub from_name: Option<String>,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub reply_to: Option<String>,
}

/// Delivery failure reported by a provider
#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum ProviderError {
    /// Retrying will not help (bad address, rejected credentials, ...)
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// May succeed on a later pass
    #[error("temporary failure: {0}")]
    Temporary(String),
}

impl ProviderError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProviderError::Permanent(_))
    }
}

/// Email delivery seam
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver the email and return the provider's message id
    async fn send(&self, email: &OutboundEmail) -> std::result::Result<String, ProviderError>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}

/// Sender that only logs. Used for dry runs and local development.
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl EmailSender for LogSender {
    async fn send(&self, email: &OutboundEmail) -> std::result::Result<String, ProviderError> {
        let message_id = format!("<{}@cadence.local>", Uuid::new_v4());
        info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            message_id = %message_id,
            "Outbound email (log provider)"
        );
        Ok(message_id)
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Build the configured sender
pub fn build_sender(config: &OutboundConfig) -> Result<Arc<dyn EmailSender>> {
    match config.provider.as_str() {
        "sendgrid" => Ok(Arc::new(SendGridSender::from_config(&config.sendgrid)?)),
        "smtp" => Ok(Arc::new(SmtpSender::from_config(&config.smtp)?)),
        "log" => Ok(Arc::new(LogSender)),
        other => Err(Error::Config(format!("Unknown outbound provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sender_by_name() {
        let mut config = OutboundConfig::default();
        assert_eq!(build_sender(&config).unwrap().name(), "log");

        config.provider = "sendgrid".into();
        // API key required
        assert!(build_sender(&config).is_err());
        config.sendgrid.api_key = Some("SG.key".into());
        assert_eq!(build_sender(&config).unwrap().name(), "sendgrid");

        config.provider = "pigeon".into();
        assert!(build_sender(&config).is_err());
    }

    #[tokio::test]
    async fn test_log_sender_returns_message_id() {
        let email = OutboundEmail {
            from: "rep@example.com".into(),
            from_name: None,
            to: "lead@example.com".into(),
            subject: "Hi".into(),
            html: "<p>Hi</p>".into(),
            text: "Hi".into(),
            reply_to: None,
        };
        let id = LogSender.send(&email).await.unwrap();
        assert!(id.ends_with("@cadence.local>"));
    }
}
