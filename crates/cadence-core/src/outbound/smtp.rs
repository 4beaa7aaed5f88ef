//! SMTP relay sender

use super::{EmailSender, OutboundEmail, ProviderError};
use async_trait::async_trait;
use cadence_common::config::SmtpRelayConfig;
use cadence_common::{Error, Result};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Sender relaying through an SMTP server
pub struct SmtpSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    hostname: String,
}

impl SmtpSender {
    pub fn from_config(config: &SmtpRelayConfig) -> Result<Self> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| Error::Config(format!("Invalid SMTP relay: {}", e)))?
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| Error::Config(format!("Invalid SMTP relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(30)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            hostname: config.host.clone(),
        })
    }

    fn build_message(&self, email: &OutboundEmail, message_id: &str) -> std::result::Result<Message, ProviderError> {
        let from = Mailbox::new(
            email.from_name.clone(),
            email
                .from
                .parse()
                .map_err(|e| ProviderError::Permanent(format!("Invalid from address: {}", e)))?,
        );
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| ProviderError::Permanent(format!("Invalid to address: {}", e)))?;

        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .message_id(Some(message_id.to_string()));

        if let Some(reply_to) = &email.reply_to {
            let reply_to: Mailbox = reply_to
                .parse()
                .map_err(|e| ProviderError::Permanent(format!("Invalid reply-to address: {}", e)))?;
            builder = builder.reply_to(reply_to);
        }

        let message = if email.text.is_empty() {
            builder
                .header(ContentType::TEXT_HTML)
                .body(email.html.clone())
        } else {
            builder.multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(email.text.clone()))
                    .singlepart(SinglePart::html(email.html.clone())),
            )
        };

        message.map_err(|e| ProviderError::Permanent(format!("Failed to build email: {}", e)))
    }
}

/// Sort an SMTP error into permanent or temporary
pub(crate) fn classify_smtp_error(error: &str, permanent_hint: bool) -> ProviderError {
    let lowered = error.to_lowercase();
    if permanent_hint
        || error.contains("5.1.1")
        || error.contains("550")
        || lowered.contains("user unknown")
        || lowered.contains("does not exist")
    {
        ProviderError::Permanent(error.to_string())
    } else {
        ProviderError::Temporary(error.to_string())
    }
}

#[async_trait]
impl EmailSender for SmtpSender {
    async fn send(&self, email: &OutboundEmail) -> std::result::Result<String, ProviderError> {
        let domain = email
            .from
            .rsplit_once('@')
            .map(|(_, d)| d.to_string())
            .unwrap_or_else(|| self.hostname.clone());
        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);
        let message = self.build_message(email, &message_id)?;

        match self.mailer.send(message).await {
            Ok(response) => {
                debug!(to = %email.to, code = %response.code(), "SMTP relay accepted email");
                Ok(message_id)
            }
            Err(e) => Err(classify_smtp_error(&e.to_string(), e.is_permanent())),
        }
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
