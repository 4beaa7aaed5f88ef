//! SendGrid v3 mail/send client

use super::{EmailSender, OutboundEmail, ProviderError};
use async_trait::async_trait;
use cadence_common::config::SendGridConfig;
use cadence_common::{Error, Result};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// SendGrid HTTP API sender
pub struct SendGridSender {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SendGridSender {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &SendGridConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("outbound.sendgrid.api_key is required".to_string()))?;
        Self::new(&config.base_url, api_key, Duration::from_secs(config.timeout_secs))
    }

    fn payload(email: &OutboundEmail) -> serde_json::Value {
        let mut from = json!({ "email": email.from });
        if let Some(name) = &email.from_name {
            from["name"] = json!(name);
        }

        let mut payload = json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": from,
            "subject": email.subject,
            "content": [
                { "type": "text/plain", "value": email.text },
                { "type": "text/html", "value": email.html },
            ],
        });
        if let Some(reply_to) = &email.reply_to {
            payload["reply_to"] = json!({ "email": reply_to });
        }
        payload
    }
}

fn classify_status(status: StatusCode, body: String) -> ProviderError {
    let message = format!("SendGrid returned {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Temporary(message)
    } else {
        ProviderError::Permanent(message)
    }
}

#[async_trait]
impl EmailSender for SendGridSender {
    async fn send(&self, email: &OutboundEmail) -> std::result::Result<String, ProviderError> {
        let url = format!("{}/v3/mail/send", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::payload(email))
            .send()
            .await
            .map_err(|e| ProviderError::Temporary(format!("SendGrid request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, to = %email.to, "SendGrid rejected email");
            return Err(classify_status(status, body));
        }

        let message_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_default();

        debug!(to = %email.to, message_id = %message_id, "SendGrid accepted email");
        Ok(message_id)
    }

    fn name(&self) -> &'static str {
        "sendgrid"
    }
}
