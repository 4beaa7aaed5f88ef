//! Inbound email webhooks
//!
//! Every provider answers 200 for mail that is not ours so it is not
//! retried; only authentication failures and unreadable payloads are errors.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, StatusCode},
    Form, Json,
};
use cadence_common::types::{AttachmentMeta, InboundProvider};
use cadence_core::inbound::{
    normalize_mailersend, normalize_mailgun, normalize_sendgrid, normalize_smtp, verify_bearer,
    verify_mailersend, verify_mailgun, MailerSendEvent, MailgunForm, SendGridForm,
    SmtpRelayPayload,
};
use cadence_core::{InboundEmail, InboundOutcome, WebhookError};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::ApiError;
use crate::auth::AppState;

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub provider: InboundProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<InboundOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::InvalidSignature | WebhookError::Unauthorized => {
                ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", err.to_string())
            }
            WebhookError::Malformed(_) | WebhookError::UnsupportedEvent(_) => {
                ApiError::bad_request(err.to_string())
            }
        }
    }
}

async fn store(
    state: &AppState,
    email: InboundEmail,
) -> Result<Json<WebhookResponse>, ApiError> {
    let provider = email.provider;
    info!(
        "Inbound {} email from {} to {} ({})",
        provider, email.from, email.to, email.message_id
    );
    let outcome = state.inbox.process(email).await?;
    Ok(Json(WebhookResponse {
        success: true,
        provider,
        outcome: Some(outcome),
        message: None,
    }))
}

/// Provider form post. Providers send `multipart/form-data` (always when
/// attachments are present) and sometimes urlencoded bodies; both are read.
/// Text fields deserialize into `T`, file parts become attachment metadata.
pub struct ProviderForm<T> {
    pub fields: T,
    pub files: Vec<AttachmentMeta>,
}

fn multipart_error(err: impl std::fmt::Display) -> ApiError {
    ApiError::bad_request(format!("Invalid multipart body: {}", err))
}

#[async_trait]
impl<T, S> FromRequest<S> for ProviderForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(fields) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::new(e.status(), "BAD_REQUEST", e.body_text()))?;
            return Ok(Self {
                fields,
                files: Vec::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        let mut text = Map::new();
        let mut files = Vec::new();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if let Some(filename) = field.file_name().map(str::to_string) {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let size = field.bytes().await.map_err(multipart_error)?.len();
                files.push(AttachmentMeta {
                    filename: Some(filename),
                    content_type,
                    size,
                });
                continue;
            }

            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let value = field.text().await.map_err(multipart_error)?;
            text.insert(name, Value::String(value));
        }

        let fields = serde_json::from_value(Value::Object(text))
            .map_err(|e| ApiError::bad_request(format!("Invalid form fields: {}", e)))?;
        Ok(Self { fields, files })
    }
}

fn header<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}

/// Mailgun inbound route
pub async fn mailgun(
    State(state): State<Arc<AppState>>,
    ProviderForm { fields: mut form, files }: ProviderForm<MailgunForm>,
) -> Result<Json<WebhookResponse>, ApiError> {
    form.files = files;
    match &state.config.webhooks.mailgun_signing_key {
        Some(key) => verify_mailgun(key, &form.timestamp, &form.token, &form.signature)?,
        None => warn!("Mailgun signing key not configured, accepting unsigned webhook"),
    }

    let email = normalize_mailgun(form, Utc::now())?;
    store(&state, email).await
}

/// MailerSend inbound route
pub async fn mailersend(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    match &state.config.webhooks.mailersend_secret {
        Some(secret) => {
            let signature = header(&headers, &["signature", "x-signature", "mailersend-signature"])
                .ok_or(WebhookError::InvalidSignature)?;
            verify_mailersend(secret, &body, signature)?;
        }
        None => warn!("MailerSend secret not configured, accepting unsigned webhook"),
    }

    let event: MailerSendEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid MailerSend payload: {}", e)))?;

    match normalize_mailersend(event, Utc::now()) {
        Ok(email) => store(&state, email).await,
        Err(WebhookError::UnsupportedEvent(kind)) => {
            info!("Ignoring MailerSend {} event", kind);
            Ok(Json(WebhookResponse {
                success: true,
                provider: InboundProvider::MailerSend,
                outcome: None,
                message: Some(format!("Event {} ignored", kind)),
            }))
        }
        Err(e) => Err(e.into()),
    }
}

/// SMTP relay hook; always requires the bearer token
pub async fn smtp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Some(token) = &state.config.webhooks.smtp_token else {
        warn!("SMTP webhook token not configured, rejecting request");
        return Err(WebhookError::Unauthorized.into());
    };
    verify_bearer(token, header(&headers, &["authorization"]))?;

    let payload: SmtpRelayPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid SMTP payload: {}", e)))?;
    let email = normalize_smtp(payload, Utc::now())?;
    store(&state, email).await
}

/// SendGrid Inbound Parse; SendGrid does not sign these posts
pub async fn sendgrid(
    State(state): State<Arc<AppState>>,
    ProviderForm { fields: mut form, files }: ProviderForm<SendGridForm>,
) -> Result<Json<WebhookResponse>, ApiError> {
    form.files = files;
    let email = normalize_sendgrid(form, Utc::now())?;
    store(&state, email).await
}
