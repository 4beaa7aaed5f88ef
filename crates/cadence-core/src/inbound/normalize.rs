//! Provider payloads and their normalization into [`InboundEmail`]

use super::{InboundEmail, WebhookError};
use cadence_common::types::{extract_address, AttachmentMeta, InboundProvider};
use chrono::{DateTime, Utc};
use mail_parser::{HeaderValue, MessageParser, MimeHeaders};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// First address of a possibly comma-separated recipient list
fn first_address(value: &str) -> String {
    extract_address(value.split(',').next().unwrap_or(value))
}

/// Address from a JSON field that may be a string, `{email, name}` or a list of either
fn address_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(first_address(s)),
        Value::Object(map) => map
            .get("email")
            .or_else(|| map.get("address"))
            .and_then(Value::as_str)
            .map(extract_address),
        Value::Array(items) => items.iter().find_map(address_from_value),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn fallback_message_id(provider: InboundProvider) -> String {
    format!("{}-{}", provider, Uuid::new_v4())
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

fn attachments_from_value(value: Option<&Value>) -> Vec<AttachmentMeta> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| AttachmentMeta {
                    filename: item
                        .get("filename")
                        .or_else(|| item.get("name"))
                        .and_then(Value::as_str)
                        .map(String::from),
                    content_type: item
                        .get("content_type")
                        .or_else(|| item.get("contentType"))
                        .and_then(Value::as_str)
                        .unwrap_or("application/octet-stream")
                        .to_string(),
                    size: item.get("size").and_then(Value::as_u64).unwrap_or(0) as usize,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Placeholder entries for providers that only report an attachment count
fn counted_attachments(count: Option<&str>) -> Vec<AttachmentMeta> {
    let count = count.and_then(|c| c.trim().parse::<usize>().ok()).unwrap_or(0);
    (0..count)
        .map(|_| AttachmentMeta {
            filename: None,
            content_type: "application/octet-stream".to_string(),
            size: 0,
        })
        .collect()
}

/// Mailgun inbound route form
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MailgunForm {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(rename = "body-plain", default)]
    pub body_plain: Option<String>,
    #[serde(rename = "body-html", default)]
    pub body_html: Option<String>,
    #[serde(rename = "Message-Id", default)]
    pub message_id: Option<String>,
    #[serde(rename = "In-Reply-To", default)]
    pub in_reply_to: Option<String>,
    #[serde(rename = "References", default)]
    pub references: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub signature: String,
    #[serde(rename = "attachment-count", default)]
    pub attachment_count: Option<String>,
    /// File parts of a multipart post
    #[serde(skip)]
    pub files: Vec<AttachmentMeta>,
}

pub fn normalize_mailgun(form: MailgunForm, now: DateTime<Utc>) -> Result<InboundEmail, WebhookError> {
    if form.sender.trim().is_empty() || form.recipient.trim().is_empty() {
        return Err(WebhookError::Malformed("sender and recipient are required".into()));
    }

    let timestamp = form
        .timestamp
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(now);

    Ok(InboundEmail {
        provider: InboundProvider::Mailgun,
        from: first_address(&form.sender),
        to: first_address(&form.recipient),
        subject: form.subject.clone().unwrap_or_default(),
        body_text: non_empty(form.body_plain.clone()),
        body_html: non_empty(form.body_html.clone()),
        message_id: non_empty(form.message_id.clone())
            .unwrap_or_else(|| fallback_message_id(InboundProvider::Mailgun)),
        timestamp,
        attachments: if form.files.is_empty() {
            counted_attachments(form.attachment_count.as_deref())
        } else {
            form.files.clone()
        },
        in_reply_to: non_empty(form.in_reply_to.clone()),
        references: non_empty(form.references.clone()),
        provider_data: json!({
            "timestamp": form.timestamp,
            "token": form.token,
            "attachment_count": form.attachment_count,
        }),
    })
}

/// MailerSend webhook envelope
#[derive(Debug, Clone, Deserialize)]
pub struct MailerSendEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

pub fn normalize_mailersend(
    event: MailerSendEvent,
    now: DateTime<Utc>,
) -> Result<InboundEmail, WebhookError> {
    if event.event_type != "activity.inbound" {
        return Err(WebhookError::UnsupportedEvent(event.event_type));
    }

    let data = &event.data;
    let text = |key: &str| data.get(key).and_then(Value::as_str).map(String::from);

    let from = data
        .get("from")
        .and_then(address_from_value)
        .ok_or_else(|| WebhookError::Malformed("data.from is required".into()))?;
    let to = data
        .get("to")
        .and_then(address_from_value)
        .ok_or_else(|| WebhookError::Malformed("data.to is required".into()))?;

    Ok(InboundEmail {
        provider: InboundProvider::MailerSend,
        from,
        to,
        subject: text("subject").unwrap_or_default(),
        body_text: non_empty(text("text")),
        body_html: non_empty(text("html")),
        message_id: non_empty(text("message_id"))
            .unwrap_or_else(|| fallback_message_id(InboundProvider::MailerSend)),
        timestamp: text("created_at")
            .as_deref()
            .and_then(parse_date)
            .unwrap_or(now),
        attachments: attachments_from_value(data.get("attachments")),
        in_reply_to: non_empty(text("in_reply_to")),
        references: non_empty(text("references")),
        provider_data: json!({ "webhook_type": event.event_type }),
    })
}

/// JSON posted by the SMTP relay
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpRelayPayload {
    #[serde(default)]
    pub from: Value,
    #[serde(default)]
    pub to: Value,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html_body: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub attachments: Option<Value>,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Option<Value>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

pub fn normalize_smtp(
    payload: SmtpRelayPayload,
    now: DateTime<Utc>,
) -> Result<InboundEmail, WebhookError> {
    let from = address_from_value(&payload.from);
    let to = address_from_value(&payload.to);
    let subject = non_empty(payload.subject.clone());
    let message_id = non_empty(payload.message_id.clone());

    let (Some(from), Some(to), Some(subject), Some(message_id)) = (from, to, subject, message_id)
    else {
        return Err(WebhookError::Malformed(
            "from, to, subject and messageId are required".into(),
        ));
    };

    let references = match &payload.references {
        Some(Value::Array(items)) => {
            let ids: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            Some(ids.join(" "))
        }
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };

    Ok(InboundEmail {
        provider: InboundProvider::Smtp,
        from,
        to,
        subject,
        body_text: non_empty(payload.text_body.or(payload.text)),
        body_html: non_empty(payload.html_body.or(payload.html)),
        message_id,
        timestamp: payload.date.as_deref().and_then(parse_date).unwrap_or(now),
        attachments: attachments_from_value(payload.attachments.as_ref()),
        in_reply_to: non_empty(payload.in_reply_to),
        references: non_empty(references),
        provider_data: json!({ "thread_id": payload.thread_id }),
    })
}

/// SendGrid Inbound Parse form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendGridForm {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub envelope: Option<String>,
    #[serde(default)]
    pub headers: Option<String>,
    /// Raw MIME message, present when "send raw" is enabled
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub attachments: Option<String>,
    #[serde(default)]
    pub spam_score: Option<String>,
    /// File parts of a multipart post
    #[serde(skip)]
    pub files: Vec<AttachmentMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct SendGridEnvelope {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Vec<String>,
}

/// Fields recovered from a raw MIME message
#[derive(Debug, Default)]
struct ParsedRaw {
    from: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    text: Option<String>,
    html: Option<String>,
    message_id: Option<String>,
    in_reply_to: Option<String>,
    references: Option<String>,
    date: Option<DateTime<Utc>>,
    attachments: Vec<AttachmentMeta>,
}

/// Message-ID style header values, re-bracketed
fn message_ids(value: &HeaderValue) -> Option<String> {
    match value {
        HeaderValue::Text(id) => Some(format!("<{}>", id)),
        HeaderValue::TextList(ids) => Some(
            ids.iter()
                .map(|id| format!("<{}>", id))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => None,
    }
}

fn parse_raw(raw: &str) -> Option<ParsedRaw> {
    let message = MessageParser::default().parse(raw.as_bytes())?;

    let first_addr = |addr: Option<&mail_parser::Address>| {
        addr.and_then(|a| a.first())
            .and_then(|a| a.address())
            .map(|a| a.to_lowercase())
    };

    let attachments = message
        .attachments()
        .map(|part| AttachmentMeta {
            filename: part.attachment_name().map(String::from),
            content_type: part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size: part.contents().len(),
        })
        .collect();

    Some(ParsedRaw {
        from: first_addr(message.from()),
        to: first_addr(message.to()),
        subject: message.subject().map(String::from),
        text: message.body_text(0).map(|b| b.into_owned()),
        html: message.body_html(0).map(|b| b.into_owned()),
        message_id: message.message_id().map(|id| format!("<{}>", id)),
        in_reply_to: message_ids(message.in_reply_to()),
        references: message_ids(message.references()),
        date: message
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        attachments,
    })
}

/// Header value from SendGrid's raw `headers` block
fn header_value(headers: &str, name: &str) -> Option<String> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

pub fn normalize_sendgrid(form: SendGridForm, now: DateTime<Utc>) -> Result<InboundEmail, WebhookError> {
    let envelope: SendGridEnvelope = form
        .envelope
        .as_deref()
        .and_then(|e| serde_json::from_str(e).ok())
        .unwrap_or_default();
    let raw = form.email.as_deref().and_then(parse_raw).unwrap_or_default();
    let headers = form.headers.as_deref().unwrap_or_default();

    let from = non_empty(Some(form.from.clone()))
        .map(|f| first_address(&f))
        .or(raw.from)
        .or_else(|| envelope.from.as_deref().map(extract_address))
        .ok_or_else(|| WebhookError::Malformed("from is required".into()))?;
    let to = non_empty(Some(form.to.clone()))
        .map(|t| first_address(&t))
        .or(raw.to)
        .or_else(|| envelope.to.first().map(|t| extract_address(t)))
        .ok_or_else(|| WebhookError::Malformed("to is required".into()))?;

    let message_id = header_value(headers, "Message-ID")
        .or(raw.message_id)
        .unwrap_or_else(|| fallback_message_id(InboundProvider::SendGrid));
    let timestamp = header_value(headers, "Date")
        .as_deref()
        .and_then(parse_date)
        .or(raw.date)
        .unwrap_or(now);

    let attachments = if !form.files.is_empty() {
        form.files.clone()
    } else if raw.attachments.is_empty() {
        counted_attachments(form.attachments.as_deref())
    } else {
        raw.attachments
    };

    Ok(InboundEmail {
        provider: InboundProvider::SendGrid,
        from,
        to,
        subject: non_empty(form.subject.clone()).or(raw.subject).unwrap_or_default(),
        body_text: non_empty(form.text.clone()).or(non_empty(raw.text)),
        body_html: non_empty(form.html.clone()).or(non_empty(raw.html)),
        message_id,
        timestamp,
        attachments,
        in_reply_to: header_value(headers, "In-Reply-To").or(raw.in_reply_to),
        references: header_value(headers, "References").or(raw.references),
        provider_data: json!({
            "envelope": form.envelope,
            "spam_score": form.spam_score,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_mailgun_form() {
        let form: MailgunForm = serde_json::from_value(json!({
            "sender": "Lead <Lead@Example.com>",
            "recipient": "rep@acme.io",
            "subject": "Re: Hello",
            "body-plain": "Sure!",
            "Message-Id": "<abc@mail.example.com>",
            "timestamp": "1709294400",
            "token": "tok",
            "signature": "sig",
            "attachment-count": "2"
        }))
        .unwrap();

        let email = normalize_mailgun(form, now()).unwrap();
        assert_eq!(email.from, "lead@example.com");
        assert_eq!(email.to, "rep@acme.io");
        assert_eq!(email.body_text.as_deref(), Some("Sure!"));
        assert_eq!(email.body_html, None);
        assert_eq!(email.message_id, "<abc@mail.example.com>");
        assert_eq!(email.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(email.attachments.len(), 2);
    }

    #[test]
    fn test_mailgun_requires_addresses() {
        assert!(matches!(
            normalize_mailgun(MailgunForm::default(), now()),
            Err(WebhookError::Malformed(_))
        ));
    }

    #[test]
    fn test_mailersend_inbound() {
        let event: MailerSendEvent = serde_json::from_value(json!({
            "type": "activity.inbound",
            "data": {
                "from": {"email": "Lead@Example.com", "name": "Lead"},
                "to": [{"email": "rep@acme.io"}],
                "subject": "Re: Hello",
                "text": "Sure!",
                "html": "<p>Sure!</p>",
                "message_id": "ms-1",
                "created_at": "2024-03-01T10:00:00Z",
                "attachments": [{"filename": "a.pdf", "content_type": "application/pdf", "size": 10}]
            }
        }))
        .unwrap();

        let email = normalize_mailersend(event, now()).unwrap();
        assert_eq!(email.from, "lead@example.com");
        assert_eq!(email.to, "rep@acme.io");
        assert_eq!(email.message_id, "ms-1");
        assert_eq!(email.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(
            email.attachments,
            vec![AttachmentMeta {
                filename: Some("a.pdf".into()),
                content_type: "application/pdf".into(),
                size: 10
            }]
        );
    }

    #[test]
    fn test_mailersend_other_events_rejected() {
        let event = MailerSendEvent {
            event_type: "activity.sent".into(),
            data: Value::Null,
        };
        assert_eq!(
            normalize_mailersend(event, now()).unwrap_err(),
            WebhookError::UnsupportedEvent("activity.sent".into())
        );
    }

    #[test]
    fn test_smtp_payload_aliases() {
        let payload: SmtpRelayPayload = serde_json::from_value(json!({
            "from": "Rep <rep@acme.io>",
            "to": ["lead@example.com"],
            "subject": "Hello",
            "messageId": "<m1@acme.io>",
            "text": "plain",
            "htmlBody": "<b>html</b>",
            "date": "Fri, 01 Mar 2024 09:30:00 +0000",
            "references": ["<a@x>", "<b@x>"],
            "threadId": "t-1"
        }))
        .unwrap();

        let email = normalize_smtp(payload, now()).unwrap();
        assert_eq!(email.from, "rep@acme.io");
        assert_eq!(email.to, "lead@example.com");
        assert_eq!(email.body_text.as_deref(), Some("plain"));
        assert_eq!(email.body_html.as_deref(), Some("<b>html</b>"));
        assert_eq!(email.references.as_deref(), Some("<a@x> <b@x>"));
        assert_eq!(email.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_smtp_requires_message_id() {
        let payload: SmtpRelayPayload = serde_json::from_value(json!({
            "from": "rep@acme.io",
            "to": "lead@example.com",
            "subject": "Hello"
        }))
        .unwrap();
        assert!(matches!(normalize_smtp(payload, now()), Err(WebhookError::Malformed(_))));
    }

    #[test]
    fn test_sendgrid_parsed_fields() {
        let form = SendGridForm {
            from: "Lead <lead@example.com>".into(),
            to: "rep@acme.io, other@acme.io".into(),
            subject: Some("Re: Hello".into()),
            text: Some("Sure!".into()),
            headers: Some("Message-ID: <sg-1@example.com>\nDate: Fri, 01 Mar 2024 08:00:00 +0000".into()),
            envelope: Some(r#"{"from":"lead@example.com","to":["rep@acme.io"]}"#.into()),
            attachments: Some("0".into()),
            ..SendGridForm::default()
        };

        let email = normalize_sendgrid(form, now()).unwrap();
        assert_eq!(email.to, "rep@acme.io");
        assert_eq!(email.message_id, "<sg-1@example.com>");
        assert_eq!(email.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        assert!(email.attachments.is_empty());
    }

    #[test]
    fn test_sendgrid_raw_mime() {
        let raw = "From: Lead <Lead@Example.com>\r\n\
                   To: rep@acme.io\r\n\
                   Subject: Re: Hello\r\n\
                   Message-ID: <raw-1@example.com>\r\n\
                   In-Reply-To: <orig@acme.io>\r\n\
                   Date: Fri, 01 Mar 2024 07:00:00 +0000\r\n\
                   Content-Type: text/plain; charset=utf-8\r\n\
                   \r\n\
                   Raw body\r\n";
        let form = SendGridForm {
            email: Some(raw.into()),
            ..SendGridForm::default()
        };

        let email = normalize_sendgrid(form, now()).unwrap();
        assert_eq!(email.from, "lead@example.com");
        assert_eq!(email.to, "rep@acme.io");
        assert_eq!(email.subject, "Re: Hello");
        assert_eq!(email.message_id, "<raw-1@example.com>");
        assert_eq!(email.in_reply_to.as_deref(), Some("<orig@acme.io>"));
        assert_eq!(email.body_text.as_deref().map(str::trim), Some("Raw body"));
        assert_eq!(email.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap());
    }
}
