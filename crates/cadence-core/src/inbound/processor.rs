//! Inbox processing: sender lookup, dedupe, threading and reply marking

use super::{conversation_id, extract_reply, InboundEmail};
use cadence_common::types::{InboundProvider, InboxMessageId, MessageDirection};
use cadence_common::Result;
use cadence_storage::models::{NewInboxMessage, ThreadUpsert};
use cadence_storage::Repositories;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

const PREVIEW_CHARS: usize = 150;

/// What happened to a webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum InboundOutcome {
    Stored {
        id: InboxMessageId,
        conversation_id: String,
        direction: MessageDirection,
        contact_replied: bool,
    },
    /// Already stored for this user
    Duplicate { message_id: String },
    /// Neither address belongs to a campaign sender
    UnknownSender { address: String },
}

/// Stores normalized inbound email into the unified inbox
pub struct InboxProcessor {
    repos: Repositories,
}

impl InboxProcessor {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub async fn process(&self, email: InboundEmail) -> Result<InboundOutcome> {
        self.process_at(email, Utc::now()).await
    }

    pub async fn process_at(&self, email: InboundEmail, now: DateTime<Utc>) -> Result<InboundOutcome> {
        let (sender, direction) = match self.repos.senders.find_by_email(&email.to).await? {
            Some(sender) => (sender, MessageDirection::Inbound),
            // the SMTP relay also copies mail our senders send out
            None if email.provider == InboundProvider::Smtp => {
                match self.repos.senders.find_by_email(&email.from).await? {
                    Some(sender) => (sender, MessageDirection::Outbound),
                    None => {
                        debug!(from = %email.from, to = %email.to, "No campaign sender for SMTP message");
                        return Ok(InboundOutcome::UnknownSender { address: email.to });
                    }
                }
            }
            None => {
                debug!(provider = %email.provider, to = %email.to, "Not a campaign sender, ignoring");
                return Ok(InboundOutcome::UnknownSender { address: email.to });
            }
        };

        let (contact_email, sender_email) = match direction {
            MessageDirection::Inbound => (email.from.clone(), email.to.clone()),
            MessageDirection::Outbound => (email.to.clone(), email.from.clone()),
        };

        let contact = self
            .repos
            .contacts
            .find_by_email(sender.campaign_id, &contact_email)
            .await?;
        let conversation = conversation_id(&contact_email, &sender_email, Some(sender.campaign_id));

        let body_text = match direction {
            MessageDirection::Inbound => email
                .body_text
                .as_deref()
                .map(extract_reply)
                .filter(|t| !t.is_empty())
                .or(email.body_text.clone()),
            MessageDirection::Outbound => email.body_text.clone(),
        };
        let preview: String = body_text
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(PREVIEW_CHARS)
            .collect();
        let status = match direction {
            MessageDirection::Inbound => "unread",
            MessageDirection::Outbound => "sent",
        };
        let subject = if email.subject.trim().is_empty() {
            "No Subject".to_string()
        } else {
            email.subject.clone()
        };

        let replied_contact = match (&contact, direction) {
            (Some(contact), MessageDirection::Inbound) => Some(contact.id),
            _ => None,
        };

        let message = NewInboxMessage {
            user_id: sender.user_id,
            message_id: email.message_id.clone(),
            conversation_id: conversation.clone(),
            campaign_id: Some(sender.campaign_id),
            contact_id: contact.as_ref().map(|c| c.id),
            contact_email: contact_email.clone(),
            sender_email,
            subject: subject.clone(),
            body_text,
            body_html: email.body_html.clone(),
            direction: direction.to_string(),
            status: status.to_string(),
            attachments: email.attachments.clone(),
            in_reply_to: email.in_reply_to.clone(),
            reference_ids: email.references.clone(),
            sent_at: email.timestamp,
            received_at: now,
            provider: email.provider.to_string(),
            provider_data: email.provider_data.clone(),
        };
        let thread = ThreadUpsert {
            conversation_id: conversation.clone(),
            user_id: sender.user_id,
            campaign_id: Some(sender.campaign_id),
            contact_email,
            subject,
            last_message_at: email.timestamp,
            last_message_preview: preview,
            status: status.to_string(),
        };

        let Some(stored) = self
            .repos
            .inbox
            .store_message(message, thread, replied_contact)
            .await?
        else {
            debug!(message_id = %email.message_id, "Message already stored");
            return Ok(InboundOutcome::Duplicate {
                message_id: email.message_id,
            });
        };
        let contact_replied = replied_contact.is_some();

        info!(
            provider = %email.provider,
            %direction,
            campaign_id = %sender.campaign_id,
            conversation_id = %conversation,
            contact_replied,
            "Inbox message stored"
        );

        Ok(InboundOutcome::Stored {
            id: stored.id,
            conversation_id: conversation,
            direction,
            contact_replied,
        })
    }
}
