//! In-memory storage backend
//!
//! Implements every repository trait over a single locked state so dry runs
//! and tests can drive the automation and inbox pipelines without Postgres.
//! Conditional updates mirror the SQL predicates of the database backend.

use crate::models::{
    AutomationLog, Campaign, CampaignSender, CampaignSettings, Contact, ContactAdvance, EmailSend,
    InboxMessage, InboxThread, NewAutomationLog, NewEmailSend, NewInboxMessage, SendStatus,
    SequenceStep, ThreadUpsert,
};
use crate::repository::{
    ActivityRepository, CampaignRepository, ContactRepository, InboxRepository, SenderRepository,
};
use async_trait::async_trait;
use cadence_common::types::{CampaignId, CampaignStatus, ContactId, EmailStatus, RunId, SenderId, UserId};
use cadence_common::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    campaigns: Vec<Campaign>,
    steps: Vec<SequenceStep>,
    settings: Vec<CampaignSettings>,
    contacts: Vec<Contact>,
    senders: Vec<CampaignSender>,
    sends: Vec<EmailSend>,
    logs: Vec<AutomationLog>,
    messages: Vec<InboxMessage>,
    threads: Vec<InboxThread>,
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        self.state.lock().await.campaigns.push(campaign);
    }

    pub async fn insert_step(&self, step: SequenceStep) {
        self.state.lock().await.steps.push(step);
    }

    /// Insert or replace the settings of a campaign
    pub async fn insert_settings(&self, settings: CampaignSettings) {
        let mut state = self.state.lock().await;
        state.settings.retain(|s| s.campaign_id != settings.campaign_id);
        state.settings.push(settings);
    }

    pub async fn insert_contact(&self, contact: Contact) {
        self.state.lock().await.contacts.push(contact);
    }

    pub async fn insert_sender(&self, sender: CampaignSender) {
        self.state.lock().await.senders.push(sender);
    }

    pub async fn contact(&self, id: ContactId) -> Option<Contact> {
        self.state
            .lock()
            .await
            .contacts
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub async fn sender(&self, id: SenderId) -> Option<CampaignSender> {
        self.state
            .lock()
            .await
            .senders
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub async fn sends(&self) -> Vec<EmailSend> {
        self.state.lock().await.sends.clone()
    }

    pub async fn logs(&self) -> Vec<AutomationLog> {
        self.state.lock().await.logs.clone()
    }

    pub async fn messages(&self) -> Vec<InboxMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn threads(&self) -> Vec<InboxThread> {
        self.state.lock().await.threads.clone()
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let state = self.state.lock().await;
        Ok(state.campaigns.iter().find(|c| c.id == id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Campaign>> {
        let state = self.state.lock().await;
        Ok(state
            .campaigns
            .iter()
            .filter(|c| c.status_enum() == Some(CampaignStatus::Active))
            .cloned()
            .collect())
    }

    async fn steps(&self, campaign_id: CampaignId) -> Result<Vec<SequenceStep>> {
        let state = self.state.lock().await;
        let mut steps: Vec<SequenceStep> = state
            .steps
            .iter()
            .filter(|s| s.campaign_id == campaign_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_number);
        Ok(steps)
    }

    async fn settings(&self, campaign_id: CampaignId) -> Result<Option<CampaignSettings>> {
        let state = self.state.lock().await;
        Ok(state
            .settings
            .iter()
            .find(|s| s.campaign_id == campaign_id)
            .cloned())
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(self.contact(id).await)
    }

    async fn list_pending(&self, campaign_id: CampaignId) -> Result<Vec<Contact>> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .iter()
            .filter(|c| c.campaign_id == campaign_id && !c.is_terminal())
            .cloned()
            .collect())
    }

    async fn find_by_email(&self, campaign_id: CampaignId, email: &str) -> Result<Option<Contact>> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .iter()
            .find(|c| c.campaign_id == campaign_id && c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn claim(
        &self,
        id: ContactId,
        expected_step: i32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(contact) = state.contacts.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        let lease_free = contact.locked_until.map(|t| t < now).unwrap_or(true);
        if contact.sequence_step != expected_step || !lease_free {
            return Ok(false);
        }
        contact.locked_until = Some(lease_until);
        contact.updated_at = now;
        Ok(true)
    }

    async fn release(&self, id: ContactId) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(contact) = state.contacts.iter_mut().find(|c| c.id == id) {
            contact.locked_until = None;
        }
        Ok(())
    }

    async fn advance(&self, advance: ContactAdvance) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(contact) = state
            .contacts
            .iter_mut()
            .find(|c| c.id == advance.contact_id && c.sequence_step == advance.expected_step)
        else {
            return Ok(false);
        };
        contact.sequence_step = advance.next_step;
        contact.last_contacted_at = Some(advance.contacted_at);
        contact.email_status = advance.email_status.to_string();
        contact.next_email_due = advance.next_email_due;
        contact.locked_until = None;
        contact.updated_at = advance.contacted_at;
        Ok(true)
    }

    async fn set_next_email_due(&self, id: ContactId, due: Option<DateTime<Utc>>) -> Result<()> {
        let mut state = self.state.lock().await;
        let contact = state
            .contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("contact {}", id)))?;
        contact.next_email_due = due;
        contact.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, id: ContactId, status: EmailStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let contact = state
            .contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("contact {}", id)))?;
        contact.email_status = status.to_string();
        if status.is_terminal() {
            contact.next_email_due = None;
        }
        contact.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SenderRepository for MemoryStore {
    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<CampaignSender>> {
        let state = self.state.lock().await;
        Ok(state
            .senders
            .iter()
            .filter(|s| s.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<CampaignSender>> {
        let state = self.state.lock().await;
        let mut matches: Vec<&CampaignSender> = state
            .senders
            .iter()
            .filter(|s| s.email.eq_ignore_ascii_case(email))
            .collect();
        // active first, stable otherwise
        matches.sort_by_key(|s| !s.is_active);
        Ok(matches.first().map(|s| (*s).clone()))
    }

    async fn claim_send(
        &self,
        id: SenderId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<CampaignSender>> {
        let mut state = self.state.lock().await;
        let Some(sender) = state.senders.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        if !sender.has_capacity(today) {
            return Ok(None);
        }
        sender.emails_sent_today = sender.sent_on(today) + 1;
        sender.counter_date = Some(today);
        sender.last_used_at = Some(now);
        Ok(Some(sender.clone()))
    }
}

#[async_trait]
impl ActivityRepository for MemoryStore {
    async fn record_send(&self, input: NewEmailSend) -> Result<EmailSend> {
        let send = EmailSend {
            id: Uuid::now_v7(),
            campaign_id: input.campaign_id,
            contact_id: input.contact_id,
            sender_id: input.sender_id,
            sequence_step: input.sequence_step,
            status: input.status.to_string(),
            provider_message_id: input.provider_message_id,
            error: input.error,
            created_at: input.created_at,
        };
        self.state.lock().await.sends.push(send.clone());
        Ok(send)
    }

    async fn count_sends_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64> {
        let sent = SendStatus::Sent.to_string();
        let state = self.state.lock().await;
        Ok(state
            .sends
            .iter()
            .filter(|s| s.campaign_id == campaign_id && s.status == sent && s.created_at >= since)
            .count() as i64)
    }

    async fn log(&self, input: NewAutomationLog) -> Result<()> {
        let log = AutomationLog {
            id: Uuid::now_v7(),
            run_id: input.run_id,
            campaign_id: input.campaign_id,
            contact_id: input.contact_id,
            sender_id: input.sender_id,
            log_type: input.log_type,
            status: input.status,
            message: input.message,
            skip_reason: input.skip_reason,
            details: input.details,
            created_at: Utc::now(),
        };
        self.state.lock().await.logs.push(log);
        Ok(())
    }

    async fn logs_for_run(&self, run_id: RunId) -> Result<Vec<AutomationLog>> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|l| l.run_id == run_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InboxRepository for MemoryStore {
    async fn store_message(
        &self,
        input: NewInboxMessage,
        thread: ThreadUpsert,
        replied_contact: Option<ContactId>,
    ) -> Result<Option<InboxMessage>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        if state
            .messages
            .iter()
            .any(|m| m.user_id == input.user_id && m.message_id == input.message_id)
        {
            return Ok(None);
        }

        // validate everything before the first write so a failure leaves no trace
        let attachments = serde_json::to_value(&input.attachments)
            .map_err(|e| Error::Internal(format!("Failed to encode attachments: {}", e)))?;
        let contact_index = match replied_contact {
            Some(id) => Some(
                state
                    .contacts
                    .iter()
                    .position(|c| c.id == id)
                    .ok_or_else(|| Error::NotFound(format!("contact {}", id)))?,
            ),
            None => None,
        };

        let message = InboxMessage {
            id: Uuid::now_v7(),
            user_id: input.user_id,
            message_id: input.message_id,
            conversation_id: input.conversation_id,
            campaign_id: input.campaign_id,
            contact_id: input.contact_id,
            contact_email: input.contact_email,
            sender_email: input.sender_email,
            subject: input.subject,
            body_text: input.body_text,
            body_html: input.body_html,
            direction: input.direction,
            channel: "email".to_string(),
            status: input.status,
            folder: "inbox".to_string(),
            has_attachments: !input.attachments.is_empty(),
            attachments,
            in_reply_to: input.in_reply_to,
            reference_ids: input.reference_ids,
            sent_at: input.sent_at,
            received_at: input.received_at,
            provider: input.provider,
            provider_data: input.provider_data,
        };
        state.messages.push(message.clone());

        match state
            .threads
            .iter_mut()
            .find(|t| t.conversation_id == thread.conversation_id && t.user_id == thread.user_id)
        {
            Some(existing) => {
                existing.last_message_at = existing.last_message_at.max(thread.last_message_at);
                existing.last_message_preview = thread.last_message_preview;
                existing.message_count += 1;
                existing.status = thread.status;
                existing.updated_at = now;
            }
            None => state.threads.push(InboxThread {
                id: Uuid::now_v7(),
                conversation_id: thread.conversation_id,
                user_id: thread.user_id,
                campaign_id: thread.campaign_id,
                contact_email: thread.contact_email,
                subject: thread.subject,
                last_message_at: thread.last_message_at,
                last_message_preview: thread.last_message_preview,
                message_count: 1,
                status: thread.status,
                created_at: now,
                updated_at: now,
            }),
        }

        if let Some(index) = contact_index {
            let contact = &mut state.contacts[index];
            contact.email_status = EmailStatus::Replied.to_string();
            contact.next_email_due = None;
            contact.updated_at = now;
        }

        Ok(Some(message))
    }

    async fn messages_in_conversation(
        &self,
        user_id: UserId,
        conversation_id: &str,
    ) -> Result<Vec<InboxMessage>> {
        let state = self.state.lock().await;
        let mut messages: Vec<InboxMessage> = state
            .messages
            .iter()
            .filter(|m| m.user_id == user_id && m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sent_at);
        Ok(messages)
    }
}
