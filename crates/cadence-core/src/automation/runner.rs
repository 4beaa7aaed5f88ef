//! Automation pass
//!
//! One pass walks the active campaigns, computes every pending contact's
//! next send, and delivers the due ones. Contacts are isolated from each
//! other: a failure is counted and logged, never propagated to the batch.
//! Concurrent passes are safe because the contact lease, the sender claim
//! and the step advance are all conditional updates.

use super::CampaignPlan;
use crate::outbound::{EmailSender, OutboundEmail};
use crate::scheduling::{next_send, pick_sender_excluding};
use crate::template::{render_step, TemplateContext};
use cadence_common::config::{Config, SchedulingConfig};
use cadence_common::types::{CampaignId, CampaignStatus, EmailStatus, RunId, SenderId};
use cadence_common::{Error, Result};
use cadence_storage::models::{
    Campaign, CampaignSender, Contact, ContactAdvance, NewAutomationLog, NewEmailSend, SendStatus,
    SequenceStep,
};
use cadence_storage::Repositories;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Parameters of one pass
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    /// Restrict the pass to one campaign
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,

    /// Decide and count without sending or mutating contacts and senders
    #[serde(default)]
    pub test_mode: bool,
}

/// Per-pass tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub processed: u32,
    pub sent: u32,
    pub skipped: u32,
    pub errors: u32,
}

/// Result of one pass
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub test_mode: bool,
    pub campaigns: u32,
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Why a contact was not sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SequenceComplete,
    NotDue,
    OutsideHours,
    CapReached,
    ClaimedElsewhere,
    NoSender,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::SequenceComplete => "sequence_complete",
            SkipReason::NotDue => "not_due",
            SkipReason::OutsideHours => "outside_hours",
            SkipReason::CapReached => "cap_reached",
            SkipReason::ClaimedElsewhere => "claimed_elsewhere",
            SkipReason::NoSender => "no_sender",
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Sent {
        sender_id: SenderId,
        step_number: i32,
        message_id: Option<String>,
    },
    Skipped(SkipReason),
    Failed {
        sender_id: SenderId,
        error: String,
    },
}

/// Runs automation passes
pub struct AutomationRunner {
    repos: Repositories,
    email_sender: Arc<dyn EmailSender>,
    scheduling: SchedulingConfig,
    claim_lease: Duration,
}

impl AutomationRunner {
    pub fn new(repos: Repositories, email_sender: Arc<dyn EmailSender>, config: &Config) -> Self {
        Self {
            repos,
            email_sender,
            scheduling: config.scheduling.clone(),
            claim_lease: Duration::seconds(config.automation.claim_lease_secs.max(1)),
        }
    }

    /// Run a pass at the current time
    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        self.run_at(request, Utc::now()).await
    }

    /// Run a pass as if it were `now`
    pub async fn run_at(&self, request: RunRequest, now: DateTime<Utc>) -> Result<RunReport> {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let test_mode = request.test_mode;

        info!(
            %run_id,
            test_mode,
            campaign_id = ?request.campaign_id,
            provider = self.email_sender.name(),
            "Automation run started"
        );

        let campaigns = match request.campaign_id {
            Some(id) => vec![self.active_campaign(id).await?],
            None => self.repos.campaigns.list_active().await?,
        };

        let mut stats = RunStats::default();
        let campaign_count = campaigns.len() as u32;

        for campaign in campaigns {
            let campaign_id = campaign.id;
            if let Err(e) = self
                .process_campaign(run_id, campaign, test_mode, now, &mut stats)
                .await
            {
                error!(%run_id, %campaign_id, error = %e, "Campaign processing failed");
                stats.errors += 1;
                self.record_event(NewAutomationLog {
                    run_id,
                    campaign_id: Some(campaign_id),
                    contact_id: None,
                    sender_id: None,
                    log_type: "campaign".to_string(),
                    status: "error".to_string(),
                    message: e.to_string(),
                    skip_reason: None,
                    details: json!({ "test_mode": test_mode }),
                })
                .await;
            }
        }

        info!(
            %run_id,
            processed = stats.processed,
            sent = stats.sent,
            skipped = stats.skipped,
            errors = stats.errors,
            "Automation run finished"
        );

        Ok(RunReport {
            run_id,
            test_mode,
            campaigns: campaign_count,
            stats,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn active_campaign(&self, id: CampaignId) -> Result<Campaign> {
        let campaign = self
            .repos
            .campaigns
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", id)))?;
        if campaign.status_enum() != Some(CampaignStatus::Active) {
            return Err(Error::Validation(format!(
                "campaign {} is {}, not Active",
                id, campaign.status
            )));
        }
        Ok(campaign)
    }

    async fn process_campaign(
        &self,
        run_id: RunId,
        campaign: Campaign,
        test_mode: bool,
        now: DateTime<Utc>,
        stats: &mut RunStats,
    ) -> Result<()> {
        let campaign_id = campaign.id;

        let plan = match CampaignPlan::load(&self.repos, &self.scheduling, campaign).await {
            Ok(plan) => plan,
            Err(Error::Validation(message)) => {
                warn!(%run_id, %campaign_id, %message, "Skipping misconfigured campaign");
                self.record_event(campaign_skip(run_id, campaign_id, message, test_mode))
                    .await;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if plan.steps.is_empty() {
            debug!(%run_id, %campaign_id, "Campaign has no sequence steps");
            self.record_event(campaign_skip(
                run_id,
                campaign_id,
                "campaign has no sequence steps".to_string(),
                test_mode,
            ))
            .await;
            return Ok(());
        }

        let today = now.date_naive();
        let day_start = today
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);
        let mut sent_today = self
            .repos
            .activity
            .count_sends_since(campaign_id, day_start)
            .await?;

        let contacts = self.repos.contacts.list_pending(campaign_id).await?;
        let mut senders = self.repos.senders.list_for_campaign(campaign_id).await?;

        debug!(
            %run_id,
            %campaign_id,
            contacts = contacts.len(),
            senders = senders.len(),
            sent_today,
            daily_limit = plan.policy.daily_contacts_limit,
            "Processing campaign"
        );

        for contact in contacts {
            stats.processed += 1;
            let cap_reached = sent_today >= plan.policy.daily_contacts_limit;

            let outcome = self
                .process_contact(&plan, &contact, &mut senders, cap_reached, test_mode, now)
                .await;

            let mut event = NewAutomationLog {
                run_id,
                campaign_id: Some(campaign_id),
                contact_id: Some(contact.id),
                sender_id: None,
                log_type: "contact".to_string(),
                status: String::new(),
                message: String::new(),
                skip_reason: None,
                details: json!({ "test_mode": test_mode }),
            };

            match outcome {
                Ok(Outcome::Sent {
                    sender_id,
                    step_number,
                    message_id,
                }) => {
                    stats.sent += 1;
                    sent_today += 1;
                    info!(%run_id, contact_id = %contact.id, %sender_id, step_number, test_mode, "Sequence email sent");
                    event.sender_id = Some(sender_id);
                    event.status = "sent".to_string();
                    event.message = format!("Sent step {} to {}", step_number, contact.email);
                    event.details = json!({
                        "test_mode": test_mode,
                        "step_number": step_number,
                        "message_id": message_id,
                    });
                }
                Ok(Outcome::Skipped(reason)) => {
                    stats.skipped += 1;
                    debug!(%run_id, contact_id = %contact.id, reason = reason.as_str(), "Contact skipped");
                    event.status = "skipped".to_string();
                    event.message = format!("Skipped {}", contact.email);
                    event.skip_reason = Some(reason.as_str().to_string());
                }
                Ok(Outcome::Failed { sender_id, error }) => {
                    stats.errors += 1;
                    warn!(%run_id, contact_id = %contact.id, %sender_id, %error, "Sequence email failed");
                    event.sender_id = Some(sender_id);
                    event.status = "failed".to_string();
                    event.message = error;
                }
                Err(e) => {
                    stats.errors += 1;
                    error!(%run_id, contact_id = %contact.id, error = %e, "Contact processing failed");
                    event.status = "error".to_string();
                    event.message = e.to_string();
                }
            }

            self.record_event(event).await;
        }

        Ok(())
    }

    async fn process_contact(
        &self,
        plan: &CampaignPlan,
        contact: &Contact,
        senders: &mut [CampaignSender],
        cap_reached: bool,
        test_mode: bool,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let Some(next) = next_send(contact, &plan.steps, &plan.policy, now) else {
            if !test_mode && !contact.is_terminal() && contact.steps_sent() >= plan.steps.len() {
                self.repos
                    .contacts
                    .set_status(contact.id, EmailStatus::Completed)
                    .await?;
            }
            return Ok(Outcome::Skipped(SkipReason::SequenceComplete));
        };

        if !next.due_now {
            if !test_mode && contact.next_email_due != Some(next.scheduled_at) {
                self.repos
                    .contacts
                    .set_next_email_due(contact.id, Some(next.scheduled_at))
                    .await?;
            }
            let reason = if now >= next.scheduled_at {
                SkipReason::OutsideHours
            } else {
                SkipReason::NotDue
            };
            return Ok(Outcome::Skipped(reason));
        }

        if cap_reached {
            return Ok(Outcome::Skipped(SkipReason::CapReached));
        }

        let step = plan
            .steps
            .get(contact.steps_sent())
            .ok_or_else(|| Error::Internal(format!("missing step for contact {}", contact.id)))?;
        let today = now.date_naive();

        if test_mode {
            let Ok(sender_id) = pick_sender_excluding(senders, today, &[]).map(|s| s.id) else {
                return Ok(Outcome::Skipped(SkipReason::NoSender));
            };
            // simulate the claim on the local copy so caps and rotation still apply
            if let Some(slot) = senders.iter_mut().find(|s| s.id == sender_id) {
                slot.emails_sent_today = slot.sent_on(today) + 1;
                slot.counter_date = Some(today);
                slot.last_used_at = Some(now);
            }
            return Ok(Outcome::Sent {
                sender_id,
                step_number: step.step_number,
                message_id: None,
            });
        }

        let lease_until = now + self.claim_lease;
        if !self
            .repos
            .contacts
            .claim(contact.id, contact.sequence_step, now, lease_until)
            .await?
        {
            return Ok(Outcome::Skipped(SkipReason::ClaimedElsewhere));
        }

        let result = self.deliver(plan, contact, step, senders, today, now).await;

        // a sent step keeps its lease; the advance clears it
        if !matches!(result, Ok(Outcome::Sent { .. })) {
            if let Err(e) = self.repos.contacts.release(contact.id).await {
                warn!(contact_id = %contact.id, error = %e, "Failed to release contact lease");
            }
        }

        result
    }

    async fn deliver(
        &self,
        plan: &CampaignPlan,
        contact: &Contact,
        step: &SequenceStep,
        senders: &mut [CampaignSender],
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let Some(sender) = self.claim_sender(senders, today, now).await? else {
            return Ok(Outcome::Skipped(SkipReason::NoSender));
        };

        let rendered = render_step(
            &step.subject,
            &step.content,
            &TemplateContext::new(contact, &sender),
        );
        let email = OutboundEmail {
            from: sender.email.clone(),
            from_name: sender.name.clone(),
            to: contact.email.clone(),
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
            reply_to: None,
        };

        match self.email_sender.send(&email).await {
            // Delivered: later storage failures are logged, never retried.
            // A failed advance leaves the lease to expire.
            Ok(message_id) => {
                let message_id = Some(message_id).filter(|id| !id.is_empty());

                match self.advance(plan, contact, now).await {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        contact_id = %contact.id,
                        expected_step = contact.sequence_step,
                        "Contact step changed during send, not advancing"
                    ),
                    Err(e) => error!(
                        contact_id = %contact.id,
                        expected_step = contact.sequence_step,
                        error = %e,
                        "Step advance failed after send, contact stays leased"
                    ),
                }

                if let Err(e) = self
                    .repos
                    .activity
                    .record_send(NewEmailSend {
                        campaign_id: plan.campaign.id,
                        contact_id: contact.id,
                        sender_id: Some(sender.id),
                        sequence_step: step.step_number,
                        status: SendStatus::Sent,
                        provider_message_id: message_id.clone(),
                        error: None,
                        created_at: now,
                    })
                    .await
                {
                    error!(
                        contact_id = %contact.id,
                        step_number = step.step_number,
                        error = %e,
                        "Failed to record delivered email"
                    );
                }

                Ok(Outcome::Sent {
                    sender_id: sender.id,
                    step_number: step.step_number,
                    message_id,
                })
            }
            Err(e) => {
                self.repos
                    .activity
                    .record_send(NewEmailSend {
                        campaign_id: plan.campaign.id,
                        contact_id: contact.id,
                        sender_id: Some(sender.id),
                        sequence_step: step.step_number,
                        status: SendStatus::Failed,
                        provider_message_id: None,
                        error: Some(e.to_string()),
                        created_at: now,
                    })
                    .await?;

                Ok(Outcome::Failed {
                    sender_id: sender.id,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Pick and atomically claim a sender, re-picking after lost races
    async fn claim_sender(
        &self,
        senders: &mut [CampaignSender],
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<CampaignSender>> {
        let mut excluded: Vec<SenderId> = Vec::new();
        loop {
            let candidate = match pick_sender_excluding(senders, today, &excluded) {
                Ok(sender) => sender.id,
                Err(_) => return Ok(None),
            };

            match self.repos.senders.claim_send(candidate, today, now).await? {
                Some(claimed) => {
                    if let Some(slot) = senders.iter_mut().find(|s| s.id == claimed.id) {
                        *slot = claimed.clone();
                    }
                    return Ok(Some(claimed));
                }
                None => {
                    debug!(sender_id = %candidate, "Sender claim lost, re-picking");
                    excluded.push(candidate);
                }
            }
        }
    }

    /// Advance the contact past the step just sent
    async fn advance(&self, plan: &CampaignPlan, contact: &Contact, now: DateTime<Utc>) -> Result<bool> {
        let next_step = contact.steps_sent() as i32 + 1;
        let exhausted = next_step as usize >= plan.steps.len();
        let status = if exhausted {
            EmailStatus::Completed
        } else {
            EmailStatus::InProgress
        };

        let next_email_due = if exhausted {
            None
        } else {
            let mut advanced = contact.clone();
            advanced.sequence_step = next_step;
            advanced.last_contacted_at = Some(now);
            advanced.email_status = status.to_string();
            next_send(&advanced, &plan.steps, &plan.policy, now).map(|n| n.scheduled_at)
        };

        self.repos
            .contacts
            .advance(ContactAdvance {
                contact_id: contact.id,
                expected_step: contact.sequence_step,
                next_step,
                contacted_at: now,
                email_status: status,
                next_email_due,
            })
            .await
    }

    async fn record_event(&self, event: NewAutomationLog) {
        if let Err(e) = self.repos.activity.log(event).await {
            warn!(error = %e, "Failed to write automation log");
        }
    }
}

fn campaign_skip(run_id: RunId, campaign_id: CampaignId, message: String, test_mode: bool) -> NewAutomationLog {
    NewAutomationLog {
        run_id,
        campaign_id: Some(campaign_id),
        contact_id: None,
        sender_id: None,
        log_type: "campaign".to_string(),
        status: "skipped".to_string(),
        message,
        skip_reason: Some("invalid_campaign".to_string()),
        details: json!({ "test_mode": test_mode }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::ProviderError;
    use async_trait::async_trait;
    use cadence_storage::models::{AutomationLog, CampaignSettings, EmailSend};
    use cadence_storage::{ActivityRepository, MemoryStore};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<OutboundEmail>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, email: &OutboundEmail) -> std::result::Result<String, ProviderError> {
            if self.fail_for.as_deref() == Some(email.to.as_str()) {
                return Err(ProviderError::Permanent("mailbox unavailable".into()));
            }
            let mut sent = self.sent.lock().await;
            sent.push(email.clone());
            Ok(format!("msg-{}", sent.len()))
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        campaign_id: CampaignId,
        user_id: Uuid,
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    impl Fixture {
        /// Active campaign sending every day, around the clock
        async fn new(timings: &[i32]) -> Self {
            let store = Arc::new(MemoryStore::new());
            let campaign_id = Uuid::new_v4();
            let user_id = Uuid::new_v4();
            store
                .insert_campaign(Campaign {
                    id: campaign_id,
                    user_id,
                    name: "Outreach".into(),
                    status: "Active".into(),
                    created_at: at(1, 0),
                    updated_at: at(1, 0),
                })
                .await;
            for (i, days) in timings.iter().enumerate() {
                store
                    .insert_step(SequenceStep {
                        id: Uuid::new_v4(),
                        campaign_id,
                        step_number: i as i32 + 1,
                        timing_days: Some(*days),
                        subject: "Hello {{first_name}}".into(),
                        content: "Hi {{first_name}},\nfrom {{sender_name}}".into(),
                        created_at: at(1, 0),
                    })
                    .await;
            }
            let fixture = Self {
                store,
                campaign_id,
                user_id,
            };
            fixture.settings(&["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"], 35).await;
            fixture
        }

        async fn settings(&self, days: &[&str], limit: i32) {
            self.store
                .insert_settings(CampaignSettings {
                    campaign_id: self.campaign_id,
                    active_days: days.iter().map(|d| d.to_string()).collect(),
                    sending_start_time: Some("00:00".into()),
                    sending_end_time: Some("24:00".into()),
                    daily_contacts_limit: Some(limit),
                    updated_at: at(1, 0),
                })
                .await;
        }

        async fn contact(&self, email: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.store
                .insert_contact(Contact {
                    id,
                    campaign_id: self.campaign_id,
                    email: email.into(),
                    first_name: Some("Ada".into()),
                    last_name: None,
                    company: None,
                    location: None,
                    timezone: None,
                    sequence_step: 0,
                    last_contacted_at: None,
                    email_status: "Scheduled".into(),
                    next_email_due: None,
                    locked_until: None,
                    created_at: at(1, 0),
                    updated_at: at(1, 0),
                })
                .await;
            id
        }

        async fn sender(&self, email: &str, limit: i32, sent_today: i32) -> Uuid {
            let id = Uuid::new_v4();
            self.store
                .insert_sender(CampaignSender {
                    id,
                    campaign_id: self.campaign_id,
                    user_id: self.user_id,
                    email: email.into(),
                    name: Some("Rep".into()),
                    auth_type: "smtp".into(),
                    daily_limit: limit,
                    emails_sent_today: sent_today,
                    counter_date: Some(at(5, 0).date_naive()),
                    last_used_at: None,
                    rotation_priority: None,
                    is_active: true,
                    created_at: at(1, 0),
                })
                .await;
            id
        }

        fn runner(&self, sender: Arc<dyn EmailSender>) -> AutomationRunner {
            self.runner_with(Repositories::in_memory(self.store.clone()), sender)
        }

        fn runner_with(&self, repos: Repositories, sender: Arc<dyn EmailSender>) -> AutomationRunner {
            let config: Config = toml::from_str("[database]\nurl = \"postgres://unused\"").unwrap();
            AutomationRunner::new(repos, sender, &config)
        }
    }

    /// Activity store whose send tracking writes always fail
    struct BrokenSendLog(Arc<MemoryStore>);

    #[async_trait]
    impl ActivityRepository for BrokenSendLog {
        async fn record_send(&self, _input: NewEmailSend) -> Result<EmailSend> {
            Err(Error::Database("connection reset".into()))
        }

        async fn count_sends_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64> {
            self.0.count_sends_since(campaign_id, since).await
        }

        async fn log(&self, input: NewAutomationLog) -> Result<()> {
            self.0.log(input).await
        }

        async fn logs_for_run(&self, run_id: RunId) -> Result<Vec<AutomationLog>> {
            self.0.logs_for_run(run_id).await
        }
    }

    #[tokio::test]
    async fn test_sends_due_contact_and_advances() {
        let fx = Fixture::new(&[0, 3]).await;
        let contact_id = fx.contact("lead@example.com").await;
        let sender_id = fx.sender("rep@example.com", 50, 0).await;
        let email_sender = Arc::new(RecordingSender::default());
        let runner = fx.runner(email_sender.clone());

        let now = at(5, 12);
        let report = runner.run_at(RunRequest::default(), now).await.unwrap();
        assert_eq!(
            report.stats,
            RunStats { processed: 1, sent: 1, skipped: 0, errors: 0 }
        );

        let contact = fx.store.contact(contact_id).await.unwrap();
        assert_eq!(contact.sequence_step, 1);
        assert_eq!(contact.status_enum(), Some(EmailStatus::InProgress));
        assert_eq!(contact.last_contacted_at, Some(now));
        assert_eq!(contact.locked_until, None);
        assert_eq!(contact.next_email_due.unwrap().date_naive(), at(8, 0).date_naive());

        let sender = fx.store.sender(sender_id).await.unwrap();
        assert_eq!(sender.emails_sent_today, 1);
        assert_eq!(sender.last_used_at, Some(now));

        let sent = email_sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Hello Ada");
        assert_eq!(sent[0].html, "Hi Ada,<br>from Rep");

        let sends = fx.store.sends().await;
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].provider_message_id.as_deref(), Some("msg-1"));

        // an immediate second pass finds nothing due
        let report = runner.run_at(RunRequest::default(), now).await.unwrap();
        assert_eq!(report.stats.sent, 0);
        assert_eq!(report.stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_last_step_completes_contact() {
        let fx = Fixture::new(&[0]).await;
        let contact_id = fx.contact("lead@example.com").await;
        fx.sender("rep@example.com", 50, 0).await;
        let runner = fx.runner(Arc::new(RecordingSender::default()));

        runner.run_at(RunRequest::default(), at(5, 12)).await.unwrap();
        let contact = fx.store.contact(contact_id).await.unwrap();
        assert_eq!(contact.status_enum(), Some(EmailStatus::Completed));
        assert_eq!(contact.next_email_due, None);
    }

    #[tokio::test]
    async fn test_no_sender_skips_and_releases() {
        let fx = Fixture::new(&[0]).await;
        let contact_id = fx.contact("lead@example.com").await;
        fx.sender("a@example.com", 50, 50).await;
        fx.sender("b@example.com", 50, 50).await;
        let runner = fx.runner(Arc::new(RecordingSender::default()));

        let report = runner.run_at(RunRequest::default(), at(5, 12)).await.unwrap();
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.stats.sent, 0);

        let contact = fx.store.contact(contact_id).await.unwrap();
        assert_eq!(contact.sequence_step, 0);
        assert_eq!(contact.locked_until, None);

        let logs = fx.store.logs().await;
        assert!(logs.iter().any(|l| l.skip_reason.as_deref() == Some("no_sender")));
    }

    #[tokio::test]
    async fn test_daily_cap() {
        let fx = Fixture::new(&[0]).await;
        fx.settings(&["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"], 1).await;
        fx.contact("one@example.com").await;
        fx.contact("two@example.com").await;
        fx.sender("rep@example.com", 50, 0).await;
        let runner = fx.runner(Arc::new(RecordingSender::default()));

        let report = runner.run_at(RunRequest::default(), at(5, 12)).await.unwrap();
        assert_eq!(report.stats.sent, 1);
        assert_eq!(report.stats.skipped, 1);
        let logs = fx.store.logs().await;
        assert!(logs.iter().any(|l| l.skip_reason.as_deref() == Some("cap_reached")));
    }

    #[tokio::test]
    async fn test_provider_failure_counts_error_and_continues() {
        let fx = Fixture::new(&[0]).await;
        let failing = fx.contact("bounce@example.com").await;
        let ok = fx.contact("ok@example.com").await;
        fx.sender("rep@example.com", 50, 0).await;
        let email_sender = Arc::new(RecordingSender {
            fail_for: Some("bounce@example.com".into()),
            ..RecordingSender::default()
        });
        let runner = fx.runner(email_sender);

        let report = runner.run_at(RunRequest::default(), at(5, 12)).await.unwrap();
        assert_eq!(report.stats, RunStats { processed: 2, sent: 1, skipped: 0, errors: 1 });

        let failed = fx.store.contact(failing).await.unwrap();
        assert_eq!(failed.sequence_step, 0);
        assert_eq!(failed.locked_until, None);
        assert_eq!(fx.store.contact(ok).await.unwrap().sequence_step, 1);

        let sends = fx.store.sends().await;
        assert!(sends.iter().any(|s| s.status == "failed" && s.error.is_some()));
    }

    #[tokio::test]
    async fn test_test_mode_mutates_nothing() {
        let fx = Fixture::new(&[0]).await;
        let contact_id = fx.contact("lead@example.com").await;
        let sender_id = fx.sender("rep@example.com", 50, 0).await;
        let email_sender = Arc::new(RecordingSender::default());
        let runner = fx.runner(email_sender.clone());

        let request = RunRequest { campaign_id: Some(fx.campaign_id), test_mode: true };
        let report = runner.run_at(request, at(5, 12)).await.unwrap();
        assert!(report.test_mode);
        assert_eq!(report.stats.sent, 1);

        assert_eq!(fx.store.contact(contact_id).await.unwrap().sequence_step, 0);
        assert_eq!(fx.store.sender(sender_id).await.unwrap().emails_sent_today, 0);
        assert!(fx.store.sends().await.is_empty());
        assert!(email_sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_tracking_failure_does_not_resend_step() {
        let fx = Fixture::new(&[0, 3]).await;
        let contact_id = fx.contact("lead@example.com").await;
        fx.sender("rep@example.com", 50, 0).await;
        let email_sender = Arc::new(RecordingSender::default());
        let mut repos = Repositories::in_memory(fx.store.clone());
        repos.activity = Arc::new(BrokenSendLog(fx.store.clone()));
        let runner = fx.runner_with(repos, email_sender.clone());

        let now = at(5, 12);
        let report = runner.run_at(RunRequest::default(), now).await.unwrap();
        assert_eq!(report.stats, RunStats { processed: 1, sent: 1, skipped: 0, errors: 0 });

        let contact = fx.store.contact(contact_id).await.unwrap();
        assert_eq!(contact.sequence_step, 1);
        assert_eq!(contact.locked_until, None);

        let report = runner
            .run_at(RunRequest::default(), now + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(report.stats.sent, 0);
        assert_eq!(report.stats.errors, 0);
        assert_eq!(email_sender.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_test_mode_respects_sender_capacity() {
        let fx = Fixture::new(&[0]).await;
        fx.contact("one@example.com").await;
        fx.contact("two@example.com").await;
        fx.contact("three@example.com").await;
        fx.sender("rep@example.com", 50, 49).await;
        let runner = fx.runner(Arc::new(RecordingSender::default()));

        let request = RunRequest { campaign_id: None, test_mode: true };
        let report = runner.run_at(request, at(5, 12)).await.unwrap();
        assert_eq!(report.stats, RunStats { processed: 3, sent: 1, skipped: 2, errors: 0 });
        let no_sender = fx
            .store
            .logs()
            .await
            .iter()
            .filter(|l| l.skip_reason.as_deref() == Some("no_sender"))
            .count();
        assert_eq!(no_sender, 2);
    }

    #[tokio::test]
    async fn test_leased_contact_is_skipped() {
        let fx = Fixture::new(&[0]).await;
        let contact_id = fx.contact("lead@example.com").await;
        fx.sender("rep@example.com", 50, 0).await;
        let now = at(5, 12);
        let store: &MemoryStore = &fx.store;
        assert!(cadence_storage::ContactRepository::claim(
            store,
            contact_id,
            0,
            now,
            now + Duration::minutes(5)
        )
        .await
        .unwrap());

        let runner = fx.runner(Arc::new(RecordingSender::default()));
        let report = runner.run_at(RunRequest::default(), now).await.unwrap();
        assert_eq!(report.stats.skipped, 1);
        let logs = fx.store.logs().await;
        assert!(logs.iter().any(|l| l.skip_reason.as_deref() == Some("claimed_elsewhere")));
    }

    #[tokio::test]
    async fn test_overlapping_passes_send_once() {
        let fx = Fixture::new(&[0, 3]).await;
        let contact_id = fx.contact("lead@example.com").await;
        fx.sender("rep@example.com", 50, 0).await;
        let email_sender = Arc::new(RecordingSender::default());
        let first = fx.runner(email_sender.clone());
        let second = fx.runner(email_sender.clone());

        let now = at(5, 12);
        let (a, b) = tokio::join!(
            first.run_at(RunRequest::default(), now),
            second.run_at(RunRequest::default(), now)
        );
        assert_eq!(a.unwrap().stats.sent + b.unwrap().stats.sent, 1);
        assert_eq!(email_sender.sent.lock().await.len(), 1);
        assert_eq!(fx.store.contact(contact_id).await.unwrap().sequence_step, 1);
    }

    #[tokio::test]
    async fn test_misconfigured_campaign_is_skipped() {
        let fx = Fixture::new(&[0]).await;
        fx.settings(&[], 35).await;
        fx.contact("lead@example.com").await;
        fx.sender("rep@example.com", 50, 0).await;
        let runner = fx.runner(Arc::new(RecordingSender::default()));

        let report = runner.run_at(RunRequest::default(), at(5, 12)).await.unwrap();
        assert_eq!(report.campaigns, 1);
        assert_eq!(report.stats, RunStats::default());
        assert!(fx
            .store
            .logs()
            .await
            .iter()
            .any(|l| l.log_type == "campaign" && l.status == "skipped"));
    }

    #[tokio::test]
    async fn test_exhausted_contact_marked_completed() {
        let fx = Fixture::new(&[0]).await;
        let contact_id = fx.contact("lead@example.com").await;
        {
            let store: &MemoryStore = &fx.store;
            cadence_storage::ContactRepository::advance(
                store,
                ContactAdvance {
                    contact_id,
                    expected_step: 0,
                    next_step: 1,
                    contacted_at: at(2, 12),
                    email_status: EmailStatus::InProgress,
                    next_email_due: None,
                },
            )
            .await
            .unwrap();
        }
        let runner = fx.runner(Arc::new(RecordingSender::default()));

        let report = runner.run_at(RunRequest::default(), at(5, 12)).await.unwrap();
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(
            fx.store.contact(contact_id).await.unwrap().status_enum(),
            Some(EmailStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_not_found() {
        let fx = Fixture::new(&[0]).await;
        let runner = fx.runner(Arc::new(RecordingSender::default()));
        let request = RunRequest { campaign_id: Some(Uuid::new_v4()), test_mode: false };
        assert!(matches!(
            runner.run_at(request, at(5, 12)).await,
            Err(Error::NotFound(_))
        ));
    }
}
