//! Read-only timing queries and `next_email_due` re-sync

use super::CampaignPlan;
use crate::scheduling::{
    business_hours_status, next_send, resolve_timezone, BusinessHoursStatus, NextSend,
};
use cadence_common::config::SchedulingConfig;
use cadence_common::types::{CampaignId, ContactId};
use cadence_common::{Error, Result};
use cadence_storage::Repositories;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

/// A contact whose next step could go out now
#[derive(Debug, Clone, Serialize)]
pub struct DueContact {
    pub contact_id: ContactId,
    pub email: String,
    pub timezone: String,
    pub next_send: NextSend,
    pub business_hours: BusinessHoursStatus,
}

/// Outcome of a timing re-sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub updated: u32,
    pub cleared: u32,
    pub unchanged: u32,
}

/// Timing queries over stored campaigns
pub struct TimingService {
    repos: Repositories,
    scheduling: SchedulingConfig,
}

impl TimingService {
    pub fn new(repos: Repositories, scheduling: SchedulingConfig) -> Self {
        Self { repos, scheduling }
    }

    async fn plan(&self, campaign_id: CampaignId) -> Result<CampaignPlan> {
        CampaignPlan::load_by_id(&self.repos, &self.scheduling, campaign_id).await
    }

    /// Pending contacts of a campaign that are due right now
    pub async fn due_contacts(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueContact>> {
        let plan = self.plan(campaign_id).await?;
        let contacts = self.repos.contacts.list_pending(campaign_id).await?;

        let due = contacts
            .iter()
            .filter_map(|contact| {
                let next = next_send(contact, &plan.steps, &plan.policy, now)?;
                if !next.due_now {
                    return None;
                }
                let tz = resolve_timezone(
                    contact.timezone.as_deref(),
                    contact.location.as_deref(),
                    plan.policy.default_timezone,
                );
                Some(DueContact {
                    contact_id: contact.id,
                    email: contact.email.clone(),
                    timezone: next.timezone.clone(),
                    business_hours: business_hours_status(
                        tz,
                        plan.policy.active_days,
                        plan.policy.start_hour,
                        plan.policy.end_hour,
                        now,
                    ),
                    next_send: next,
                })
            })
            .collect::<Vec<_>>();

        debug!(%campaign_id, pending = contacts.len(), due = due.len(), "Computed due contacts");
        Ok(due)
    }

    /// Next send of a single contact, `None` when its sequence is over
    pub async fn next_send_for(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        now: DateTime<Utc>,
    ) -> Result<Option<NextSend>> {
        let contact = self
            .repos
            .contacts
            .get(contact_id)
            .await?
            .filter(|c| c.campaign_id == campaign_id)
            .ok_or_else(|| Error::NotFound(format!("contact {}", contact_id)))?;

        let plan = self.plan(campaign_id).await?;
        Ok(next_send(&contact, &plan.steps, &plan.policy, now))
    }

    /// Recompute and store `next_email_due` for every pending contact
    pub async fn sync_timings(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> Result<SyncReport> {
        let plan = self.plan(campaign_id).await?;
        let contacts = self.repos.contacts.list_pending(campaign_id).await?;
        let mut report = SyncReport::default();

        for contact in contacts {
            let due = next_send(&contact, &plan.steps, &plan.policy, now).map(|n| n.scheduled_at);
            if due == contact.next_email_due {
                report.unchanged += 1;
                continue;
            }
            self.repos.contacts.set_next_email_due(contact.id, due).await?;
            if due.is_some() {
                report.updated += 1;
            } else {
                report.cleared += 1;
            }
        }

        info!(
            %campaign_id,
            updated = report.updated,
            cleared = report.cleared,
            unchanged = report.unchanged,
            "Synced contact timings"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_storage::models::{Campaign, CampaignSettings, Contact, SequenceStep};
    use cadence_storage::MemoryStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use uuid::Uuid;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    async fn setup() -> (Arc<MemoryStore>, CampaignId, ContactId, ContactId) {
        let store = Arc::new(MemoryStore::new());
        let campaign_id = Uuid::new_v4();
        store
            .insert_campaign(Campaign {
                id: campaign_id,
                user_id: Uuid::new_v4(),
                name: "Timing".into(),
                status: "Active".into(),
                created_at: at(1, 0),
                updated_at: at(1, 0),
            })
            .await;
        store
            .insert_step(SequenceStep {
                id: Uuid::new_v4(),
                campaign_id,
                step_number: 1,
                timing_days: Some(0),
                subject: "Hi".into(),
                content: "Hello".into(),
                created_at: at(1, 0),
            })
            .await;
        store
            .insert_settings(CampaignSettings {
                campaign_id,
                active_days: ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
                    .iter()
                    .map(|d| d.to_string())
                    .collect(),
                sending_start_time: Some("00:00".into()),
                sending_end_time: Some("24:00".into()),
                daily_contacts_limit: None,
                updated_at: at(1, 0),
            })
            .await;

        let mut ids = Vec::new();
        for (email, created) in [("early@example.com", at(1, 0)), ("late@example.com", at(20, 0))] {
            let id = Uuid::new_v4();
            store
                .insert_contact(Contact {
                    id,
                    campaign_id,
                    email: email.into(),
                    first_name: None,
                    last_name: None,
                    company: None,
                    location: Some("Tokyo".into()),
                    timezone: None,
                    sequence_step: 0,
                    last_contacted_at: None,
                    email_status: "Scheduled".into(),
                    next_email_due: None,
                    locked_until: None,
                    created_at: created,
                    updated_at: created,
                })
                .await;
            ids.push(id);
        }
        (store, campaign_id, ids[0], ids[1])
    }

    #[tokio::test]
    async fn test_due_contacts_only_lists_due() {
        let (store, campaign_id, early, _) = setup().await;
        let service = TimingService::new(Repositories::in_memory(store), SchedulingConfig::default());

        let due = service.due_contacts(campaign_id, at(5, 12)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].contact_id, early);
        assert_eq!(due[0].timezone, "Asia/Tokyo");
        assert!(due[0].business_hours.is_business_hours);
    }

    #[tokio::test]
    async fn test_next_send_for_checks_campaign() {
        let (store, campaign_id, _, late) = setup().await;
        let service = TimingService::new(Repositories::in_memory(store), SchedulingConfig::default());

        let next = service
            .next_send_for(campaign_id, late, at(5, 12))
            .await
            .unwrap()
            .unwrap();
        assert!(!next.due_now);
        assert_eq!(next.step_number, 1);

        assert!(matches!(
            service.next_send_for(Uuid::new_v4(), late, at(5, 12)).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_timings_is_idempotent() {
        let (store, campaign_id, early, _) = setup().await;
        let service = TimingService::new(
            Repositories::in_memory(store.clone()),
            SchedulingConfig::default(),
        );

        let first = service.sync_timings(campaign_id, at(5, 12)).await.unwrap();
        assert_eq!(first, SyncReport { updated: 2, cleared: 0, unchanged: 0 });
        assert!(store.contact(early).await.unwrap().next_email_due.is_some());

        let second = service.sync_timings(campaign_id, at(6, 12)).await.unwrap();
        assert_eq!(second, SyncReport { updated: 0, cleared: 0, unchanged: 2 });
    }
}
