//! Campaign automation
//!
//! The runner walks active campaigns and sends due sequence steps; the
//! timing service answers read-only "when is the next send" questions and
//! re-syncs the cached `next_email_due` column.

pub mod runner;
pub mod timings;
pub mod worker;

pub use runner::{AutomationRunner, RunReport, RunRequest, RunStats, SkipReason};
pub use timings::{DueContact, SyncReport, TimingService};
pub use worker::AutomationWorker;

use crate::scheduling::SendingPolicy;
use cadence_common::config::SchedulingConfig;
use cadence_common::{Error, Result};
use cadence_storage::models::{Campaign, SequenceStep};
use cadence_storage::Repositories;

/// Everything needed to schedule one campaign's contacts
#[derive(Debug, Clone)]
pub struct CampaignPlan {
    pub campaign: Campaign,
    pub steps: Vec<SequenceStep>,
    pub policy: SendingPolicy,
}

impl CampaignPlan {
    /// Load steps and settings. A campaign whose settings leave nothing to
    /// schedule is reported as `Error::Validation`.
    pub async fn load(
        repos: &Repositories,
        scheduling: &SchedulingConfig,
        campaign: Campaign,
    ) -> Result<Self> {
        let steps = repos.campaigns.steps(campaign.id).await?;
        check_contiguous(&steps)
            .map_err(|e| Error::Validation(format!("campaign {}: {}", campaign.id, e)))?;

        let settings = repos.campaigns.settings(campaign.id).await?;
        let policy = SendingPolicy::resolve(settings.as_ref(), scheduling)
            .map_err(|e| Error::Validation(format!("campaign {}: {}", campaign.id, e)))?;

        Ok(Self {
            campaign,
            steps,
            policy,
        })
    }

    /// Load a campaign by id
    pub async fn load_by_id(
        repos: &Repositories,
        scheduling: &SchedulingConfig,
        campaign_id: uuid::Uuid,
    ) -> Result<Self> {
        let campaign = repos
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        Self::load(repos, scheduling, campaign).await
    }
}

/// Step numbers must run 1..=N without gaps
fn check_contiguous(steps: &[SequenceStep]) -> std::result::Result<(), String> {
    for (index, step) in steps.iter().enumerate() {
        let expected = index as i32 + 1;
        if step.step_number != expected {
            return Err(format!(
                "sequence step {} found where {} was expected",
                step.step_number, expected
            ));
        }
    }
    Ok(())
}
