//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignSettings, SequenceStep};
use async_trait::async_trait;
use cadence_common::types::{CampaignId, CampaignStatus};
use cadence_common::{Error, Result};

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    /// Campaigns with status `Active`
    async fn list_active(&self) -> Result<Vec<Campaign>>;
    /// Sequence steps ordered by `step_number`
    async fn steps(&self, campaign_id: CampaignId) -> Result<Vec<SequenceStep>>;
    async fn settings(&self, campaign_id: CampaignId) -> Result<Option<CampaignSettings>>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(CampaignStatus::Active.to_string())
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn steps(&self, campaign_id: CampaignId) -> Result<Vec<SequenceStep>> {
        sqlx::query_as::<_, SequenceStep>(
            "SELECT * FROM campaign_sequences WHERE campaign_id = $1 ORDER BY step_number ASC",
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn settings(&self, campaign_id: CampaignId) -> Result<Option<CampaignSettings>> {
        sqlx::query_as::<_, CampaignSettings>(
            "SELECT * FROM campaign_settings WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
