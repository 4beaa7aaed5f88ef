//! Campaign sender repository

use crate::db::DatabasePool;
use crate::models::CampaignSender;
use async_trait::async_trait;
use cadence_common::types::{CampaignId, SenderId};
use cadence_common::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Campaign sender repository trait
#[async_trait]
pub trait SenderRepository: Send + Sync {
    /// Senders of a campaign in insertion order
    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<CampaignSender>>;

    /// First sender registered under this address, across campaigns
    async fn find_by_email(&self, email: &str) -> Result<Option<CampaignSender>>;

    /// Count one send against the sender's daily limit. Returns the updated
    /// sender, or `None` if the sender is inactive or already at its limit
    /// for `today`.
    async fn claim_send(
        &self,
        id: SenderId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<CampaignSender>>;
}

/// Database campaign sender repository
pub struct DbSenderRepository {
    pool: DatabasePool,
}

impl DbSenderRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SenderRepository for DbSenderRepository {
    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<CampaignSender>> {
        sqlx::query_as::<_, CampaignSender>(
            "SELECT * FROM campaign_senders WHERE campaign_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<CampaignSender>> {
        sqlx::query_as::<_, CampaignSender>(
            r#"
            SELECT * FROM campaign_senders
            WHERE lower(email) = lower($1)
            ORDER BY is_active DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn claim_send(
        &self,
        id: SenderId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<CampaignSender>> {
        sqlx::query_as::<_, CampaignSender>(
            r#"
            UPDATE campaign_senders SET
                emails_sent_today = CASE
                    WHEN counter_date = $2 THEN emails_sent_today + 1
                    ELSE 1
                END,
                counter_date = $2,
                last_used_at = $3
            WHERE id = $1
              AND is_active = true
              AND daily_limit > 0
              AND (counter_date IS DISTINCT FROM $2 OR emails_sent_today < daily_limit)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(today)
        .bind(now)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
