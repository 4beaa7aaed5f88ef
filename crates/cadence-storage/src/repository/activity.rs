//! Send tracking and automation event log

use crate::db::DatabasePool;
use crate::models::{AutomationLog, EmailSend, NewAutomationLog, NewEmailSend, SendStatus};
use async_trait::async_trait;
use cadence_common::types::{CampaignId, RunId};
use cadence_common::{Error, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Activity repository trait
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn record_send(&self, input: NewEmailSend) -> Result<EmailSend>;

    /// Successful sends of a campaign at or after `since`
    async fn count_sends_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64>;

    async fn log(&self, input: NewAutomationLog) -> Result<()>;

    async fn logs_for_run(&self, run_id: RunId) -> Result<Vec<AutomationLog>>;
}

/// Database activity repository
pub struct DbActivityRepository {
    pool: DatabasePool,
}

impl DbActivityRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for DbActivityRepository {
    async fn record_send(&self, input: NewEmailSend) -> Result<EmailSend> {
        sqlx::query_as::<_, EmailSend>(
            r#"
            INSERT INTO email_sends (
                id, campaign_id, contact_id, sender_id, sequence_step,
                status, provider_message_id, error, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.campaign_id)
        .bind(input.contact_id)
        .bind(input.sender_id)
        .bind(input.sequence_step)
        .bind(input.status.to_string())
        .bind(&input.provider_message_id)
        .bind(&input.error)
        .bind(input.created_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_sends_since(&self, campaign_id: CampaignId, since: DateTime<Utc>) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM email_sends
            WHERE campaign_id = $1 AND status = $2 AND created_at >= $3
            "#,
        )
        .bind(campaign_id)
        .bind(SendStatus::Sent.to_string())
        .bind(since)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn log(&self, input: NewAutomationLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_logs (
                id, run_id, campaign_id, contact_id, sender_id,
                log_type, status, message, skip_reason, details, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.run_id)
        .bind(input.campaign_id)
        .bind(input.contact_id)
        .bind(input.sender_id)
        .bind(&input.log_type)
        .bind(&input.status)
        .bind(&input.message)
        .bind(&input.skip_reason)
        .bind(&input.details)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn logs_for_run(&self, run_id: RunId) -> Result<Vec<AutomationLog>> {
        sqlx::query_as::<_, AutomationLog>(
            "SELECT * FROM automation_logs WHERE run_id = $1 ORDER BY created_at ASC",
        )
        .bind(run_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
