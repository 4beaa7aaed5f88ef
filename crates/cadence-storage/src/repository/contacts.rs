//! Contact repository
//!
//! Claims and step advances are conditional updates so that two
//! overlapping automation passes never send the same step twice.

use crate::db::DatabasePool;
use crate::models::{Contact, ContactAdvance};
use async_trait::async_trait;
use cadence_common::types::{CampaignId, ContactId, EmailStatus};
use cadence_common::{Error, Result};
use chrono::{DateTime, Utc};

/// Contact repository trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn get(&self, id: ContactId) -> Result<Option<Contact>>;

    /// Contacts of a campaign that are not in a terminal status
    async fn list_pending(&self, campaign_id: CampaignId) -> Result<Vec<Contact>>;

    /// Case-insensitive lookup by address within a campaign
    async fn find_by_email(&self, campaign_id: CampaignId, email: &str) -> Result<Option<Contact>>;

    /// Take the send lease if the contact is still at `expected_step` and
    /// no unexpired lease exists. Returns whether the lease was taken.
    async fn claim(
        &self,
        id: ContactId,
        expected_step: i32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool>;

    /// Drop the send lease
    async fn release(&self, id: ContactId) -> Result<()>;

    /// Move the contact from `expected_step` to `next_step`. Returns false
    /// when the step changed underneath the caller.
    async fn advance(&self, advance: ContactAdvance) -> Result<bool>;

    async fn set_next_email_due(&self, id: ContactId, due: Option<DateTime<Utc>>) -> Result<()>;

    async fn set_status(&self, id: ContactId, status: EmailStatus) -> Result<()>;
}

/// Database contact repository
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for DbContactRepository {
    async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_pending(&self, campaign_id: CampaignId) -> Result<Vec<Contact>> {
        let terminal: Vec<String> = EmailStatus::terminal_labels()
            .iter()
            .map(|s| s.to_string())
            .collect();

        sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM contacts
            WHERE campaign_id = $1 AND NOT (email_status = ANY($2))
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(campaign_id)
        .bind(&terminal)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_email(&self, campaign_id: CampaignId, email: &str) -> Result<Option<Contact>> {
        sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE campaign_id = $1 AND lower(email) = lower($2) LIMIT 1",
        )
        .bind(campaign_id)
        .bind(email)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn claim(
        &self,
        id: ContactId,
        expected_step: i32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE contacts SET
                locked_until = $3,
                updated_at = $4
            WHERE id = $1
              AND sequence_step = $2
              AND (locked_until IS NULL OR locked_until < $4)
            "#,
        )
        .bind(id)
        .bind(expected_step)
        .bind(lease_until)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, id: ContactId) -> Result<()> {
        sqlx::query("UPDATE contacts SET locked_until = NULL WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn advance(&self, advance: ContactAdvance) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE contacts SET
                sequence_step = $6,
                last_contacted_at = $3,
                email_status = $4,
                next_email_due = $5,
                locked_until = NULL,
                updated_at = $3
            WHERE id = $1 AND sequence_step = $2
            "#,
        )
        .bind(advance.contact_id)
        .bind(advance.expected_step)
        .bind(advance.contacted_at)
        .bind(advance.email_status.to_string())
        .bind(advance.next_email_due)
        .bind(advance.next_step)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_next_email_due(&self, id: ContactId, due: Option<DateTime<Utc>>) -> Result<()> {
        sqlx::query("UPDATE contacts SET next_email_due = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(due)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_status(&self, id: ContactId, status: EmailStatus) -> Result<()> {
        let clear_due = status.is_terminal();
        sqlx::query(
            r#"
            UPDATE contacts SET
                email_status = $2,
                next_email_due = CASE WHEN $3 THEN NULL ELSE next_email_due END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(clear_due)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
