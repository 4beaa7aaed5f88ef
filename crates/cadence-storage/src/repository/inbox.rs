//! Unified inbox repository

use crate::db::DatabasePool;
use crate::models::{InboxMessage, NewInboxMessage, ThreadUpsert};
use async_trait::async_trait;
use cadence_common::types::{ContactId, EmailStatus, UserId};
use cadence_common::{Error, Result};
use uuid::Uuid;

/// Inbox repository trait
#[async_trait]
pub trait InboxRepository: Send + Sync {
    /// Insert a message, fold it into its thread and mark `replied_contact`
    /// as replied, as one unit. Returns `None` and writes nothing when
    /// `(user_id, message_id)` already exists.
    async fn store_message(
        &self,
        message: NewInboxMessage,
        thread: ThreadUpsert,
        replied_contact: Option<ContactId>,
    ) -> Result<Option<InboxMessage>>;

    async fn messages_in_conversation(
        &self,
        user_id: UserId,
        conversation_id: &str,
    ) -> Result<Vec<InboxMessage>>;
}

/// Database inbox repository
pub struct DbInboxRepository {
    pool: DatabasePool,
}

impl DbInboxRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InboxRepository for DbInboxRepository {
    async fn store_message(
        &self,
        input: NewInboxMessage,
        thread: ThreadUpsert,
        replied_contact: Option<ContactId>,
    ) -> Result<Option<InboxMessage>> {
        let attachments = serde_json::to_value(&input.attachments)
            .map_err(|e| Error::Internal(format!("Failed to encode attachments: {}", e)))?;

        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let inserted = sqlx::query_as::<_, InboxMessage>(
            r#"
            INSERT INTO inbox_messages (
                id, user_id, message_id, conversation_id, campaign_id, contact_id,
                contact_email, sender_email, subject, body_text, body_html,
                direction, channel, status, folder, has_attachments, attachments,
                in_reply_to, reference_ids, sent_at, received_at, provider, provider_data
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, 'email', $13, 'inbox', $14, $15, $16, $17, $18, $19, $20, $21
            )
            ON CONFLICT (user_id, message_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.user_id)
        .bind(&input.message_id)
        .bind(&input.conversation_id)
        .bind(input.campaign_id)
        .bind(input.contact_id)
        .bind(&input.contact_email)
        .bind(&input.sender_email)
        .bind(&input.subject)
        .bind(&input.body_text)
        .bind(&input.body_html)
        .bind(&input.direction)
        .bind(&input.status)
        .bind(!input.attachments.is_empty())
        .bind(&attachments)
        .bind(&input.in_reply_to)
        .bind(&input.reference_ids)
        .bind(input.sent_at)
        .bind(input.received_at)
        .bind(&input.provider)
        .bind(&input.provider_data)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        // dropping the transaction rolls it back
        let Some(message) = inserted else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO inbox_threads (
                id, conversation_id, user_id, campaign_id, contact_email, subject,
                last_message_at, last_message_preview, message_count, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9, NOW(), NOW())
            ON CONFLICT (conversation_id, user_id) DO UPDATE SET
                last_message_at = GREATEST(inbox_threads.last_message_at, EXCLUDED.last_message_at),
                last_message_preview = EXCLUDED.last_message_preview,
                message_count = inbox_threads.message_count + 1,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&thread.conversation_id)
        .bind(thread.user_id)
        .bind(thread.campaign_id)
        .bind(&thread.contact_email)
        .bind(&thread.subject)
        .bind(thread.last_message_at)
        .bind(&thread.last_message_preview)
        .bind(&thread.status)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if let Some(contact_id) = replied_contact {
            let result = sqlx::query(
                r#"
                UPDATE contacts SET
                    email_status = $2,
                    next_email_due = NULL,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(contact_id)
            .bind(EmailStatus::Replied.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

            if result.rows_affected() == 0 {
                return Err(Error::NotFound(format!("contact {}", contact_id)));
            }
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Some(message))
    }

    async fn messages_in_conversation(
        &self,
        user_id: UserId,
        conversation_id: &str,
    ) -> Result<Vec<InboxMessage>> {
        sqlx::query_as::<_, InboxMessage>(
            r#"
            SELECT * FROM inbox_messages
            WHERE user_id = $1 AND conversation_id = $2
            ORDER BY sent_at ASC
            "#,
        )
        .bind(user_id)
        .bind(conversation_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
