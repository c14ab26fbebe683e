//! Postgres validation queue.
//!
//! Claims use FOR UPDATE SKIP LOCKED so several listeners can drain the same
//! table. A claimed row is hidden for the visibility timeout; if the
//! consumer dies the row reappears on its own.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{MessageId, QueueMessage, ValidationQueue, ValidationRequest};
use crate::error::QueueError;

/// How long a claimed message stays hidden.
const VISIBILITY_TIMEOUT_SECS: f64 = 300.0;

pub struct PgValidationQueue {
    pool: PgPool,
    retry_delay: Duration,
}

impl PgValidationQueue {
    pub fn new(pool: PgPool, retry_delay: Duration) -> Self {
        Self { pool, retry_delay }
    }
}

#[async_trait]
impl ValidationQueue for PgValidationQueue {
    async fn send(&self, request: &ValidationRequest) -> Result<MessageId, QueueError> {
        let body = serde_json::to_string(request)?;
        let row = sqlx::query(
            r#"
            INSERT INTO onboarding.validation_queue (body)
            VALUES ($1)
            RETURNING id
            "#,
        )
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let rows = sqlx::query(
            r#"
            WITH next AS (
                SELECT id
                FROM onboarding.validation_queue
                WHERE visible_at <= now()
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            UPDATE onboarding.validation_queue q
            SET receive_count = q.receive_count + 1,
                visible_at = now() + make_interval(secs => $2)
            FROM next
            WHERE q.id = next.id
            RETURNING q.id, q.body, q.receive_count
            "#,
        )
        .bind(max as i64)
        .bind(VISIBILITY_TIMEOUT_SECS)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let receive_count: i32 = row.try_get("receive_count")?;
            messages.push(QueueMessage {
                id: row.try_get("id")?,
                body: row.try_get("body")?,
                receive_count: receive_count.max(0) as u32,
            });
        }
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    async fn ack(&self, ids: &[MessageId]) -> Result<(), QueueError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(r#"DELETE FROM onboarding.validation_queue WHERE id = ANY($1)"#)
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release(&self, ids: &[MessageId]) -> Result<(), QueueError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE onboarding.validation_queue
            SET visible_at = now() + make_interval(secs => $2)
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(self.retry_delay.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dead_letter(&self, messages: &[QueueMessage]) -> Result<(), QueueError> {
        if messages.is_empty() {
            return Ok(());
        }
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();

        // Single statement: either every message moves or none does.
        sqlx::query(
            r#"
            WITH moved AS (
                DELETE FROM onboarding.validation_queue
                WHERE id = ANY($1)
                RETURNING id, body, receive_count
            )
            INSERT INTO onboarding.validation_dead_letter (message_id, body, receive_count)
            SELECT id, body, receive_count FROM moved
            "#,
        )
        .bind(&ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
