//! SQLite implementation of the OutboxStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::CoreResult;
use crate::domain::models::{EventEnvelope, Topic};
use crate::domain::ports::{OutboxStore, PendingEvent};

use super::{fmt_ts, parse_topic};

#[derive(Clone)]
pub struct SqliteOutboxStore {
    pool: SqlitePool,
}

impl SqliteOutboxStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    topic: String,
    envelope_json: String,
}

impl TryFrom<OutboxRow> for PendingEvent {
    type Error = crate::domain::errors::CoreError;

    fn try_from(row: OutboxRow) -> CoreResult<Self> {
        Ok(PendingEvent {
            outbox_id: row.id,
            topic: parse_topic(&row.topic)?,
            envelope: serde_json::from_str(&row.envelope_json)?,
        })
    }
}

#[async_trait]
impl OutboxStore for SqliteOutboxStore {
    async fn insert(&self, topic: Topic, envelope: &EventEnvelope) -> CoreResult<PendingEvent> {
        let envelope_json = serde_json::to_string(envelope)?;
        let outbox_id: i64 = sqlx::query_scalar(
            "INSERT INTO outbox (user_id, topic, envelope_json, created_at)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&envelope.user_id)
        .bind(topic.as_str())
        .bind(&envelope_json)
        .bind(fmt_ts(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        Ok(PendingEvent { outbox_id, topic, envelope: envelope.clone() })
    }

    async fn fetch_undelivered(&self, limit: u32) -> CoreResult<Vec<PendingEvent>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            "SELECT id, topic, envelope_json FROM outbox
             WHERE delivered_at IS NULL ORDER BY id LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PendingEvent::try_from).collect()
    }

    async fn mark_delivered(&self, outbox_id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE outbox SET delivered_at = ? WHERE id = ? AND delivered_at IS NULL")
            .bind(fmt_ts(Utc::now()))
            .bind(outbox_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn has_undelivered_before(&self, user_id: &str, outbox_id: i64) -> CoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outbox
             WHERE user_id = ? AND id < ? AND delivered_at IS NULL",
        )
        .bind(user_id)
        .bind(outbox_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn depth(&self) -> CoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE delivered_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }
}
