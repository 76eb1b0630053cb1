//! SQLite implementation of the ReminderStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{plan_reminder_outcome, EventKind, Reminder};
use crate::domain::ports::{PendingEvent, ReminderStore};

use super::task_store::ReminderRow;
use super::{fmt_ts, insert_outbox_tx};

#[derive(Clone)]
pub struct SqliteReminderStore {
    pool: SqlitePool,
}

impl SqliteReminderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, reminder_id: Uuid) -> CoreResult<Option<Reminder>> {
        let row: Option<ReminderRow> =
            sqlx::query_as("SELECT * FROM reminders WHERE id = ?")
                .bind(reminder_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Reminder::try_from).transpose()
    }
}

#[async_trait]
impl ReminderStore for SqliteReminderStore {
    async fn commit_reminder_create(
        &self,
        reminder: Reminder,
    ) -> CoreResult<(Reminder, Vec<PendingEvent>)> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO reminders (id, task_id, user_id, reminder_time, status,
               delivery_method, retry_count, created_at, sent_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(reminder.id.to_string())
        .bind(reminder.task_id.to_string())
        .bind(&reminder.user_id)
        .bind(fmt_ts(reminder.reminder_time))
        .bind(reminder.status.as_str())
        .bind(&reminder.delivery_method)
        .bind(i64::from(reminder.retry_count))
        .bind(fmt_ts(reminder.created_at))
        .bind(reminder.sent_at.map(fmt_ts))
        .execute(&mut *tx)
        .await?;

        let plan =
            plan_reminder_outcome(&reminder, EventKind::ReminderCreated(reminder.clone()));
        let events = insert_outbox_tx(&mut tx, plan).await?;
        tx.commit().await?;
        Ok((reminder, events))
    }

    async fn get(&self, reminder_id: Uuid) -> CoreResult<Option<Reminder>> {
        self.fetch(reminder_id).await
    }

    async fn list_for_task(&self, task_id: Uuid, user_id: &str) -> CoreResult<Vec<Reminder>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT * FROM reminders WHERE task_id = ? AND user_id = ? ORDER BY reminder_time",
        )
        .bind(task_id.to_string())
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Reminder::try_from).collect()
    }

    async fn try_mark_sent(
        &self,
        reminder_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> CoreResult<Option<Reminder>> {
        let result = sqlx::query(
            "UPDATE reminders SET status = 'sent', sent_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(fmt_ts(sent_at))
        .bind(reminder_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch(reminder_id).await
    }

    async fn try_mark_failed(&self, reminder_id: Uuid) -> CoreResult<Option<Reminder>> {
        let result = sqlx::query(
            "UPDATE reminders SET status = 'failed' WHERE id = ? AND status = 'pending'",
        )
        .bind(reminder_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch(reminder_id).await
    }

    async fn increment_retry(&self, reminder_id: Uuid) -> CoreResult<Option<Reminder>> {
        let result = sqlx::query(
            "UPDATE reminders SET retry_count = retry_count + 1
             WHERE id = ? AND status = 'pending'",
        )
        .bind(reminder_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch(reminder_id).await
    }

    async fn pending_reminders(&self) -> CoreResult<Vec<Reminder>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT * FROM reminders WHERE status = 'pending' ORDER BY reminder_time",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Reminder::try_from).collect()
    }
}
