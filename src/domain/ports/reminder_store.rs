//! Reminder store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::Reminder;
use crate::domain::ports::outbox_store::PendingEvent;

#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Insert a reminder for an existing task and write its
    /// `reminder.created` event to the outbox in the same transaction.
    async fn commit_reminder_create(
        &self,
        reminder: Reminder,
    ) -> CoreResult<(Reminder, Vec<PendingEvent>)>;

    async fn get(&self, reminder_id: Uuid) -> CoreResult<Option<Reminder>>;

    async fn list_for_task(&self, task_id: Uuid, user_id: &str) -> CoreResult<Vec<Reminder>>;

    /// Conditionally move `pending -> sent`. Returns `None` when the row was
    /// not pending anymore (the transition already happened elsewhere).
    async fn try_mark_sent(
        &self,
        reminder_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> CoreResult<Option<Reminder>>;

    /// Conditionally move `pending -> failed`. Returns `None` when the row
    /// was not pending anymore.
    async fn try_mark_failed(&self, reminder_id: Uuid) -> CoreResult<Option<Reminder>>;

    /// Bump the retry counter on a still-pending reminder.
    async fn increment_retry(&self, reminder_id: Uuid) -> CoreResult<Option<Reminder>>;

    /// All reminders still pending; used for startup job backfill.
    async fn pending_reminders(&self) -> CoreResult<Vec<Reminder>>;
}
