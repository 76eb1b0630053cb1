//! Reminder scheduling and notification delivery.
//!
//! Two fused responsibilities: as an event consumer on `reminders` it turns
//! `reminder.created` into a durable scheduled job; as a job handler it
//! fires the reminder, delivering through the notification sink with a
//! bounded retry ladder and terminal states written database-first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    plan_reminder_outcome, AuditLogEntry, EventEnvelope, EventKind, Reminder, Topic,
};
use crate::domain::ports::{
    AuditStore, EventConsumer, JobStore, NewJob, NotificationPayload, NotificationSink,
    ReminderStore, ScheduledJob, TaskStore,
};

use super::job_scheduler::JobHandler;
use super::publisher::EventPublisher;

/// Consumer group name on `reminders`.
pub const NOTIFICATION_GROUP: &str = "notification";
/// Job kind dispatched to this service.
pub const DELIVER_JOB_KIND: &str = "reminder.deliver";

#[derive(Debug, Clone)]
pub struct ReminderSchedulerConfig {
    /// Delay ladder between delivery retries.
    pub retry_delays: Vec<Duration>,
    /// Per-attempt budget for the notification sink.
    pub sink_timeout: Duration,
}

impl Default for ReminderSchedulerConfig {
    fn default() -> Self {
        Self {
            retry_delays: vec![
                Duration::from_secs(5),
                Duration::from_secs(30),
                Duration::from_secs(120),
            ],
            sink_timeout: Duration::from_secs(5),
        }
    }
}

/// Payload stored on the scheduled job.
#[derive(Debug, Serialize, Deserialize)]
struct DeliverPayload {
    reminder_id: Uuid,
    task_id: Uuid,
    user_id: String,
}

pub struct NotificationService {
    reminders: Arc<dyn ReminderStore>,
    tasks: Arc<dyn TaskStore>,
    jobs: Arc<dyn JobStore>,
    audit: Arc<dyn AuditStore>,
    sink: Arc<dyn NotificationSink>,
    publisher: Arc<EventPublisher>,
    config: ReminderSchedulerConfig,
}

impl NotificationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reminders: Arc<dyn ReminderStore>,
        tasks: Arc<dyn TaskStore>,
        jobs: Arc<dyn JobStore>,
        audit: Arc<dyn AuditStore>,
        sink: Arc<dyn NotificationSink>,
        publisher: Arc<EventPublisher>,
        config: ReminderSchedulerConfig,
    ) -> Self {
        Self { reminders, tasks, jobs, audit, sink, publisher, config }
    }

    /// Re-arm jobs for pending reminders after a restart. Covers a crash
    /// between the reminder commit and the job insert; the dedup key makes
    /// this safe to run unconditionally.
    pub async fn backfill_jobs(&self) -> CoreResult<usize> {
        let pending = self.reminders.pending_reminders().await?;
        let mut enqueued = 0usize;
        for reminder in pending {
            if self.schedule_delivery(&reminder).await? {
                enqueued += 1;
            }
        }
        if enqueued > 0 {
            tracing::info!(enqueued, "backfilled reminder jobs");
        }
        Ok(enqueued)
    }

    async fn schedule_delivery(&self, reminder: &Reminder) -> CoreResult<bool> {
        let payload = serde_json::to_value(DeliverPayload {
            reminder_id: reminder.id,
            task_id: reminder.task_id,
            user_id: reminder.user_id.clone(),
        })?;
        self.jobs
            .enqueue(
                NewJob::new(DELIVER_JOB_KIND, reminder.reminder_time, payload)
                    .with_dedup_key(format!("reminder:{}", reminder.id)),
            )
            .await
    }

    async fn publish_outcome(&self, reminder: &Reminder, kind: EventKind) -> CoreResult<()> {
        for routed in plan_reminder_outcome(reminder, kind) {
            self.publisher.publish_durable(Topic::Reminders, routed.envelope).await?;
        }
        Ok(())
    }

    /// Mark moot (task gone or already completed) as sent-with-skip.
    async fn skip(&self, reminder_id: Uuid) -> CoreResult<()> {
        if let Some(updated) = self.reminders.try_mark_sent(reminder_id, Utc::now()).await? {
            self.publish_outcome(&updated, EventKind::ReminderSkipped(updated.clone()))
                .await?;
            tracing::info!(reminder_id = %reminder_id, "reminder skipped");
        }
        Ok(())
    }

    async fn succeed(&self, reminder_id: Uuid) -> CoreResult<()> {
        if let Some(updated) = self.reminders.try_mark_sent(reminder_id, Utc::now()).await? {
            self.publish_outcome(&updated, EventKind::ReminderSent(updated.clone())).await?;
            tracing::info!(reminder_id = %reminder_id, "reminder delivered");
        }
        Ok(())
    }

    async fn fail_terminal(&self, reminder_id: Uuid) -> CoreResult<()> {
        if let Some(updated) = self.reminders.try_mark_failed(reminder_id).await? {
            let envelope = plan_reminder_outcome(&updated, EventKind::ReminderFailed(updated.clone()))
                .remove(0)
                .envelope;

            // The audit group only follows task-events, so the terminal
            // failure is recorded here directly.
            let entry = AuditLogEntry::new(
                envelope.event_id,
                "reminder.failed",
                updated.user_id.clone(),
                Some(updated.task_id),
                serde_json::to_value(&updated)?,
                envelope.timestamp,
            );
            self.audit.append(&entry).await?;
            self.publisher.publish_durable(Topic::Reminders, envelope).await?;

            tracing::warn!(reminder_id = %reminder_id, "reminder failed terminally");
        }
        Ok(())
    }
}

#[async_trait]
impl EventConsumer for NotificationService {
    async fn handle(&self, envelope: EventEnvelope) -> CoreResult<()> {
        if !envelope.schema_accepted() {
            tracing::error!(
                event_id = %envelope.event_id,
                schema_version = %envelope.schema_version,
                "rejecting envelope with incompatible schema major"
            );
            return Ok(());
        }

        match &envelope.kind {
            EventKind::ReminderCreated(reminder) => {
                let enqueued = self.schedule_delivery(reminder).await?;
                if !enqueued {
                    tracing::debug!(reminder_id = %reminder.id, "delivery job already scheduled");
                }
                Ok(())
            }
            // Sent/skipped/failed flow through this group for observability.
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl JobHandler for NotificationService {
    async fn run(&self, job: &ScheduledJob) -> CoreResult<()> {
        let payload: DeliverPayload = serde_json::from_value(job.payload.clone())?;

        let reminder = match self.reminders.get(payload.reminder_id).await? {
            Some(reminder) => reminder,
            None => return Ok(()),
        };
        if reminder.status.is_terminal() {
            // Redelivered job; the outcome is already recorded.
            return Ok(());
        }

        let task = self.tasks.get_task(reminder.task_id, &reminder.user_id).await?;
        let task = match task {
            None => return self.skip(reminder.id).await,
            Some(task) if task.completed => return self.skip(reminder.id).await,
            Some(task) => task,
        };

        let payload = NotificationPayload { reminder: reminder.clone(), task };
        let delivery = tokio::time::timeout(
            self.config.sink_timeout,
            self.sink.deliver(&reminder.user_id, &payload),
        )
        .await
        .unwrap_or_else(|_| Err(CoreError::Unavailable("notification sink timed out".to_string())));

        match delivery {
            Ok(()) => self.succeed(reminder.id).await,
            Err(err) => {
                tracing::warn!(
                    reminder_id = %reminder.id,
                    retry_count = reminder.retry_count,
                    error = %err,
                    "notification delivery failed"
                );

                if !reminder.can_retry() {
                    // The retry budget was spent before this attempt; the
                    // final rung has now failed too.
                    return self.fail_terminal(reminder.id).await;
                }

                let updated = match self.reminders.increment_retry(reminder.id).await? {
                    Some(updated) => updated,
                    None => return Ok(()),
                };

                // retry_count is now the 1-based number of this retry, so
                // every configured rung (5s, 30s, 120s) gets consumed
                // before the budget runs dry.
                let rung = (updated.retry_count as usize).saturating_sub(1);
                let delay = self
                    .config
                    .retry_delays
                    .get(rung)
                    .copied()
                    .unwrap_or_else(|| {
                        *self.config.retry_delays.last().unwrap_or(&Duration::from_secs(120))
                    });
                let due = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(30));

                self.jobs
                    .enqueue(
                        NewJob::new(DELIVER_JOB_KIND, due, job.payload.clone()).with_dedup_key(
                            format!("reminder:{}:retry:{}", updated.id, updated.retry_count),
                        ),
                    )
                    .await?;
                Ok(())
            }
        }
    }
}
