//! Mutation API: the single write path for tasks and reminders.
//!
//! Every operation follows commit-then-publish: validate, commit one
//! transaction (business rows + outbox rows), then fast-path the pending
//! events onto the bus. A publish failure never rolls back the commit;
//! the operation still succeeds and the sweeper delivers later.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    validate_interval, validate_reminder_time, validate_tags, validate_title, RecurrencePattern,
    RecurrenceRule, Reminder, Task, TaskPage, TaskPatch, TaskPriority, TaskQuery,
};
use crate::domain::ports::{ReminderStore, TaskCreateSpec, TaskStore};

use super::publisher::EventPublisher;

/// Recurrence settings accepted at task creation.
#[derive(Debug, Clone, Deserialize)]
pub struct RecurrenceInput {
    pub pattern: RecurrencePattern,
    pub interval: u32,
}

/// Reminder settings accepted at task creation.
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderInput {
    pub reminder_time: DateTime<Utc>,
    pub delivery_method: Option<String>,
}

/// Closed record of task-creation options.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceInput>,
    #[serde(default)]
    pub reminders: Vec<ReminderInput>,
}

pub struct MutationService {
    tasks: Arc<dyn TaskStore>,
    reminders: Arc<dyn ReminderStore>,
    publisher: Arc<EventPublisher>,
}

impl MutationService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        reminders: Arc<dyn ReminderStore>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self { tasks, reminders, publisher }
    }

    pub async fn create_task(&self, user_id: &str, input: CreateTaskInput) -> CoreResult<Task> {
        let now = Utc::now();

        validate_title(&input.title)?;
        if let Some(tags) = &input.tags {
            validate_tags(tags)?;
        }
        if let Some(due) = input.due_date {
            if due <= now {
                return Err(CoreError::invalid("due_date", "must be strictly in the future"));
            }
        }
        if let Some(recurrence) = &input.recurrence {
            validate_interval(recurrence.pattern, recurrence.interval)?;
        }

        let mut task = Task::new(user_id, input.title);
        if let Some(description) = input.description {
            task = task.with_description(description);
        }
        if let Some(priority) = input.priority {
            task = task.with_priority(priority);
        }
        if let Some(tags) = input.tags {
            task = task.with_tags(tags);
        }
        if let Some(due) = input.due_date {
            task = task.with_due_date(due);
        }

        let rule = input
            .recurrence
            .as_ref()
            .map(|r| RecurrenceRule::new(&task, r.pattern, r.interval));
        if let Some(rule) = &rule {
            task.recurrence_id = Some(rule.id);
        }

        let mut reminders = Vec::with_capacity(input.reminders.len());
        for spec in input.reminders {
            validate_reminder_time(spec.reminder_time, task.due_date, now)?;
            let mut reminder = Reminder::new(&task, spec.reminder_time);
            if let Some(method) = spec.delivery_method {
                reminder = reminder.with_delivery_method(method);
            }
            reminders.push(reminder);
        }

        let (task, events) = self
            .tasks
            .commit_task_create(TaskCreateSpec { task, rule, reminders })
            .await?;
        self.publisher.publish_pending(events).await;

        tracing::info!(task_id = %task.id, user_id, "task created");
        Ok(task)
    }

    /// Create the next instance of a recurring chain. Only the recurring
    /// generator calls this: the snapshot comes from the rule and the due
    /// date may legitimately lie in the past when a task was completed late.
    pub async fn create_generated_instance(
        &self,
        rule: &RecurrenceRule,
        due_date: DateTime<Utc>,
    ) -> CoreResult<Task> {
        let task = Task::new(rule.user_id.clone(), rule.metadata.title.clone())
            .with_priority(rule.metadata.priority)
            .with_tags(rule.metadata.tags.clone())
            .with_due_date(due_date)
            .with_recurrence(rule.id);
        let task = match &rule.metadata.description {
            Some(description) => task.with_description(description.clone()),
            None => task,
        };

        let (task, events) = self
            .tasks
            .commit_task_create(TaskCreateSpec::task_only(task))
            .await?;
        self.publisher.publish_pending(events).await;

        tracing::info!(
            task_id = %task.id,
            rule_id = %rule.id,
            user_id = %rule.user_id,
            "recurring instance generated"
        );
        Ok(task)
    }

    pub async fn update_task(
        &self,
        user_id: &str,
        task_id: Uuid,
        patch: TaskPatch,
    ) -> CoreResult<Task> {
        patch.validate()?;

        if patch.is_empty() {
            // Nothing to change; report current state without publishing.
            return self
                .tasks
                .get_task(task_id, user_id)
                .await?
                .ok_or_else(|| CoreError::not_found("task"));
        }

        let (_, new, events) = self.tasks.commit_task_update(task_id, user_id, patch).await?;
        self.publisher.publish_pending(events).await;

        tracing::info!(task_id = %task_id, user_id, "task updated");
        Ok(new)
    }

    pub async fn complete_task(&self, user_id: &str, task_id: Uuid) -> CoreResult<Task> {
        let outcome = self.tasks.commit_task_complete(task_id, user_id).await?;

        if outcome.changed {
            self.publisher.publish_pending(outcome.events).await;
            tracing::info!(task_id = %task_id, user_id, "task completed");
        } else {
            tracing::debug!(task_id = %task_id, user_id, "complete was a no-op");
        }
        Ok(outcome.new)
    }

    pub async fn delete_task(&self, user_id: &str, task_id: Uuid) -> CoreResult<()> {
        let (_, events) = self.tasks.commit_task_delete(task_id, user_id).await?;
        self.publisher.publish_pending(events).await;

        tracing::info!(task_id = %task_id, user_id, "task deleted");
        Ok(())
    }

    pub async fn get_task(&self, user_id: &str, task_id: Uuid) -> CoreResult<Task> {
        self.tasks
            .get_task(task_id, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task"))
    }

    pub async fn list_tasks(&self, user_id: &str, query: TaskQuery) -> CoreResult<TaskPage> {
        self.tasks.list_tasks(user_id, &query).await
    }

    pub async fn list_reminders(
        &self,
        user_id: &str,
        task_id: Uuid,
    ) -> CoreResult<Vec<Reminder>> {
        // Surface the same NotFound a missing task would give, never an
        // empty list for someone else's task.
        self.tasks
            .get_task(task_id, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task"))?;
        self.reminders.list_for_task(task_id, user_id).await
    }

    pub async fn schedule_reminder(
        &self,
        user_id: &str,
        task_id: Uuid,
        input: ReminderInput,
    ) -> CoreResult<Reminder> {
        let task = self
            .tasks
            .get_task(task_id, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task"))?;

        validate_reminder_time(input.reminder_time, task.due_date, Utc::now())?;

        let mut reminder = Reminder::new(&task, input.reminder_time);
        if let Some(method) = input.delivery_method {
            reminder = reminder.with_delivery_method(method);
        }

        let (reminder, events) = self.reminders.commit_reminder_create(reminder).await?;
        self.publisher.publish_pending(events).await;

        tracing::info!(reminder_id = %reminder.id, task_id = %task_id, user_id, "reminder scheduled");
        Ok(reminder)
    }
}
