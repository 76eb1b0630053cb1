//! Task store port.
//!
//! The store owns row lifetimes and executes every compound mutation as a
//! single transaction; the event plan for each mutation is written to the
//! outbox in that same transaction. Callers receive the persisted entities
//! plus the pending outbox events to fast-path onto the bus.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{
    RecurrenceRule, Reminder, Task, TaskPage, TaskPatch, TaskQuery,
};
use crate::domain::ports::outbox_store::PendingEvent;

/// Everything inserted by one `commit_task_create` transaction.
#[derive(Debug, Clone)]
pub struct TaskCreateSpec {
    pub task: Task,
    pub rule: Option<RecurrenceRule>,
    pub reminders: Vec<Reminder>,
}

impl TaskCreateSpec {
    pub fn task_only(task: Task) -> Self {
        Self { task, rule: None, reminders: Vec::new() }
    }
}

/// Result of `commit_task_complete`.
#[derive(Debug, Clone)]
pub struct CompleteOutcome {
    pub old: Task,
    pub new: Task,
    /// False when the task was already completed; the caller suppresses
    /// event publish in that case (no outbox rows were written either).
    pub changed: bool,
    pub events: Vec<PendingEvent>,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task together with its optional recurrence rule and
    /// reminders, atomically, and return the pending events.
    async fn commit_task_create(
        &self,
        spec: TaskCreateSpec,
    ) -> CoreResult<(Task, Vec<PendingEvent>)>;

    /// Apply a patch and return `(old, new)` snapshots for event diffing.
    async fn commit_task_update(
        &self,
        task_id: Uuid,
        user_id: &str,
        patch: TaskPatch,
    ) -> CoreResult<(Task, Task, Vec<PendingEvent>)>;

    /// Mark a task completed. Idempotent: completing an already-completed
    /// task reports `changed: false` and writes nothing.
    async fn commit_task_complete(
        &self,
        task_id: Uuid,
        user_id: &str,
    ) -> CoreResult<CompleteOutcome>;

    /// Delete a task; reminders cascade, and when the task is a recurrence
    /// template the rule is destroyed and descendants are detached.
    async fn commit_task_delete(
        &self,
        task_id: Uuid,
        user_id: &str,
    ) -> CoreResult<(Task, Vec<PendingEvent>)>;

    /// Fetch a task scoped by owner. A row owned by someone else is `None`.
    async fn get_task(&self, task_id: Uuid, user_id: &str) -> CoreResult<Option<Task>>;

    /// List a user's tasks with filtering, sorting, and keyset pagination.
    async fn list_tasks(&self, user_id: &str, query: &TaskQuery) -> CoreResult<TaskPage>;

    /// Fetch a recurrence rule scoped by owner.
    async fn get_rule(&self, rule_id: Uuid, user_id: &str)
        -> CoreResult<Option<RecurrenceRule>>;

    /// Find the pending (not completed) task in a recurring chain, if any.
    /// This is the generator's state-reconciliation guard.
    async fn find_pending_in_chain(&self, rule_id: Uuid) -> CoreResult<Option<Task>>;
}
