//! Domain models.

pub mod audit;
pub mod event;
pub mod recurrence;
pub mod reminder;
pub mod task;

pub use audit::AuditLogEntry;
pub use event::{
    plan_reminder_outcome, plan_task_completed, plan_task_created, plan_task_deleted,
    plan_task_updated, EventEnvelope, EventKind, RoutedEvent, Topic, SCHEMA_VERSION,
};
pub use recurrence::{
    next_due_date, validate_interval, RecurrencePattern, RecurrenceRule, TemplateSnapshot,
};
pub use reminder::{
    validate_reminder_time, Reminder, ReminderStatus, MAX_DELIVERY_RETRIES,
};
pub use task::{
    validate_tags, validate_title, StatusFilter, Task, TaskPage, TaskPatch, TaskPriority,
    TaskQuery, TaskSort, MAX_TAGS, MAX_TAG_LEN, MAX_TITLE_LEN,
};
