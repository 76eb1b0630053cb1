//! Ports: the traits the service layer is written against.

pub mod audit_store;
pub mod event_bus;
pub mod job_store;
pub mod notification;
pub mod outbox_store;
pub mod reminder_store;
pub mod task_store;

pub use audit_store::AuditStore;
pub use event_bus::{EventBus, EventConsumer};
pub use job_store::{JobState, JobStore, NewJob, ScheduledJob};
pub use notification::{NotificationPayload, NotificationSink};
pub use outbox_store::{OutboxStore, PendingEvent};
pub use reminder_store::ReminderStore;
pub use task_store::{CompleteOutcome, TaskCreateSpec, TaskStore};
