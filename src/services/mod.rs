//! Service layer: the mutation API, the consumers, and the schedulers.

pub mod audit_consumer;
pub mod broadcaster;
pub mod job_scheduler;
pub mod mutation;
pub mod outbox_sweeper;
pub mod publisher;
pub mod recurrence_generator;
pub mod reminder_scheduler;
pub mod retry;

pub use audit_consumer::{AuditConsumer, AUDIT_GROUP};
pub use broadcaster::{ConnectionRegistry, UpdateBroadcaster, UpdateFrame};
pub use job_scheduler::{JobHandler, JobScheduler, JobSchedulerConfig};
pub use mutation::{CreateTaskInput, MutationService, RecurrenceInput, ReminderInput};
pub use outbox_sweeper::{OutboxSweeper, SweeperConfig};
pub use publisher::{EventPublisher, PublisherConfig};
pub use recurrence_generator::{RecurrenceGenerator, GENERATOR_GROUP};
pub use reminder_scheduler::{
    NotificationService, ReminderSchedulerConfig, DELIVER_JOB_KIND, NOTIFICATION_GROUP,
};
pub use retry::RetryPolicy;
