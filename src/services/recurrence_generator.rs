//! Recurring-task generator.
//!
//! Consumes `task-events` and materialises the next instance of a chain
//! when an instance completes. Idempotency is state reconciliation: the
//! generator re-reads the database before acting, and the partial unique
//! index on pending chain members backstops any race it cannot see.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{EventEnvelope, EventKind};
use crate::domain::ports::{EventConsumer, TaskStore};

use super::mutation::MutationService;

/// Consumer group name on `task-events`.
pub const GENERATOR_GROUP: &str = "recurring-generator";

pub struct RecurrenceGenerator {
    tasks: Arc<dyn TaskStore>,
    mutation: Arc<MutationService>,
}

impl RecurrenceGenerator {
    pub fn new(tasks: Arc<dyn TaskStore>, mutation: Arc<MutationService>) -> Self {
        Self { tasks, mutation }
    }
}

#[async_trait]
impl EventConsumer for RecurrenceGenerator {
    async fn handle(&self, envelope: EventEnvelope) -> CoreResult<()> {
        if !envelope.schema_accepted() {
            tracing::error!(
                event_id = %envelope.event_id,
                schema_version = %envelope.schema_version,
                "rejecting envelope with incompatible schema major"
            );
            return Ok(());
        }

        let snapshot = match &envelope.kind {
            EventKind::TaskCompleted(task) => task,
            _ => return Ok(()),
        };

        // Reconcile against current state rather than trusting the event:
        // the task may have been deleted or re-opened since publish.
        let task = match self.tasks.get_task(snapshot.id, &envelope.user_id).await? {
            Some(task) => task,
            None => return Ok(()),
        };
        if !task.completed {
            return Ok(());
        }
        let rule_id = match task.recurrence_id {
            Some(rule_id) => rule_id,
            None => return Ok(()),
        };

        let rule = match self.tasks.get_rule(rule_id, &envelope.user_id).await? {
            Some(rule) => rule,
            None => return Ok(()),
        };

        if self.tasks.find_pending_in_chain(rule.id).await?.is_some() {
            // The next instance is already materialised.
            return Ok(());
        }

        let next_due = rule.next_due_date(task.due_date.unwrap_or_else(Utc::now));

        match self.mutation.create_generated_instance(&rule, next_due).await {
            Ok(_) => Ok(()),
            Err(CoreError::Conflict(_)) => {
                // Lost the race to another delivery; the instance exists.
                tracing::debug!(rule_id = %rule.id, "pending instance already present");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
