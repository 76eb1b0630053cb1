//! Audit consumer: mirrors `task-events` into the append-only audit log.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::{AuditLogEntry, EventEnvelope};
use crate::domain::ports::{AuditStore, EventConsumer};

/// Consumer group name on `task-events`.
pub const AUDIT_GROUP: &str = "audit";

pub struct AuditConsumer {
    store: Arc<dyn AuditStore>,
}

impl AuditConsumer {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventConsumer for AuditConsumer {
    async fn handle(&self, envelope: EventEnvelope) -> CoreResult<()> {
        if !envelope.schema_accepted() {
            tracing::error!(
                event_id = %envelope.event_id,
                schema_version = %envelope.schema_version,
                "rejecting envelope with incompatible schema major"
            );
            return Ok(());
        }

        // `details` is the payload exactly as it appeared on the wire.
        let details = serde_json::to_value(&envelope.kind)?
            .get("task_data")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let entry = AuditLogEntry::new(
            envelope.event_id,
            envelope.event_type(),
            envelope.user_id.clone(),
            envelope.task_id,
            details,
            envelope.timestamp,
        );

        let inserted = self.store.append(&entry).await?;
        if !inserted {
            tracing::debug!(event_id = %envelope.event_id, "duplicate delivery, audit row exists");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::CoreResult;
    use crate::domain::models::{EventKind, Task};
    use tokio::sync::Mutex;

    struct FakeStore {
        rows: Mutex<Vec<AuditLogEntry>>,
    }

    impl FakeStore {
        fn new() -> Arc<Self> {
            Arc::new(Self { rows: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl AuditStore for FakeStore {
        async fn append(&self, entry: &AuditLogEntry) -> CoreResult<bool> {
            let mut rows = self.rows.lock().await;
            if rows.iter().any(|r| r.event_id == entry.event_id) {
                return Ok(false);
            }
            rows.push(entry.clone());
            Ok(true)
        }

        async fn list_for_user(&self, user_id: &str, _limit: u32) -> CoreResult<Vec<AuditLogEntry>> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    fn created_envelope() -> EventEnvelope {
        let task = Task::new("alice", "t");
        EventEnvelope::new("alice", Some(task.id), EventKind::TaskCreated(task))
    }

    #[tokio::test]
    async fn writes_one_row_with_the_wire_payload() {
        let store = FakeStore::new();
        let consumer = AuditConsumer::new(store.clone());

        let envelope = created_envelope();
        consumer.handle(envelope.clone()).await.unwrap();

        let rows = store.rows.lock().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "task.created");
        assert_eq!(rows[0].event_id, envelope.event_id);
        assert_eq!(rows[0].details["title"], "t");
    }

    #[tokio::test]
    async fn redelivery_is_acked_without_a_second_row() {
        let store = FakeStore::new();
        let consumer = AuditConsumer::new(store.clone());

        let envelope = created_envelope();
        consumer.handle(envelope.clone()).await.unwrap();
        consumer.handle(envelope).await.unwrap();

        assert_eq!(store.rows.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn incompatible_major_is_rejected_but_acked() {
        let store = FakeStore::new();
        let consumer = AuditConsumer::new(store.clone());

        let mut envelope = created_envelope();
        envelope.schema_version = "2.0.0".to_string();
        consumer.handle(envelope).await.unwrap();

        assert!(store.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn newer_minor_within_major_is_accepted() {
        let store = FakeStore::new();
        let consumer = AuditConsumer::new(store.clone());

        let mut envelope = created_envelope();
        envelope.schema_version = "1.7.2".to_string();
        consumer.handle(envelope).await.unwrap();

        assert_eq!(store.rows.lock().await.len(), 1);
    }
}
