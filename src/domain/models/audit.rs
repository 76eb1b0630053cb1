//! Audit log domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable change record. Rows are append-only; the schema rejects
/// updates and deletes outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// The envelope `event_id` this entry was derived from; unique, so a
    /// redelivered event collapses into a single row.
    pub event_id: Uuid,
    /// Reverse-dotted event type, e.g. `task.created`.
    pub event_type: String,
    pub user_id: String,
    pub task_id: Option<Uuid>,
    /// The event payload as it appeared on the wire.
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        user_id: impl Into<String>,
        task_id: Option<Uuid>,
        details: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            event_type: event_type.into(),
            user_id: user_id.into(),
            task_id,
            details,
            timestamp,
        }
    }
}
