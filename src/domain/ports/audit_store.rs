//! Audit store port.

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::AuditLogEntry;

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one entry. Returns `false` when an entry for the same
    /// `event_id` already exists (duplicate delivery), which callers treat
    /// as success.
    async fn append(&self, entry: &AuditLogEntry) -> CoreResult<bool>;

    /// A user's entries, newest first.
    async fn list_for_user(&self, user_id: &str, limit: u32) -> CoreResult<Vec<AuditLogEntry>>;
}
