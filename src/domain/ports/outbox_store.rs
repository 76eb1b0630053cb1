//! Outbox store port.
//!
//! The outbox holds committed-but-unpublished events. Rows are written in
//! the same transaction as the business data and drained FIFO per user, so
//! per-user publish order always matches commit order.

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::{EventEnvelope, Topic};

/// A committed outbox row awaiting delivery to the bus.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub outbox_id: i64,
    pub topic: Topic,
    pub envelope: EventEnvelope,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Append an event outside a business transaction (used by consumers
    /// that publish after their own commit).
    async fn insert(&self, topic: Topic, envelope: &EventEnvelope) -> CoreResult<PendingEvent>;

    /// Fetch undelivered rows in global insertion order (which is FIFO
    /// within each user).
    async fn fetch_undelivered(&self, limit: u32) -> CoreResult<Vec<PendingEvent>>;

    async fn mark_delivered(&self, outbox_id: i64) -> CoreResult<()>;

    /// Whether an older undelivered row exists for the same user. When it
    /// does, fast-path publishing must stand down so the sweeper preserves
    /// per-user order.
    async fn has_undelivered_before(&self, user_id: &str, outbox_id: i64) -> CoreResult<bool>;

    /// Current queue depth, for observability.
    async fn depth(&self) -> CoreResult<u64>;
}
