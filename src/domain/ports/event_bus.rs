//! Event bus port.
//!
//! Delivery contract is at-least-once: a consumer returning `Err` nacks the
//! message and the bus redelivers it. Ordering is guaranteed only per
//! partition key, which is always `user_id`. Within one group a user's
//! messages are handled serially; consumers in different groups observe the
//! same topic independently.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::{EventEnvelope, Topic};

/// Handler invoked for every delivered envelope.
///
/// `Ok(())` acks the message. `Err` nacks it; the bus redelivers with
/// backoff, so handlers must be idempotent.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    async fn handle(&self, envelope: EventEnvelope) -> CoreResult<()>;
}

/// Publish/subscribe port over the broker.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one envelope to a topic, keyed by `envelope.user_id`.
    async fn publish(&self, topic: Topic, envelope: &EventEnvelope) -> CoreResult<()>;

    /// Attach a consumer group to a topic. Each distinct `group_id` receives
    /// every message; within a group a message is handled once (at-least-once).
    async fn subscribe(
        &self,
        topic: Topic,
        group_id: &str,
        consumer: Arc<dyn EventConsumer>,
    ) -> CoreResult<()>;
}
