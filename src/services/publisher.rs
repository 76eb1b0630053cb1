//! Event publisher: the bridge between committed outbox rows and the bus.
//!
//! Publishing is always database-first. Mutations commit their events to
//! the outbox inside the business transaction, then hand the pending rows
//! here for a fast-path publish; rows that cannot be published stay in the
//! outbox for the sweeper. Per-user order is preserved by standing down
//! whenever an older undelivered row exists for the same user.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::CoreResult;
use crate::domain::models::{EventEnvelope, Topic};
use crate::domain::ports::{EventBus, OutboxStore, PendingEvent};

use super::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Budget for a single publish attempt before it counts as failed.
    pub publish_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self { publish_timeout: Duration::from_secs(2), retry: RetryPolicy::default() }
    }
}

pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    outbox: Arc<dyn OutboxStore>,
    config: PublisherConfig,
}

impl EventPublisher {
    pub fn new(
        bus: Arc<dyn EventBus>,
        outbox: Arc<dyn OutboxStore>,
        config: PublisherConfig,
    ) -> Self {
        Self { bus, outbox, config }
    }

    /// Fast-path publish of rows already committed to the outbox. Failures
    /// are absorbed: the rows stay undelivered and the sweeper drives them.
    pub async fn publish_pending(&self, events: Vec<PendingEvent>) {
        for event in events {
            match self
                .outbox
                .has_undelivered_before(&event.envelope.user_id, event.outbox_id)
                .await
            {
                Ok(false) => {}
                Ok(true) => {
                    // An older event for this user is still queued; the
                    // sweeper delivers both in order.
                    tracing::debug!(
                        outbox_id = event.outbox_id,
                        user_id = %event.envelope.user_id,
                        "fast path standing down for ordering"
                    );
                    continue;
                }
                Err(err) => {
                    tracing::warn!(outbox_id = event.outbox_id, error = %err, "outbox check failed");
                    continue;
                }
            }

            match self.try_publish(&event).await {
                Ok(()) => {
                    if let Err(err) = self.outbox.mark_delivered(event.outbox_id).await {
                        tracing::warn!(
                            outbox_id = event.outbox_id,
                            error = %err,
                            "publish succeeded but delivery mark failed; sweeper may republish"
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        outbox_id = event.outbox_id,
                        topic = %event.topic,
                        event_type = event.envelope.event_type(),
                        error = %err,
                        "publish failed, event handed to outbox sweeper"
                    );
                }
            }
        }
    }

    /// Durable publish for events that are not part of a store transaction
    /// (consumer-side outcomes). The envelope is committed to the outbox
    /// first, then fast-pathed.
    pub async fn publish_durable(&self, topic: Topic, envelope: EventEnvelope) -> CoreResult<()> {
        let pending = self.outbox.insert(topic, &envelope).await?;
        self.publish_pending(vec![pending]).await;
        Ok(())
    }

    /// One publish with retry and per-attempt timeout.
    pub(crate) async fn try_publish(&self, event: &PendingEvent) -> CoreResult<()> {
        let bus = self.bus.clone();
        let topic = event.topic;
        let envelope = event.envelope.clone();
        let timeout = self.config.publish_timeout;

        self.config
            .retry
            .execute(move || {
                let bus = bus.clone();
                let envelope = envelope.clone();
                async move {
                    match tokio::time::timeout(timeout, bus.publish(topic, &envelope)).await {
                        Ok(result) => result,
                        Err(_) => Err(crate::domain::errors::CoreError::Unavailable(
                            "publish timed out".to_string(),
                        )),
                    }
                }
            })
            .await
    }
}
