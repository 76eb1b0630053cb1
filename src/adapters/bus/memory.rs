//! In-process event bus.
//!
//! Broker for single-process deployments and tests. Each `(topic, group)`
//! subscription owns an unbounded queue drained by one worker task, so
//! messages within a group are handled serially, which preserves per-user
//! order. A handler error triggers redelivery with exponential backoff; a
//! message that keeps failing is parked with an error log rather than
//! stalling its partition forever.
//!
//! Durability across process restarts comes from the database plus the
//! outbox, not from this bus: anything committed but unpublished at crash
//! time is re-driven by the outbox sweeper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{EventEnvelope, Topic};
use crate::domain::ports::{EventBus, EventConsumer};

/// Redelivery policy for failing handlers.
#[derive(Debug, Clone)]
pub struct InProcessBusConfig {
    pub max_deliveries: u32,
    pub redelivery_backoff: Duration,
}

impl Default for InProcessBusConfig {
    fn default() -> Self {
        Self {
            max_deliveries: 5,
            redelivery_backoff: Duration::from_millis(50),
        }
    }
}

type GroupKey = (Topic, String);

pub struct InProcessBus {
    groups: RwLock<HashMap<GroupKey, mpsc::UnboundedSender<EventEnvelope>>>,
    config: InProcessBusConfig,
}

impl InProcessBus {
    pub fn new(config: InProcessBusConfig) -> Self {
        Self { groups: RwLock::new(HashMap::new()), config }
    }

    pub fn with_defaults() -> Self {
        Self::new(InProcessBusConfig::default())
    }
}

#[async_trait]
impl EventBus for InProcessBus {
    async fn publish(&self, topic: Topic, envelope: &EventEnvelope) -> CoreResult<()> {
        let groups = self.groups.read().await;
        for ((t, _), sender) in groups.iter() {
            if *t != topic {
                continue;
            }
            // A closed receiver means the group worker is gone; publishing
            // still succeeds for the remaining groups.
            let _ = sender.send(envelope.clone());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group_id: &str,
        consumer: Arc<dyn EventConsumer>,
    ) -> CoreResult<()> {
        let key = (topic, group_id.to_string());
        let mut groups = self.groups.write().await;
        if groups.contains_key(&key) {
            return Err(CoreError::Conflict(format!(
                "group '{group_id}' already subscribed to {topic}"
            )));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<EventEnvelope>();
        groups.insert(key, tx);

        let config = self.config.clone();
        let group = group_id.to_string();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let mut delivery = 0u32;
                loop {
                    delivery += 1;
                    match consumer.handle(envelope.clone()).await {
                        Ok(()) => break,
                        Err(err) if delivery < config.max_deliveries => {
                            let backoff = config.redelivery_backoff * 2u32.pow(delivery - 1);
                            tracing::warn!(
                                topic = %topic,
                                group = %group,
                                event_id = %envelope.event_id,
                                delivery,
                                error = %err,
                                "handler failed, redelivering"
                            );
                            tokio::time::sleep(backoff).await;
                        }
                        Err(err) => {
                            tracing::error!(
                                topic = %topic,
                                group = %group,
                                event_id = %envelope.event_id,
                                error = %err,
                                "handler exhausted redeliveries, parking message"
                            );
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EventKind, Task};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<EventEnvelope>>,
        fail_first: AtomicU32,
    }

    impl Recorder {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self { seen: Mutex::new(Vec::new()), fail_first: AtomicU32::new(fail_first) })
        }
    }

    #[async_trait]
    impl EventConsumer for Recorder {
        async fn handle(&self, envelope: EventEnvelope) -> CoreResult<()> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(CoreError::Unavailable("simulated".to_string()));
            }
            self.seen.lock().await.push(envelope);
            Ok(())
        }
    }

    fn envelope_for(user: &str) -> EventEnvelope {
        let task = Task::new(user, "t");
        EventEnvelope::new(user, Some(task.id), EventKind::TaskCreated(task))
    }

    #[tokio::test]
    async fn delivers_to_matching_topic_groups_only() {
        let bus = InProcessBus::with_defaults();
        let events = Recorder::new(0);
        let updates = Recorder::new(0);
        bus.subscribe(Topic::TaskEvents, "audit", events.clone()).await.unwrap();
        bus.subscribe(Topic::TaskUpdates, "broadcaster", updates.clone()).await.unwrap();

        bus.publish(Topic::TaskEvents, &envelope_for("u1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(events.seen.lock().await.len(), 1);
        assert_eq!(updates.seen.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn both_groups_on_one_topic_see_every_message() {
        let bus = InProcessBus::with_defaults();
        let audit = Recorder::new(0);
        let generator = Recorder::new(0);
        bus.subscribe(Topic::TaskEvents, "audit", audit.clone()).await.unwrap();
        bus.subscribe(Topic::TaskEvents, "recurring-generator", generator.clone())
            .await
            .unwrap();

        bus.publish(Topic::TaskEvents, &envelope_for("u1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(audit.seen.lock().await.len(), 1);
        assert_eq!(generator.seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failing_handler_gets_redelivery() {
        let bus = InProcessBus::with_defaults();
        let consumer = Recorder::new(2);
        bus.subscribe(Topic::TaskEvents, "audit", consumer.clone()).await.unwrap();

        bus.publish(Topic::TaskEvents, &envelope_for("u1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(consumer.seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn per_group_order_is_publish_order() {
        let bus = InProcessBus::with_defaults();
        let consumer = Recorder::new(0);
        bus.subscribe(Topic::TaskEvents, "audit", consumer.clone()).await.unwrap();

        let first = envelope_for("u1");
        let second = envelope_for("u1");
        bus.publish(Topic::TaskEvents, &first).await.unwrap();
        bus.publish(Topic::TaskEvents, &second).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = consumer.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].event_id, first.event_id);
        assert_eq!(seen[1].event_id, second.event_id);
    }

    #[tokio::test]
    async fn duplicate_group_subscription_is_rejected() {
        let bus = InProcessBus::with_defaults();
        let consumer = Recorder::new(0);
        bus.subscribe(Topic::TaskEvents, "audit", consumer.clone()).await.unwrap();
        let err = bus.subscribe(Topic::TaskEvents, "audit", consumer).await;
        assert!(err.is_err());
    }
}
