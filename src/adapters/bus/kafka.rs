//! Kafka-protocol broker adapter for the event bus port.
//!
//! Partition key is the envelope's `user_id`, so one user's events land on
//! one partition and every group sees them in publish order. Offsets are
//! committed only after the handler acks, giving at-least-once delivery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{EventEnvelope, Topic};
use crate::domain::ports::{EventBus, EventConsumer};

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct KafkaBusConfig {
    /// Comma-separated bootstrap servers.
    pub brokers: String,
    /// Producer send timeout; past this the caller falls back to the outbox.
    pub publish_timeout: Duration,
    /// Backoff between redelivery attempts of a nacked message.
    pub redelivery_backoff: Duration,
}

impl Default for KafkaBusConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            publish_timeout: Duration::from_secs(2),
            redelivery_backoff: Duration::from_millis(500),
        }
    }
}

pub struct KafkaEventBus {
    producer: FutureProducer,
    config: KafkaBusConfig,
}

impl KafkaEventBus {
    pub fn new(config: KafkaBusConfig) -> CoreResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set(
                "message.timeout.ms",
                config.publish_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| CoreError::Unavailable(format!("kafka producer: {e}")))?;
        Ok(Self { producer, config })
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, topic: Topic, envelope: &EventEnvelope) -> CoreResult<()> {
        let payload = serde_json::to_string(envelope)?;
        let record = FutureRecord::to(topic.as_str())
            .key(&envelope.user_id)
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(self.config.publish_timeout))
            .await
            .map_err(|(e, _)| CoreError::Unavailable(format!("kafka publish: {e}")))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group_id: &str,
        consumer: Arc<dyn EventConsumer>,
    ) -> CoreResult<()> {
        let stream: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| CoreError::Unavailable(format!("kafka consumer: {e}")))?;

        stream
            .subscribe(&[topic.as_str()])
            .map_err(|e| CoreError::Unavailable(format!("kafka subscribe: {e}")))?;

        let group = group_id.to_string();
        let backoff = self.config.redelivery_backoff;
        tokio::spawn(async move {
            loop {
                let message = match stream.recv().await {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(topic = %topic, group = %group, error = %e, "kafka receive error");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                };

                let envelope: EventEnvelope = match message
                    .payload()
                    .ok_or("empty payload")
                    .and_then(|p| serde_json::from_slice(p).map_err(|_| "malformed envelope"))
                {
                    Ok(envelope) => envelope,
                    Err(reason) => {
                        // Undecodable messages are committed past; they can
                        // never succeed on redelivery.
                        tracing::error!(topic = %topic, group = %group, reason, "skipping message");
                        let _ = stream.commit_message(&message, CommitMode::Async);
                        continue;
                    }
                };

                // Retry in place until the handler acks. Not committing and
                // moving on would reorder the user's partition.
                loop {
                    match consumer.handle(envelope.clone()).await {
                        Ok(()) => {
                            if let Err(e) = stream.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(topic = %topic, group = %group, error = %e, "offset commit failed");
                            }
                            break;
                        }
                        Err(err) => {
                            tracing::warn!(
                                topic = %topic,
                                group = %group,
                                event_id = %envelope.event_id,
                                error = %err,
                                "handler failed, redelivering"
                            );
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
            }
        });

        Ok(())
    }
}
