//! Outbox sweeper: drains committed-but-unpublished events.
//!
//! Rows are fetched in insertion order, which is FIFO within each user, so
//! per-user publish order always matches commit order. A row that still
//! cannot be published blocks the rest of that user's queue for the sweep
//! and is retried on the next cycle; retries are unbounded with the
//! publisher's capped backoff.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::ports::OutboxStore;

use super::publisher::EventPublisher;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub sweep_interval: Duration,
    pub batch_size: u32,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { sweep_interval: Duration::from_secs(5), batch_size: 100 }
    }
}

pub struct OutboxSweeper {
    outbox: Arc<dyn OutboxStore>,
    publisher: Arc<EventPublisher>,
    config: SweeperConfig,
}

impl OutboxSweeper {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        publisher: Arc<EventPublisher>,
        config: SweeperConfig,
    ) -> Self {
        Self { outbox, publisher, config }
    }

    /// Run the sweep loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("outbox sweeper stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One sweep cycle. Returns the number of rows delivered.
    pub async fn sweep_once(&self) -> usize {
        let pending = match self.outbox.fetch_undelivered(self.config.batch_size).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(error = %err, "outbox fetch failed");
                return 0;
            }
        };

        if pending.is_empty() {
            return 0;
        }

        match self.outbox.depth().await {
            Ok(depth) => tracing::info!(depth, batch = pending.len(), "sweeping outbox"),
            Err(_) => tracing::info!(batch = pending.len(), "sweeping outbox"),
        }

        // Once one of a user's events fails to publish, their later events
        // must wait too, or the user's partition would reorder.
        let mut blocked_users: HashSet<String> = HashSet::new();
        let mut delivered = 0usize;

        for event in pending {
            if blocked_users.contains(&event.envelope.user_id) {
                continue;
            }

            match self.publisher.try_publish(&event).await {
                Ok(()) => {
                    if let Err(err) = self.outbox.mark_delivered(event.outbox_id).await {
                        tracing::warn!(
                            outbox_id = event.outbox_id,
                            error = %err,
                            "delivery mark failed; row may republish next sweep"
                        );
                    }
                    delivered += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        outbox_id = event.outbox_id,
                        user_id = %event.envelope.user_id,
                        error = %err,
                        "outbox publish failed; user queue blocked until next sweep"
                    );
                    blocked_users.insert(event.envelope.user_id.clone());
                }
            }
        }

        delivered
    }
}
