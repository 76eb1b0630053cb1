//! Durable wall-clock job scheduler.
//!
//! Polls the job table and dispatches claimed jobs to registered handlers.
//! The claim (conditional update with a lease) is the only coordination
//! between replicas; a crashed worker's lease expires and the job fires
//! again, so handlers must be idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, RwLock};

use crate::domain::errors::CoreResult;
use crate::domain::ports::{JobStore, ScheduledJob};

/// Callback invoked when a claimed job fires.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &ScheduledJob) -> CoreResult<()>;
}

#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Poll cadence for due jobs. The firing jitter budget is dominated by
    /// this value; keep it at or under 5 seconds.
    pub poll_interval: Duration,
    /// Lease granted to a claimed job before it becomes claimable again.
    pub lease: Duration,
    /// Max jobs claimed per tick.
    pub batch_size: u32,
    /// Base backoff applied when a handler fails.
    pub retry_backoff: Duration,
    /// Cap on the failure backoff.
    pub max_backoff: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            lease: Duration::from_secs(60),
            batch_size: 32,
            retry_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
        }
    }
}

pub struct JobScheduler {
    store: Arc<dyn JobStore>,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn JobStore>, config: JobSchedulerConfig) -> Self {
        Self { store, handlers: RwLock::new(HashMap::new()), config }
    }

    /// Register the handler for a callback name. Must happen before `run`.
    pub async fn register_handler(&self, callback: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.write().await.insert(callback.into(), handler);
    }

    /// Run the poll loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("job scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Claim and dispatch every currently-due job. Returns how many fired.
    pub async fn tick(&self) -> usize {
        let claimed = match self
            .store
            .claim_due(
                Utc::now(),
                chrono::Duration::from_std(self.config.lease).unwrap_or(chrono::Duration::seconds(60)),
                self.config.batch_size,
            )
            .await
        {
            Ok(jobs) => jobs,
            Err(err) => {
                tracing::warn!(error = %err, "job claim failed");
                return 0;
            }
        };

        let mut fired = 0usize;
        for job in claimed {
            self.dispatch(job).await;
            fired += 1;
        }
        fired
    }

    async fn dispatch(&self, job: ScheduledJob) {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&job.callback).cloned()
        };

        let Some(handler) = handler else {
            tracing::error!(job_id = %job.id, callback = %job.callback, "no handler for job callback, dropping");
            let _ = self.store.complete(job.id).await;
            return;
        };

        match handler.run(&job).await {
            Ok(()) => {
                if let Err(err) = self.store.complete(job.id).await {
                    tracing::warn!(job_id = %job.id, error = %err, "job completion mark failed");
                }
            }
            Err(err) => {
                // attempts was already incremented by the claim.
                let exponent = job.attempts.saturating_sub(1).min(16);
                let backoff = self
                    .config
                    .retry_backoff
                    .saturating_mul(2u32.saturating_pow(exponent))
                    .min(self.config.max_backoff);
                let next_due = Utc::now()
                    + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::seconds(60));

                tracing::warn!(
                    job_id = %job.id,
                    callback = %job.callback,
                    attempts = job.attempts,
                    backoff_secs = backoff.as_secs(),
                    error = %err,
                    "job handler failed, rescheduling"
                );
                if let Err(err) = self.store.reschedule(job.id, next_due).await {
                    tracing::warn!(job_id = %job.id, error = %err, "job reschedule failed");
                }
            }
        }
    }
}
