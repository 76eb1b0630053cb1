//! Durable scheduled-job store port.
//!
//! Jobs survive restarts; workers claim them with a conditional update that
//! doubles as a distributed lock with a lease. A crashed worker's lease
//! expires and the job becomes claimable again, so callbacks must be
//! idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::CoreResult;

/// Lifecycle state of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Done,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// A persisted wall-clock job.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub id: Uuid,
    /// Callback selector, e.g. `reminder.deliver`.
    pub callback: String,
    /// Optional uniqueness key; a second enqueue with the same key is a no-op.
    pub dedup_key: Option<String>,
    pub due_time: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub callback: String,
    pub dedup_key: Option<String>,
    pub due_time: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl NewJob {
    pub fn new(callback: impl Into<String>, due_time: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self { callback: callback.into(), dedup_key: None, due_time, payload }
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Enqueue a job. Returns `false` when the dedup key already exists.
    async fn enqueue(&self, job: NewJob) -> CoreResult<bool>;

    /// Claim up to `limit` due jobs: `pending` rows past `due_time`, plus
    /// `running` rows whose lease expired. Claimed rows move to `running`
    /// with a fresh lease and an incremented attempt counter.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u32,
    ) -> CoreResult<Vec<ScheduledJob>>;

    /// Mark a claimed job done.
    async fn complete(&self, job_id: Uuid) -> CoreResult<()>;

    /// Return a claimed job to `pending` with a new due time (backoff).
    async fn reschedule(&self, job_id: Uuid, due_time: DateTime<Utc>) -> CoreResult<()>;

    /// Whether any job (in any state) exists for a dedup key.
    async fn exists_with_dedup_key(&self, key: &str) -> CoreResult<bool>;

    /// Number of jobs not yet done, for observability.
    async fn open_count(&self) -> CoreResult<u64>;
}
