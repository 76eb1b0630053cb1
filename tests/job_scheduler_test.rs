mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use taskfabric::domain::errors::{CoreError, CoreResult};
use taskfabric::domain::ports::{JobState, JobStore, NewJob, ScheduledJob};
use taskfabric::services::{JobHandler, JobScheduler, JobSchedulerConfig};

use common::{setup_pool, test_env};

struct CountingHandler {
    runs: AtomicU32,
    failures_remaining: AtomicU32,
}

impl CountingHandler {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self { runs: AtomicU32::new(0), failures_remaining: AtomicU32::new(failures) })
    }
}

#[async_trait]
impl JobHandler for CountingHandler {
    async fn run(&self, _job: &ScheduledJob) -> CoreResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(CoreError::Unavailable("flaky".to_string()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn due_job_is_claimed_exactly_once() {
    let env = test_env().await;

    env.jobs
        .enqueue(NewJob::new("test.noop", Utc::now(), serde_json::json!({})))
        .await
        .unwrap();

    let first = env
        .jobs
        .claim_due(Utc::now(), chrono::Duration::seconds(60), 10)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].state, JobState::Running);
    assert_eq!(first[0].attempts, 1);

    // A second claim within the lease window finds nothing.
    let second = env
        .jobs
        .claim_due(Utc::now(), chrono::Duration::seconds(60), 10)
        .await
        .unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn future_jobs_are_not_claimable() {
    let env = test_env().await;

    env.jobs
        .enqueue(NewJob::new(
            "test.noop",
            Utc::now() + chrono::Duration::hours(1),
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    let claimed = env
        .jobs
        .claim_due(Utc::now(), chrono::Duration::seconds(60), 10)
        .await
        .unwrap();
    assert!(claimed.is_empty());
}

#[tokio::test]
async fn expired_lease_makes_job_claimable_again() {
    let env = test_env().await;

    env.jobs
        .enqueue(NewJob::new("test.noop", Utc::now(), serde_json::json!({})))
        .await
        .unwrap();

    // Claim with a lease that expires immediately.
    let first = env
        .jobs
        .claim_due(Utc::now(), chrono::Duration::milliseconds(1), 10)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(10)).await;

    // The crashed-worker scenario: the same job comes back.
    let second = env
        .jobs
        .claim_due(Utc::now(), chrono::Duration::seconds(60), 10)
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, first[0].id);
    assert_eq!(second[0].attempts, 2);
}

#[tokio::test]
async fn dedup_key_collapses_duplicate_enqueues() {
    let env = test_env().await;

    let job = NewJob::new("test.noop", Utc::now(), serde_json::json!({}))
        .with_dedup_key("only-once");
    assert!(env.jobs.enqueue(job.clone()).await.unwrap());
    assert!(!env.jobs.enqueue(job).await.unwrap());
    assert_eq!(env.jobs.open_count().await.unwrap(), 1);
}

#[tokio::test]
async fn scheduler_tick_dispatches_and_completes() {
    let pool = setup_pool().await;
    let jobs = Arc::new(taskfabric::adapters::sqlite::SqliteJobStore::new(pool));
    let scheduler = JobScheduler::new(jobs.clone(), JobSchedulerConfig::default());
    let handler = CountingHandler::new(0);
    scheduler.register_handler("test.count", handler.clone()).await;

    jobs.enqueue(NewJob::new("test.count", Utc::now(), serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(scheduler.tick().await, 1);
    assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
    assert_eq!(jobs.open_count().await.unwrap(), 0);

    // A later tick finds nothing left.
    assert_eq!(scheduler.tick().await, 0);
}

#[tokio::test]
async fn failed_job_is_rescheduled_with_backoff() {
    let pool = setup_pool().await;
    let jobs = Arc::new(taskfabric::adapters::sqlite::SqliteJobStore::new(pool));
    let scheduler = JobScheduler::new(
        jobs.clone(),
        JobSchedulerConfig {
            retry_backoff: Duration::from_millis(10),
            ..Default::default()
        },
    );
    let handler = CountingHandler::new(1);
    scheduler.register_handler("test.flaky", handler.clone()).await;

    jobs.enqueue(NewJob::new("test.flaky", Utc::now(), serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(scheduler.tick().await, 1);
    assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
    // Still open, parked in pending with a pushed-out due time.
    assert_eq!(jobs.open_count().await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(scheduler.tick().await, 1);
    assert_eq!(handler.runs.load(Ordering::SeqCst), 2);
    assert_eq!(jobs.open_count().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_job_kind_is_dropped_not_looped() {
    let pool = setup_pool().await;
    let jobs = Arc::new(taskfabric::adapters::sqlite::SqliteJobStore::new(pool));
    let scheduler = JobScheduler::new(jobs.clone(), JobSchedulerConfig::default());

    jobs.enqueue(NewJob::new("test.orphan", Utc::now(), serde_json::json!({})))
        .await
        .unwrap();

    scheduler.tick().await;
    assert_eq!(jobs.open_count().await.unwrap(), 0);
}
