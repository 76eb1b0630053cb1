//! Shared test fixtures.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use taskfabric::adapters::bus::InProcessBus;
use taskfabric::adapters::sqlite::{
    apply_schema, open_memory_pool, SqliteAuditStore, SqliteJobStore, SqliteOutboxStore,
    SqliteReminderStore, SqliteTaskStore,
};
use taskfabric::domain::errors::{CoreError, CoreResult};
use taskfabric::domain::models::{EventEnvelope, Topic};
use taskfabric::domain::ports::{
    EventBus, EventConsumer, NotificationPayload, NotificationSink,
};
use taskfabric::services::{
    CreateTaskInput, EventPublisher, MutationService, PublisherConfig, RetryPolicy,
};

pub async fn setup_pool() -> SqlitePool {
    let pool = open_memory_pool().await.expect("failed to open in-memory database");
    apply_schema(&pool).await.expect("failed to apply schema");
    pool
}

/// Fully wired core against an in-memory database and in-process bus.
pub struct TestEnv {
    pub pool: SqlitePool,
    pub tasks: Arc<SqliteTaskStore>,
    pub reminders: Arc<SqliteReminderStore>,
    pub audit: Arc<SqliteAuditStore>,
    pub outbox: Arc<SqliteOutboxStore>,
    pub jobs: Arc<SqliteJobStore>,
    pub bus: Arc<dyn EventBus>,
    pub publisher: Arc<EventPublisher>,
    pub mutation: Arc<MutationService>,
}

pub async fn test_env() -> TestEnv {
    test_env_with_bus(Arc::new(InProcessBus::with_defaults())).await
}

pub async fn test_env_with_bus(bus: Arc<dyn EventBus>) -> TestEnv {
    let pool = setup_pool().await;
    let tasks = Arc::new(SqliteTaskStore::new(pool.clone()));
    let reminders = Arc::new(SqliteReminderStore::new(pool.clone()));
    let audit = Arc::new(SqliteAuditStore::new(pool.clone()));
    let outbox = Arc::new(SqliteOutboxStore::new(pool.clone()));
    let jobs = Arc::new(SqliteJobStore::new(pool.clone()));

    let publisher = Arc::new(EventPublisher::new(
        bus.clone(),
        outbox.clone(),
        PublisherConfig {
            publish_timeout: Duration::from_secs(2),
            retry: RetryPolicy::new(2, Duration::from_millis(1), 2.0, 0.0),
        },
    ));
    let mutation = Arc::new(MutationService::new(
        tasks.clone(),
        reminders.clone(),
        publisher.clone(),
    ));

    TestEnv { pool, tasks, reminders, audit, outbox, jobs, bus, publisher, mutation }
}

/// Consumer that records every envelope it sees.
pub struct Collector {
    pub seen: Mutex<Vec<EventEnvelope>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { seen: Mutex::new(Vec::new()) })
    }

    pub async fn event_types(&self) -> Vec<String> {
        self.seen
            .lock()
            .await
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.seen.lock().await.len()
    }
}

#[async_trait]
impl EventConsumer for Collector {
    async fn handle(&self, envelope: EventEnvelope) -> CoreResult<()> {
        self.seen.lock().await.push(envelope);
        Ok(())
    }
}

/// Bus wrapper that fails publishes while the switch is thrown.
pub struct FlakyBus {
    inner: Arc<dyn EventBus>,
    pub broken: std::sync::atomic::AtomicBool,
}

impl FlakyBus {
    pub fn new(inner: Arc<dyn EventBus>) -> Arc<Self> {
        Arc::new(Self { inner, broken: std::sync::atomic::AtomicBool::new(false) })
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl EventBus for FlakyBus {
    async fn publish(&self, topic: Topic, envelope: &EventEnvelope) -> CoreResult<()> {
        if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CoreError::Unavailable("bus is down".to_string()));
        }
        self.inner.publish(topic, envelope).await
    }

    async fn subscribe(
        &self,
        topic: Topic,
        group_id: &str,
        consumer: Arc<dyn EventConsumer>,
    ) -> CoreResult<()> {
        self.inner.subscribe(topic, group_id, consumer).await
    }
}

/// Notification sink that records deliveries and optionally fails.
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(String, NotificationPayload)>>,
    pub failures_remaining: std::sync::atomic::AtomicU32,
    attempts: std::sync::atomic::AtomicU32,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Self::failing(0)
    }

    pub fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
            failures_remaining: std::sync::atomic::AtomicU32::new(failures),
            attempts: std::sync::atomic::AtomicU32::new(0),
        })
    }

    pub async fn delivery_count(&self) -> usize {
        self.delivered.lock().await.len()
    }

    /// Every `deliver` call, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, user_id: &str, payload: &NotificationPayload) -> CoreResult<()> {
        use std::sync::atomic::Ordering;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(CoreError::Unavailable("sink rejected delivery".to_string()));
        }
        self.delivered
            .lock()
            .await
            .push((user_id.to_string(), payload.clone()));
        Ok(())
    }
}

pub fn simple_task(title: &str) -> CreateTaskInput {
    CreateTaskInput {
        title: title.to_string(),
        description: None,
        priority: None,
        tags: None,
        due_date: None,
        recurrence: None,
        reminders: Vec::new(),
    }
}

pub fn in_hours(hours: i64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::hours(hours)
}

/// Give spawned consumer workers a moment to drain.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
