//! SQLite implementations of the store ports.
//!
//! Pool setup lives here too: WAL journal, enforced foreign keys, and a
//! busy timeout so concurrent writers queue instead of erroring. Failures
//! surface through the core error taxonomy like every other store call.

pub mod audit_store;
pub mod job_store;
pub mod outbox_store;
pub mod reminder_store;
pub mod schema;
pub mod task_store;

pub use audit_store::SqliteAuditStore;
pub use job_store::SqliteJobStore;
pub use outbox_store::SqliteOutboxStore;
pub use reminder_store::SqliteReminderStore;
pub use schema::apply_schema;
pub use task_store::SqliteTaskStore;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{RoutedEvent, Topic};
use crate::domain::ports::PendingEvent;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the fabric's database lives and how hard it may be leaned on.
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub path: PathBuf,
    pub max_connections: u32,
    /// Budget for obtaining a connection; under load this is the deadline
    /// a store call observes.
    pub acquire_timeout: Duration,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("taskfabric.db"),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

/// Open the pool every store shares.
pub async fn open_pool(settings: &DbSettings) -> CoreResult<SqlitePool> {
    if let Some(dir) = settings.path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| {
                CoreError::Internal(format!("database directory {}: {e}", dir.display()))
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(&settings.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(|e| CoreError::Unavailable(format!("database open: {e}")))
}

/// Single-connection in-memory pool; one per test so state never leaks
/// between cases.
pub async fn open_memory_pool() -> CoreResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(":memory:")
        .foreign_keys(true)
        .shared_cache(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| CoreError::Unavailable(format!("database open: {e}")))
}

/// Timestamps are stored as fixed-width RFC 3339 UTC with millisecond
/// precision so that lexicographic comparison in SQL matches chronology.
pub(crate) fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(s: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Internal(format!("bad timestamp '{s}': {e}")))
}

pub(crate) fn parse_id(s: &str) -> CoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| CoreError::Internal(format!("bad uuid '{s}': {e}")))
}

/// Append routed events to the outbox inside an open transaction, returning
/// the pending rows for the fast-path publisher.
pub(crate) async fn insert_outbox_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    events: Vec<RoutedEvent>,
) -> CoreResult<Vec<PendingEvent>> {
    let mut pending = Vec::with_capacity(events.len());
    for event in events {
        let envelope_json = serde_json::to_string(&event.envelope)?;
        let outbox_id: i64 = sqlx::query_scalar(
            "INSERT INTO outbox (user_id, topic, envelope_json, created_at)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&event.envelope.user_id)
        .bind(event.topic.as_str())
        .bind(&envelope_json)
        .bind(fmt_ts(Utc::now()))
        .fetch_one(&mut **tx)
        .await?;
        pending.push(PendingEvent { outbox_id, topic: event.topic, envelope: event.envelope });
    }
    Ok(pending)
}

pub(crate) fn parse_topic(s: &str) -> CoreResult<Topic> {
    Topic::from_str(s).ok_or_else(|| CoreError::Internal(format!("unknown topic '{s}'")))
}
