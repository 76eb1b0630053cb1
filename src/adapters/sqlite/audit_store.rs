//! SQLite implementation of the AuditStore.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{is_unique_violation, CoreResult};
use crate::domain::models::AuditLogEntry;
use crate::domain::ports::AuditStore;

use super::{fmt_ts, parse_id, parse_ts};

#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: String,
    event_id: String,
    event_type: String,
    user_id: String,
    task_id: Option<String>,
    details: String,
    timestamp: String,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = crate::domain::errors::CoreError;

    fn try_from(row: AuditRow) -> CoreResult<Self> {
        Ok(AuditLogEntry {
            id: parse_id(&row.id)?,
            event_id: parse_id(&row.event_id)?,
            event_type: row.event_type,
            user_id: row.user_id,
            task_id: row.task_id.as_deref().map(parse_id).transpose()?,
            details: serde_json::from_str(&row.details)?,
            timestamp: parse_ts(&row.timestamp)?,
        })
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, entry: &AuditLogEntry) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"INSERT INTO audit_log (id, event_id, event_type, user_id, task_id, details, timestamp)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.event_id.to_string())
        .bind(&entry.event_type)
        .bind(&entry.user_id)
        .bind(entry.task_id.map(|id| id.to_string()))
        .bind(serde_json::to_string(&entry.details)?)
        .bind(fmt_ts(entry.timestamp))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into();
                if is_unique_violation(&err) {
                    // Redelivered event; the row already exists.
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn list_for_user(&self, user_id: &str, limit: u32) -> CoreResult<Vec<AuditLogEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT * FROM audit_log WHERE user_id = ? ORDER BY timestamp DESC, rowid DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }
}
