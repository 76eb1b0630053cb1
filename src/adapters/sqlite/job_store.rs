//! SQLite implementation of the JobStore.
//!
//! The claim is a conditional UPDATE with a RETURNING clause: each row
//! moves to `running` with a lease exactly once per expiry window, so only
//! one worker wins a job even with several scheduler replicas on the same
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{is_unique_violation, CoreError, CoreResult};
use crate::domain::ports::{JobState, JobStore, NewJob, ScheduledJob};

use super::{fmt_ts, parse_id, parse_ts};

#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    callback: String,
    dedup_key: Option<String>,
    due_time: String,
    payload: String,
    state: String,
    attempts: i64,
    locked_until: Option<String>,
    created_at: String,
}

impl TryFrom<JobRow> for ScheduledJob {
    type Error = CoreError;

    fn try_from(row: JobRow) -> CoreResult<Self> {
        Ok(ScheduledJob {
            id: parse_id(&row.id)?,
            callback: row.callback,
            dedup_key: row.dedup_key,
            due_time: parse_ts(&row.due_time)?,
            payload: serde_json::from_str(&row.payload)?,
            state: JobState::from_str(&row.state)
                .ok_or_else(|| CoreError::Internal(format!("bad job state '{}'", row.state)))?,
            attempts: u32::try_from(row.attempts)
                .map_err(|_| CoreError::Internal(format!("bad attempts {}", row.attempts)))?,
            locked_until: row.locked_until.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: NewJob) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"INSERT INTO scheduled_jobs (id, callback, dedup_key, due_time, payload, state,
               attempts, locked_until, created_at)
               VALUES (?, ?, ?, ?, ?, 'pending', 0, NULL, ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&job.callback)
        .bind(&job.dedup_key)
        .bind(fmt_ts(job.due_time))
        .bind(serde_json::to_string(&job.payload)?)
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into();
                if is_unique_violation(&err) {
                    // The dedup key already holds a job; nothing to do.
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
        limit: u32,
    ) -> CoreResult<Vec<ScheduledJob>> {
        let now_s = fmt_ts(now);
        let lease_s = fmt_ts(now + lease);

        let rows: Vec<JobRow> = sqlx::query_as(
            r#"UPDATE scheduled_jobs
               SET state = 'running', locked_until = ?, attempts = attempts + 1
               WHERE id IN (
                   SELECT id FROM scheduled_jobs
                   WHERE (state = 'pending' AND due_time <= ?)
                      OR (state = 'running' AND locked_until IS NOT NULL AND locked_until <= ?)
                   ORDER BY due_time
                   LIMIT ?
               )
               RETURNING *"#,
        )
        .bind(&lease_s)
        .bind(&now_s)
        .bind(&now_s)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ScheduledJob::try_from).collect()
    }

    async fn complete(&self, job_id: Uuid) -> CoreResult<()> {
        sqlx::query(
            "UPDATE scheduled_jobs SET state = 'done', locked_until = NULL WHERE id = ?",
        )
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reschedule(&self, job_id: Uuid, due_time: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query(
            "UPDATE scheduled_jobs SET state = 'pending', locked_until = NULL, due_time = ?
             WHERE id = ? AND state = 'running'",
        )
        .bind(fmt_ts(due_time))
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn exists_with_dedup_key(&self, key: &str) -> CoreResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_jobs WHERE dedup_key = ?")
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn open_count(&self) -> CoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_jobs WHERE state != 'done'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }
}
