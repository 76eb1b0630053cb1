//! SQLite implementation of the TaskStore.
//!
//! Every compound operation is one transaction: business rows and the
//! event plan's outbox rows commit or roll back together.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    plan_task_completed, plan_task_created, plan_task_deleted, plan_task_updated,
    RecurrencePattern, RecurrenceRule, Reminder, ReminderStatus, StatusFilter, Task, TaskPage,
    TaskPatch, TaskPriority, TaskQuery, TaskSort, TemplateSnapshot,
};
use crate::domain::ports::{CompleteOutcome, PendingEvent, TaskCreateSpec, TaskStore};

use super::{fmt_ts, insert_outbox_tx, parse_id, parse_ts};

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    user_id: String,
    title: String,
    description: Option<String>,
    completed: i64,
    priority: String,
    tags: String,
    due_date: Option<String>,
    recurrence_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoreError;

    fn try_from(row: TaskRow) -> CoreResult<Self> {
        Ok(Task {
            id: parse_id(&row.id)?,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            completed: row.completed != 0,
            priority: TaskPriority::from_str(&row.priority)
                .ok_or_else(|| CoreError::Internal(format!("bad priority '{}'", row.priority)))?,
            tags: serde_json::from_str(&row.tags)?,
            due_date: row.due_date.as_deref().map(parse_ts).transpose()?,
            recurrence_id: row.recurrence_id.as_deref().map(parse_id).transpose()?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: String,
    task_id: String,
    user_id: String,
    pattern: String,
    #[sqlx(rename = "interval")]
    interval: i64,
    metadata: String,
    created_at: String,
}

impl TryFrom<RuleRow> for RecurrenceRule {
    type Error = CoreError;

    fn try_from(row: RuleRow) -> CoreResult<Self> {
        let metadata: TemplateSnapshot = serde_json::from_str(&row.metadata)?;
        Ok(RecurrenceRule {
            id: parse_id(&row.id)?,
            task_id: parse_id(&row.task_id)?,
            user_id: row.user_id,
            pattern: RecurrencePattern::from_str(&row.pattern)
                .ok_or_else(|| CoreError::Internal(format!("bad pattern '{}'", row.pattern)))?,
            interval: u32::try_from(row.interval)
                .map_err(|_| CoreError::Internal(format!("bad interval {}", row.interval)))?,
            metadata,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

async fn insert_task_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    task: &Task,
) -> CoreResult<()> {
    sqlx::query(
        r#"INSERT INTO tasks (id, user_id, title, description, completed, priority, tags,
           due_date, recurrence_id, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(task.id.to_string())
    .bind(&task.user_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(i64::from(task.completed))
    .bind(task.priority.as_str())
    .bind(serde_json::to_string(&task.tags)?)
    .bind(task.due_date.map(fmt_ts))
    .bind(task.recurrence_id.map(|id| id.to_string()))
    .bind(fmt_ts(task.created_at))
    .bind(fmt_ts(task.updated_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn fetch_task_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    task_id: Uuid,
    user_id: &str,
) -> CoreResult<Option<Task>> {
    let row: Option<TaskRow> =
        sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND user_id = ?")
            .bind(task_id.to_string())
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;
    row.map(Task::try_from).transpose()
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn commit_task_create(
        &self,
        spec: TaskCreateSpec,
    ) -> CoreResult<(Task, Vec<PendingEvent>)> {
        let TaskCreateSpec { mut task, rule, reminders } = spec;
        let mut tx = self.pool.begin().await?;

        // When a rule is created alongside, the two rows reference each
        // other; the task is inserted detached first and linked once the
        // rule row exists. A generated instance references an existing rule
        // and keeps its recurrence_id as-is.
        let rule_id = rule.as_ref().map(|r| r.id);
        if rule.is_some() {
            task.recurrence_id = None;
        }
        insert_task_tx(&mut tx, &task).await?;

        if let Some(rule) = &rule {
            sqlx::query(
                r#"INSERT INTO recurrence_rules (id, task_id, user_id, pattern, "interval",
                   metadata, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(rule.id.to_string())
            .bind(rule.task_id.to_string())
            .bind(&rule.user_id)
            .bind(rule.pattern.as_str())
            .bind(i64::from(rule.interval))
            .bind(serde_json::to_string(&rule.metadata)?)
            .bind(fmt_ts(rule.created_at))
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE tasks SET recurrence_id = ? WHERE id = ?")
                .bind(rule.id.to_string())
                .bind(task.id.to_string())
                .execute(&mut *tx)
                .await?;
            task.recurrence_id = rule_id;
        }

        for reminder in &reminders {
            sqlx::query(
                r#"INSERT INTO reminders (id, task_id, user_id, reminder_time, status,
                   delivery_method, retry_count, created_at, sent_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(reminder.id.to_string())
            .bind(reminder.task_id.to_string())
            .bind(&reminder.user_id)
            .bind(fmt_ts(reminder.reminder_time))
            .bind(reminder.status.as_str())
            .bind(&reminder.delivery_method)
            .bind(i64::from(reminder.retry_count))
            .bind(fmt_ts(reminder.created_at))
            .bind(reminder.sent_at.map(fmt_ts))
            .execute(&mut *tx)
            .await?;
        }

        let events = insert_outbox_tx(&mut tx, plan_task_created(&task, &reminders)).await?;
        tx.commit().await?;
        Ok((task, events))
    }

    async fn commit_task_update(
        &self,
        task_id: Uuid,
        user_id: &str,
        patch: TaskPatch,
    ) -> CoreResult<(Task, Task, Vec<PendingEvent>)> {
        let mut tx = self.pool.begin().await?;

        let old = fetch_task_tx(&mut tx, task_id, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task"))?;

        if old.completed && patch.due_date.is_some() {
            return Err(CoreError::Conflict(
                "cannot change the due date of a completed task".to_string(),
            ));
        }

        let new = patch.apply(&old);

        sqlx::query(
            r#"UPDATE tasks SET title = ?, description = ?, priority = ?, tags = ?,
               due_date = ?, updated_at = ? WHERE id = ? AND user_id = ?"#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.priority.as_str())
        .bind(serde_json::to_string(&new.tags)?)
        .bind(new.due_date.map(fmt_ts))
        .bind(fmt_ts(new.updated_at))
        .bind(task_id.to_string())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let events = insert_outbox_tx(&mut tx, plan_task_updated(&old, &new)).await?;
        tx.commit().await?;
        Ok((old, new, events))
    }

    async fn commit_task_complete(
        &self,
        task_id: Uuid,
        user_id: &str,
    ) -> CoreResult<CompleteOutcome> {
        let mut tx = self.pool.begin().await?;

        let old = fetch_task_tx(&mut tx, task_id, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task"))?;

        if old.completed {
            return Ok(CompleteOutcome {
                new: old.clone(),
                old,
                changed: false,
                events: Vec::new(),
            });
        }

        let mut new = old.clone();
        new.completed = true;
        new.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE tasks SET completed = 1, updated_at = ?
             WHERE id = ? AND user_id = ? AND completed = 0",
        )
        .bind(fmt_ts(new.updated_at))
        .bind(task_id.to_string())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Lost a race with a concurrent completion.
            return Ok(CompleteOutcome {
                new: old.clone(),
                old,
                changed: false,
                events: Vec::new(),
            });
        }

        let events = insert_outbox_tx(&mut tx, plan_task_completed(&new)).await?;
        tx.commit().await?;
        Ok(CompleteOutcome { old, new, changed: true, events })
    }

    async fn commit_task_delete(
        &self,
        task_id: Uuid,
        user_id: &str,
    ) -> CoreResult<(Task, Vec<PendingEvent>)> {
        let mut tx = self.pool.begin().await?;

        let task = fetch_task_tx(&mut tx, task_id, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task"))?;

        let events = insert_outbox_tx(&mut tx, plan_task_deleted(&task)).await?;

        // Reminders cascade; when this is the template task the rule
        // cascades too, which detaches descendant tasks.
        sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(task_id.to_string())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((task, events))
    }

    async fn get_task(&self, task_id: Uuid, user_id: &str) -> CoreResult<Option<Task>> {
        let row: Option<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND user_id = ?")
                .bind(task_id.to_string())
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list_tasks(&self, user_id: &str, query: &TaskQuery) -> CoreResult<TaskPage> {
        let sort_expr = match query.sort {
            TaskSort::CreatedAt => "created_at",
            TaskSort::DueDate => "COALESCE(due_date, '')",
        };
        let direction = if query.descending { "DESC" } else { "ASC" };
        let cmp = if query.descending { "<" } else { ">" };

        let mut sql = format!(
            "SELECT *, {sort_expr} AS sort_key FROM tasks WHERE user_id = ?"
        );
        let mut bindings: Vec<String> = vec![user_id.to_string()];

        match query.status {
            Some(StatusFilter::Pending) => sql.push_str(" AND completed = 0"),
            Some(StatusFilter::Completed) => sql.push_str(" AND completed = 1"),
            None => {}
        }
        if let Some(priority) = query.priority {
            sql.push_str(" AND priority = ?");
            bindings.push(priority.as_str().to_string());
        }
        if let Some(tag) = &query.tag {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM json_each(tasks.tags) WHERE lower(json_each.value) = lower(?))",
            );
            bindings.push(tag.clone());
        }
        if let Some(before) = query.due_before {
            sql.push_str(" AND due_date IS NOT NULL AND due_date < ?");
            bindings.push(fmt_ts(before));
        }
        if let Some(after) = query.due_after {
            sql.push_str(" AND due_date IS NOT NULL AND due_date > ?");
            bindings.push(fmt_ts(after));
        }
        if let Some(cursor) = &query.cursor {
            let (key, id) = cursor
                .rsplit_once('|')
                .ok_or_else(|| CoreError::invalid("cursor", "malformed cursor"))?;
            sql.push_str(&format!(
                " AND ({sort_expr} {cmp} ? OR ({sort_expr} = ? AND id {cmp} ?))"
            ));
            bindings.push(key.to_string());
            bindings.push(key.to_string());
            bindings.push(id.to_string());
        }

        let limit = query.limit.clamp(1, 100);
        sql.push_str(&format!(
            " ORDER BY {sort_expr} {direction}, id {direction} LIMIT {}",
            limit + 1
        ));

        let mut q = sqlx::query_as::<_, TaskRowWithKey>(&sql);
        for binding in &bindings {
            q = q.bind(binding);
        }
        let mut rows: Vec<TaskRowWithKey> = q.fetch_all(&self.pool).await?;

        let next_cursor = if rows.len() as u32 > limit {
            rows.truncate(limit as usize);
            rows.last().map(|r| format!("{}|{}", r.sort_key, r.row.id))
        } else {
            None
        };

        let tasks = rows
            .into_iter()
            .map(|r| Task::try_from(r.row))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(TaskPage { tasks, next_cursor })
    }

    async fn get_rule(
        &self,
        rule_id: Uuid,
        user_id: &str,
    ) -> CoreResult<Option<RecurrenceRule>> {
        let row: Option<RuleRow> =
            sqlx::query_as("SELECT * FROM recurrence_rules WHERE id = ? AND user_id = ?")
                .bind(rule_id.to_string())
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(RecurrenceRule::try_from).transpose()
    }

    async fn find_pending_in_chain(&self, rule_id: Uuid) -> CoreResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE recurrence_id = ? AND completed = 0 LIMIT 1",
        )
        .bind(rule_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }
}

/// List row carrying the computed sort key for cursor construction.
struct TaskRowWithKey {
    row: TaskRow,
    sort_key: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for TaskRowWithKey {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::{FromRow, Row};
        Ok(Self {
            row: TaskRow::from_row(row)?,
            sort_key: row.try_get("sort_key")?,
        })
    }
}

// Reminder row mapping shared with the reminder store.
#[derive(sqlx::FromRow)]
pub(crate) struct ReminderRow {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub reminder_time: String,
    pub status: String,
    pub delivery_method: String,
    pub retry_count: i64,
    pub created_at: String,
    pub sent_at: Option<String>,
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = CoreError;

    fn try_from(row: ReminderRow) -> CoreResult<Self> {
        Ok(Reminder {
            id: parse_id(&row.id)?,
            task_id: parse_id(&row.task_id)?,
            user_id: row.user_id,
            reminder_time: parse_ts(&row.reminder_time)?,
            status: ReminderStatus::from_str(&row.status)
                .ok_or_else(|| CoreError::Internal(format!("bad status '{}'", row.status)))?,
            delivery_method: row.delivery_method,
            retry_count: u32::try_from(row.retry_count)
                .map_err(|_| CoreError::Internal(format!("bad retry_count {}", row.retry_count)))?,
            created_at: parse_ts(&row.created_at)?,
            sent_at: row.sent_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}
