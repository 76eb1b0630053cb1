//! Schema management.
//!
//! Upgrades are plain SQL files applied in order. The current version is
//! tracked in SQLite's `user_version` pragma, so the database carries its
//! own bookkeeping and no migrations table exists to drift from it.

use sqlx::SqlitePool;

use crate::domain::errors::{CoreError, CoreResult};

struct SchemaUpgrade {
    version: i64,
    sql: &'static str,
}

const UPGRADES: &[SchemaUpgrade] = &[SchemaUpgrade {
    version: 1,
    sql: include_str!("../../../migrations/001_initial_schema.sql"),
}];

/// Current schema version of the database, from `PRAGMA user_version`.
pub async fn schema_version(pool: &SqlitePool) -> CoreResult<i64> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version").fetch_one(pool).await?;
    Ok(version)
}

/// Bring the database up to the latest schema. Returns how many upgrades
/// were applied; zero means the schema was already current.
pub async fn apply_schema(pool: &SqlitePool) -> CoreResult<usize> {
    let current = schema_version(pool).await?;

    let mut applied = 0usize;
    for upgrade in UPGRADES.iter().filter(|u| u.version > current) {
        sqlx::raw_sql(upgrade.sql).execute(pool).await.map_err(|e| {
            CoreError::Internal(format!("schema upgrade {} failed: {e}", upgrade.version))
        })?;

        // PRAGMA takes no bind parameters; the version is a trusted constant.
        sqlx::query(&format!("PRAGMA user_version = {}", upgrade.version))
            .execute(pool)
            .await?;
        applied += 1;

        tracing::debug!(version = upgrade.version, "schema upgrade applied");
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::super::open_memory_pool;
    use super::*;

    #[tokio::test]
    async fn upgrades_apply_exactly_once() {
        let pool = open_memory_pool().await.unwrap();

        assert_eq!(schema_version(&pool).await.unwrap(), 0);
        assert_eq!(apply_schema(&pool).await.unwrap(), UPGRADES.len());
        assert_eq!(schema_version(&pool).await.unwrap(), 1);

        // Re-running is a no-op.
        assert_eq!(apply_schema(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn schema_enforces_priority_enum() {
        let pool = open_memory_pool().await.unwrap();
        apply_schema(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO tasks (id, user_id, title, priority, created_at, updated_at)
             VALUES ('t1', 'u1', 'x', 'urgent', '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn audit_log_rejects_update_and_delete() {
        let pool = open_memory_pool().await.unwrap();
        apply_schema(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO audit_log (id, event_id, event_type, user_id, details, timestamp)
             VALUES ('a1', 'e1', 'task.created', 'u1', '{}', '2026-01-01T00:00:00.000Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(sqlx::query("UPDATE audit_log SET event_type = 'x' WHERE id = 'a1'")
            .execute(&pool)
            .await
            .is_err());
        assert!(sqlx::query("DELETE FROM audit_log WHERE id = 'a1'")
            .execute(&pool)
            .await
            .is_err());
    }
}
