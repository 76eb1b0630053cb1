//! Domain errors for the taskfabric core.

use thiserror::Error;

/// Core error taxonomy surfaced by the mutation API and the stores.
///
/// `NotFound` is deliberately scoped per user: a row owned by another user
/// is reported exactly like a row that does not exist.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let kind = db.kind();
                if matches!(
                    kind,
                    sqlx::error::ErrorKind::UniqueViolation
                        | sqlx::error::ErrorKind::ForeignKeyViolation
                        | sqlx::error::ErrorKind::CheckViolation
                        | sqlx::error::ErrorKind::NotNullViolation
                ) {
                    return CoreError::Conflict(db.message().to_string());
                }
                CoreError::Unavailable(err.to_string())
            }
            sqlx::Error::RowNotFound => CoreError::Internal("unexpected empty result".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                CoreError::Unavailable(err.to_string())
            }
            _ => CoreError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization: {err}"))
    }
}

/// True when the underlying database error is a uniqueness violation.
/// Consumers use this to treat duplicate inserts as already-done work.
pub fn is_unique_violation(err: &CoreError) -> bool {
    matches!(err, CoreError::Conflict(_))
}
