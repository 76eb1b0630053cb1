//! Notification sink port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::CoreResult;
use crate::domain::models::{Reminder, Task};

/// What a fired reminder delivers to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub reminder: Reminder,
    pub task: Task,
}

/// Pluggable notification transport (webhook, email, SMS, ...).
///
/// `deliver` is bounded by the caller's per-attempt timeout; a returned
/// error counts against the reminder's retry budget.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, user_id: &str, payload: &NotificationPayload) -> CoreResult<()>;
}
