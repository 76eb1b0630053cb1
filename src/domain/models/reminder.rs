//! Reminder domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::task::Task;

/// Hard ceiling on notification delivery retries.
pub const MAX_DELIVERY_RETRIES: u32 = 3;

/// Status of a reminder. Transitions are monotonic: `pending` may move to
/// `sent` or `failed`, and the terminal states never move again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
}

impl Default for ReminderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sent) | (Self::Pending, Self::Failed)
        )
    }
}

/// A scheduled future notification about a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: String,
    /// When the reminder fires (absolute UTC).
    pub reminder_time: DateTime<Utc>,
    pub status: ReminderStatus,
    /// Opaque transport hint handed to the notification sink.
    pub delivery_method: String,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    /// Set exactly when `status` becomes `sent`.
    pub sent_at: Option<DateTime<Utc>>,
}

impl Reminder {
    pub fn new(task: &Task, reminder_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            user_id: task.user_id.clone(),
            reminder_time,
            status: ReminderStatus::default(),
            delivery_method: "webhook".to_string(),
            retry_count: 0,
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    pub fn with_delivery_method(mut self, method: impl Into<String>) -> Self {
        self.delivery_method = method.into();
        self
    }

    pub fn can_retry(&self) -> bool {
        self.status == ReminderStatus::Pending && self.retry_count < MAX_DELIVERY_RETRIES
    }
}

/// Validate a reminder time against the owning task's due date and the
/// current clock.
pub fn validate_reminder_time(
    reminder_time: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    if reminder_time <= now {
        return Err(CoreError::invalid(
            "reminder_time",
            "must be strictly in the future",
        ));
    }
    if let Some(due) = due_date {
        if reminder_time > due {
            return Err(CoreError::invalid(
                "reminder_time",
                "must not be later than the task due date",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(ReminderStatus::Pending.can_transition_to(ReminderStatus::Sent));
        assert!(ReminderStatus::Pending.can_transition_to(ReminderStatus::Failed));
        assert!(!ReminderStatus::Sent.can_transition_to(ReminderStatus::Pending));
        assert!(!ReminderStatus::Sent.can_transition_to(ReminderStatus::Failed));
        assert!(!ReminderStatus::Failed.can_transition_to(ReminderStatus::Sent));
    }

    #[test]
    fn reminder_time_must_be_future() {
        let now = Utc::now();
        assert!(validate_reminder_time(now - Duration::seconds(1), None, now).is_err());
        assert!(validate_reminder_time(now + Duration::seconds(1), None, now).is_ok());
    }

    #[test]
    fn reminder_time_capped_by_due_date() {
        let now = Utc::now();
        let due = now + Duration::hours(1);
        assert!(validate_reminder_time(now + Duration::minutes(30), Some(due), now).is_ok());
        assert!(validate_reminder_time(due, Some(due), now).is_ok());
        assert!(validate_reminder_time(due + Duration::seconds(1), Some(due), now).is_err());
    }

    #[test]
    fn retry_budget() {
        let task = Task::new("u", "t");
        let mut reminder = Reminder::new(&task, Utc::now() + Duration::hours(1));
        assert!(reminder.can_retry());
        reminder.retry_count = MAX_DELIVERY_RETRIES;
        assert!(!reminder.can_retry());
        reminder.retry_count = 0;
        reminder.status = ReminderStatus::Failed;
        assert!(!reminder.can_retry());
    }
}
