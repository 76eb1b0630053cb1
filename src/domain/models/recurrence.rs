//! Recurrence rule domain model.
//!
//! A RecurrenceRule is the template for a recurring chain of tasks. The
//! rule freezes a snapshot of the template task's attributes at creation
//! time, so later edits to the template never leak into future instances.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::task::{Task, TaskPriority};

/// How a task repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
}

impl RecurrencePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    /// Inclusive interval bounds for this pattern.
    pub fn interval_bounds(&self) -> (u32, u32) {
        match self {
            Self::Daily => (1, 365),
            Self::Weekly => (1, 52),
            Self::Monthly => (1, 12),
        }
    }
}

/// Snapshot of the template task attributes copied onto each generated
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSnapshot {
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub tags: Vec<String>,
}

impl TemplateSnapshot {
    /// Capture the snapshot from a task.
    pub fn capture(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            tags: task.tags.clone(),
        }
    }
}

/// A persistent recurrence rule. Exactly one rule exists per recurring
/// chain; every task in the chain carries this rule's id as its
/// `recurrence_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub id: Uuid,
    /// The template task this rule was created alongside.
    pub task_id: Uuid,
    pub user_id: String,
    pub pattern: RecurrencePattern,
    pub interval: u32,
    /// Frozen template attributes.
    pub metadata: TemplateSnapshot,
    pub created_at: DateTime<Utc>,
}

impl RecurrenceRule {
    pub fn new(task: &Task, pattern: RecurrencePattern, interval: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            user_id: task.user_id.clone(),
            pattern,
            interval,
            metadata: TemplateSnapshot::capture(task),
            created_at: Utc::now(),
        }
    }

    /// Compute the due date of the next instance from the completed
    /// instance's due date. Monthly steps clamp to the last day of the
    /// target month when the source day does not exist there.
    pub fn next_due_date(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        next_due_date(from, self.pattern, self.interval)
    }
}

/// Validate a `(pattern, interval)` pair against the per-pattern bounds.
pub fn validate_interval(pattern: RecurrencePattern, interval: u32) -> CoreResult<()> {
    let (min, max) = pattern.interval_bounds();
    if interval < min || interval > max {
        return Err(CoreError::invalid(
            "recurrence.interval",
            format!("{} interval must be between {min} and {max}", pattern.as_str()),
        ));
    }
    Ok(())
}

/// Step a due date forward by one recurrence period.
pub fn next_due_date(
    from: DateTime<Utc>,
    pattern: RecurrencePattern,
    interval: u32,
) -> DateTime<Utc> {
    match pattern {
        RecurrencePattern::Daily => from + Duration::days(i64::from(interval)),
        RecurrencePattern::Weekly => from + Duration::weeks(i64::from(interval)),
        RecurrencePattern::Monthly => from
            .checked_add_months(Months::new(interval))
            .unwrap_or(from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn daily_steps_by_interval_days() {
        let from = utc(2026, 1, 13, 10, 0);
        assert_eq!(
            next_due_date(from, RecurrencePattern::Daily, 3),
            utc(2026, 1, 16, 10, 0)
        );
    }

    #[test]
    fn weekly_preserves_time_of_day() {
        let from = utc(2026, 1, 13, 10, 0);
        assert_eq!(
            next_due_date(from, RecurrencePattern::Weekly, 1),
            utc(2026, 1, 20, 10, 0)
        );
    }

    #[test]
    fn monthly_clamps_to_last_day_of_short_month() {
        // Jan 31 + 1 month lands on Feb 28 (2026 is not a leap year).
        let from = utc(2026, 1, 31, 9, 30);
        assert_eq!(
            next_due_date(from, RecurrencePattern::Monthly, 1),
            utc(2026, 2, 28, 9, 30)
        );
    }

    #[test]
    fn monthly_clamps_to_leap_day() {
        let from = utc(2024, 1, 31, 0, 0);
        assert_eq!(
            next_due_date(from, RecurrencePattern::Monthly, 1),
            utc(2024, 2, 29, 0, 0)
        );
    }

    #[test]
    fn interval_bounds_per_pattern() {
        assert!(validate_interval(RecurrencePattern::Daily, 365).is_ok());
        assert!(validate_interval(RecurrencePattern::Daily, 366).is_err());
        assert!(validate_interval(RecurrencePattern::Weekly, 52).is_ok());
        assert!(validate_interval(RecurrencePattern::Weekly, 53).is_err());
        assert!(validate_interval(RecurrencePattern::Monthly, 12).is_ok());
        assert!(validate_interval(RecurrencePattern::Monthly, 13).is_err());
        assert!(validate_interval(RecurrencePattern::Daily, 0).is_err());
    }

    #[test]
    fn snapshot_freezes_template_attributes() {
        let task = Task::new("u", "Weekly meeting")
            .with_priority(TaskPriority::High)
            .with_tags(vec!["work".to_string()]);
        let rule = RecurrenceRule::new(&task, RecurrencePattern::Weekly, 1);
        assert_eq!(rule.metadata.title, "Weekly meeting");
        assert_eq!(rule.metadata.priority, TaskPriority::High);
        assert_eq!(rule.metadata.tags, vec!["work".to_string()]);
        assert_eq!(rule.task_id, task.id);
    }

    proptest! {
        // The next due date always moves strictly forward.
        #[test]
        fn next_due_date_is_strictly_later(
            days in 0i64..20_000,
            secs in 0i64..86_400,
            interval in 1u32..12,
        ) {
            let from = utc(2000, 1, 1, 0, 0) + Duration::days(days) + Duration::seconds(secs);
            for pattern in [
                RecurrencePattern::Daily,
                RecurrencePattern::Weekly,
                RecurrencePattern::Monthly,
            ] {
                prop_assert!(next_due_date(from, pattern, interval) > from);
            }
        }

        // Monthly stepping never changes the time of day.
        #[test]
        fn monthly_preserves_time_of_day(days in 0i64..20_000, secs in 0i64..86_400) {
            let from = utc(2000, 1, 1, 0, 0) + Duration::days(days) + Duration::seconds(secs);
            let next = next_due_date(from, RecurrencePattern::Monthly, 1);
            prop_assert_eq!(next.time(), from.time());
        }
    }
}
