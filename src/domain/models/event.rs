//! Event envelope and topic routing.
//!
//! Every persisted state change becomes one or more envelopes on the bus.
//! The envelope is wire-stable JSON: `event_type` is the discriminant and
//! `task_data` is typed per variant. Consumers dispatch on the variant,
//! never on strings inside the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::reminder::Reminder;
use crate::domain::models::task::Task;

/// Schema version stamped on every produced envelope.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Topics on the event bus. Partition key is always `user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    TaskEvents,
    Reminders,
    TaskUpdates,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskEvents => "task-events",
            Self::Reminders => "reminders",
            Self::TaskUpdates => "task-updates",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task-events" => Some(Self::TaskEvents),
            "reminders" => Some(Self::Reminders),
            "task-updates" => Some(Self::TaskUpdates),
            _ => None,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload, tagged by `event_type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "task_data")]
pub enum EventKind {
    #[serde(rename = "task.created")]
    TaskCreated(Task),
    #[serde(rename = "task.updated")]
    TaskUpdated { old: Task, new: Task },
    #[serde(rename = "task.completed")]
    TaskCompleted(Task),
    #[serde(rename = "task.deleted")]
    TaskDeleted(Task),
    #[serde(rename = "reminder.created")]
    ReminderCreated(Reminder),
    #[serde(rename = "reminder.sent")]
    ReminderSent(Reminder),
    #[serde(rename = "reminder.skipped")]
    ReminderSkipped(Reminder),
    #[serde(rename = "reminder.failed")]
    ReminderFailed(Reminder),
}

impl EventKind {
    /// Reverse-dotted event type string, exactly as serialized.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TaskCreated(_) => "task.created",
            Self::TaskUpdated { .. } => "task.updated",
            Self::TaskCompleted(_) => "task.completed",
            Self::TaskDeleted(_) => "task.deleted",
            Self::ReminderCreated(_) => "reminder.created",
            Self::ReminderSent(_) => "reminder.sent",
            Self::ReminderSkipped(_) => "reminder.skipped",
            Self::ReminderFailed(_) => "reminder.failed",
        }
    }

    /// The current task snapshot carried by this event, when there is one.
    /// For updates this is the post-mutation state.
    pub fn task_snapshot(&self) -> Option<&Task> {
        match self {
            Self::TaskCreated(t)
            | Self::TaskCompleted(t)
            | Self::TaskDeleted(t)
            | Self::TaskUpdated { new: t, .. } => Some(t),
            _ => None,
        }
    }

    pub fn is_task_event(&self) -> bool {
        matches!(
            self,
            Self::TaskCreated(_)
                | Self::TaskUpdated { .. }
                | Self::TaskCompleted(_)
                | Self::TaskDeleted(_)
        )
    }
}

/// The wire record carried on every topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub kind: EventKind,
    pub event_id: Uuid,
    pub task_id: Option<Uuid>,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub schema_version: String,
}

impl EventEnvelope {
    pub fn new(user_id: impl Into<String>, task_id: Option<Uuid>, kind: EventKind) -> Self {
        Self {
            kind,
            event_id: Uuid::new_v4(),
            task_id,
            user_id: user_id.into(),
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Whether a consumer compiled against [`SCHEMA_VERSION`] accepts this
    /// envelope: same MAJOR, any MINOR/PATCH.
    pub fn schema_accepted(&self) -> bool {
        schema_compatible(&self.schema_version)
    }
}

/// Compare an envelope's `schema_version` MAJOR against ours.
pub fn schema_compatible(version: &str) -> bool {
    let ours = major_of(SCHEMA_VERSION);
    match (major_of(version), ours) {
        (Some(theirs), Some(ours)) => theirs == ours,
        _ => false,
    }
}

fn major_of(version: &str) -> Option<u64> {
    version.split('.').next()?.parse().ok()
}

/// A routed envelope ready for publish.
#[derive(Debug, Clone)]
pub struct RoutedEvent {
    pub topic: Topic,
    pub envelope: EventEnvelope,
}

/// Events emitted by a task creation: one `task.created` on `task-events`
/// and one on `task-updates`, plus a `reminder.created` per reminder.
pub fn plan_task_created(task: &Task, reminders: &[Reminder]) -> Vec<RoutedEvent> {
    let mut events = fan_out_task(task, EventKind::TaskCreated(task.clone()));
    for reminder in reminders {
        events.push(RoutedEvent {
            topic: Topic::Reminders,
            envelope: EventEnvelope::new(
                reminder.user_id.clone(),
                Some(reminder.task_id),
                EventKind::ReminderCreated(reminder.clone()),
            ),
        });
    }
    events
}

pub fn plan_task_updated(old: &Task, new: &Task) -> Vec<RoutedEvent> {
    fan_out_task(
        new,
        EventKind::TaskUpdated { old: old.clone(), new: new.clone() },
    )
}

pub fn plan_task_completed(task: &Task) -> Vec<RoutedEvent> {
    fan_out_task(task, EventKind::TaskCompleted(task.clone()))
}

pub fn plan_task_deleted(task: &Task) -> Vec<RoutedEvent> {
    fan_out_task(task, EventKind::TaskDeleted(task.clone()))
}

pub fn plan_reminder_outcome(reminder: &Reminder, kind: EventKind) -> Vec<RoutedEvent> {
    vec![RoutedEvent {
        topic: Topic::Reminders,
        envelope: EventEnvelope::new(reminder.user_id.clone(), Some(reminder.task_id), kind),
    }]
}

fn fan_out_task(task: &Task, kind: EventKind) -> Vec<RoutedEvent> {
    let make = |kind: EventKind| EventEnvelope::new(task.user_id.clone(), Some(task.id), kind);
    vec![
        RoutedEvent { topic: Topic::TaskEvents, envelope: make(kind.clone()) },
        RoutedEvent { topic: Topic::TaskUpdates, envelope: make(kind) },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_with_flat_discriminant() {
        let task = Task::new("user-1", "Write report");
        let envelope = EventEnvelope::new("user-1", Some(task.id), EventKind::TaskCreated(task));
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["event_type"], "task.created");
        assert_eq!(json["user_id"], "user-1");
        assert_eq!(json["schema_version"], SCHEMA_VERSION);
        assert_eq!(json["task_data"]["title"], "Write report");
        assert!(json["event_id"].is_string());
    }

    #[test]
    fn envelope_round_trips() {
        let task = Task::new("user-1", "Write report");
        let envelope =
            EventEnvelope::new("user-1", Some(task.id), EventKind::TaskCompleted(task.clone()));
        let json = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_id, envelope.event_id);
        assert_eq!(back.kind.task_snapshot().unwrap().id, task.id);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let task = Task::new("user-1", "t");
        let envelope = EventEnvelope::new("user-1", Some(task.id), EventKind::TaskCreated(task));
        let mut json = serde_json::to_value(&envelope).unwrap();
        json["future_field"] = serde_json::json!({"added_in": "1.4.0"});
        let back: EventEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_id, envelope.event_id);
    }

    #[test]
    fn schema_major_gate() {
        assert!(schema_compatible("1.0.0"));
        assert!(schema_compatible("1.9.3"));
        assert!(!schema_compatible("2.0.0"));
        assert!(!schema_compatible("garbage"));
    }

    #[test]
    fn create_plan_fans_out_to_both_task_topics() {
        let task = Task::new("user-1", "t");
        let events = plan_task_created(&task, &[]);
        let topics: Vec<Topic> = events.iter().map(|e| e.topic).collect();
        assert_eq!(topics, vec![Topic::TaskEvents, Topic::TaskUpdates]);
        for event in &events {
            assert_eq!(event.envelope.event_type(), "task.created");
            assert_eq!(event.envelope.user_id, "user-1");
        }
    }

    #[test]
    fn create_plan_includes_reminder_events() {
        let task = Task::new("user-1", "t");
        let reminder = Reminder::new(&task, Utc::now() + chrono::Duration::hours(1));
        let events = plan_task_created(&task, std::slice::from_ref(&reminder));
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].topic, Topic::Reminders);
        assert_eq!(events[2].envelope.event_type(), "reminder.created");
    }

    #[test]
    fn updated_snapshot_is_post_mutation() {
        let old = Task::new("u", "before");
        let mut new = old.clone();
        new.title = "after".to_string();
        let kind = EventKind::TaskUpdated { old, new };
        assert_eq!(kind.task_snapshot().unwrap().title, "after");
    }
}
