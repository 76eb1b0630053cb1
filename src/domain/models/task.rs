//! Task domain model.
//!
//! A task is a user's todo item. Every task is owned by exactly one
//! `user_id` and ownership never changes after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};

/// Upper bound on the task title length.
pub const MAX_TITLE_LEN: usize = 500;
/// Upper bound on the number of tags per task.
pub const MAX_TAGS: usize = 10;
/// Upper bound on the length of a single tag.
pub const MAX_TAG_LEN: usize = 50;

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A user's todo item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Owning user; immutable for the lifetime of the row
    pub user_id: String,
    /// Human-readable title (1..=500 chars)
    pub title: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// Whether the task has been completed
    pub completed: bool,
    /// Priority
    pub priority: TaskPriority,
    /// Ordered tags; matching is case-insensitive
    pub tags: Vec<String>,
    /// Optional absolute due date (UTC)
    pub due_date: Option<DateTime<Utc>>,
    /// Recurring chain this task belongs to, if any
    pub recurrence_id: Option<Uuid>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a fresh task for a user. Inputs are assumed validated.
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: title.into(),
            description: None,
            completed: false,
            priority: TaskPriority::default(),
            tags: Vec::new(),
            due_date: None,
            recurrence_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_recurrence(mut self, recurrence_id: Uuid) -> Self {
        self.recurrence_id = Some(recurrence_id);
        self
    }

    /// Whether this task carries the given tag (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Validate a title against the length bounds.
pub fn validate_title(title: &str) -> CoreResult<()> {
    if title.is_empty() {
        return Err(CoreError::invalid("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::invalid(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(())
}

/// Validate a tag list: at most [`MAX_TAGS`] entries, each non-empty and at
/// most [`MAX_TAG_LEN`] characters. Duplicates are compared case-insensitively.
pub fn validate_tags(tags: &[String]) -> CoreResult<()> {
    if tags.len() > MAX_TAGS {
        return Err(CoreError::invalid(
            "tags",
            format!("at most {MAX_TAGS} tags are allowed"),
        ));
    }
    for tag in tags {
        if tag.is_empty() {
            return Err(CoreError::invalid("tags", "tags must not be empty"));
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(CoreError::invalid(
                "tags",
                format!("tag '{tag}' exceeds {MAX_TAG_LEN} characters"),
            ));
        }
    }
    for (i, tag) in tags.iter().enumerate() {
        if tags[..i].iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return Err(CoreError::invalid("tags", format!("duplicate tag '{tag}'")));
        }
    }
    Ok(())
}

/// Fields a caller may change on an existing task. Absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
            && self.due_date.is_none()
    }

    /// Validate the patch fields that carry their own shape rules.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags)?;
        }
        Ok(())
    }

    /// Produce the updated task, leaving ownership and identity untouched.
    pub fn apply(&self, task: &Task) -> Task {
        let mut next = task.clone();
        if let Some(title) = &self.title {
            next.title = title.clone();
        }
        if let Some(description) = &self.description {
            next.description = Some(description.clone());
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        if let Some(tags) = &self.tags {
            next.tags = tags.clone();
        }
        if let Some(due_date) = self.due_date {
            next.due_date = Some(due_date);
        }
        next.updated_at = Utc::now();
        next
    }
}

/// Completion filter for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Pending,
    Completed,
}

/// Sort key for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSort {
    CreatedAt,
    DueDate,
}

impl Default for TaskSort {
    fn default() -> Self {
        Self::CreatedAt
    }
}

/// Query shape for `list_tasks`.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub status: Option<StatusFilter>,
    pub priority: Option<TaskPriority>,
    pub tag: Option<String>,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    pub sort: TaskSort,
    pub descending: bool,
    pub limit: u32,
    pub cursor: Option<String>,
}

/// One page of list results with an opaque continuation cursor.
#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub next_cursor: Option<String>,
}
