use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::temporal::LocalDateTime;

pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    // Fixed toggle cycle: todo -> in-progress -> done -> todo
    pub const fn next(self) -> Self {
        match self {
            Self::Todo => Self::InProgress,
            Self::InProgress => Self::Done,
            Self::Done => Self::Todo,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    /// Unresolved placeholder; never persisted.
    Auto,
}

impl Priority {
    // high:3, medium:2, low:1, auto:0
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
            Self::Auto => 0,
        }
    }

    pub const fn resolved(self) -> Self {
        match self {
            Self::Auto => Self::Medium,
            other => other,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Auto => "auto",
        }
    }
}

// "auto" or blank categories collapse to the default bucket.
pub fn resolve_category(category: &str) -> String {
    let trimmed = category.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        DEFAULT_CATEGORY.to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub due_date: Option<LocalDateTime>,
    #[serde(default)]
    pub reminder: Option<LocalDateTime>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub ai_generated: bool,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// A task before the store has assigned it an id and creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default = "auto_priority")]
    pub priority: Priority,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub due_date: Option<LocalDateTime>,
    #[serde(default)]
    pub reminder: Option<LocalDateTime>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub ai_generated: bool,
}

const fn auto_priority() -> Priority {
    Priority::Auto
}

impl TaskDraft {
    // Degraded draft used when extraction fails: the raw text becomes the title.
    pub fn fallback(text: &str) -> Self {
        Self {
            title: text.to_string(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Auto,
            category: DEFAULT_CATEGORY.to_string(),
            tags: Vec::new(),
            subtasks: Vec::new(),
            due_date: None,
            reminder: None,
            duration_minutes: None,
            ai_generated: true,
        }
    }

    // Replace the "auto" placeholders with concrete values before persistence.
    pub fn resolve_placeholders(mut self) -> Self {
        self.priority = self.priority.resolved();
        self.category = resolve_category(&self.category);
        self.description = self.description.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn into_task(self, id: Uuid, created_at: DateTime<FixedOffset>) -> Task {
        let draft = self.resolve_placeholders();
        Task {
            id,
            title: draft.title,
            description: draft.description,
            status: draft.status,
            priority: draft.priority,
            category: draft.category,
            tags: draft.tags,
            subtasks: draft.subtasks,
            due_date: draft.due_date,
            reminder: draft.reminder,
            duration_minutes: draft.duration_minutes,
            created_at,
            ai_generated: draft.ai_generated,
        }
    }
}

/// Partial update. Absent fields are left alone; nullable fields accept an
/// explicit `null` to clear them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<LocalDateTime>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub reminder: Option<Option<LocalDateTime>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<Option<u32>>,
}

// Present-but-null becomes Some(None); absence is handled by `default`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone().filter(|d| !d.trim().is_empty());
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority.resolved();
        }
        if let Some(category) = &self.category {
            task.category = resolve_category(category);
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        if let Some(subtasks) = &self.subtasks {
            task.subtasks = subtasks.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(reminder) = self.reminder {
            task.reminder = reminder;
        }
        if let Some(duration) = self.duration_minutes {
            task.duration_minutes = duration;
        }
    }
}

// One persisted row: the task plus the account that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub user_id: String,
    #[serde(flatten)]
    pub task: Task,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Db {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}
