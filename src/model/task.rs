use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable task status. Only ever toggles between the two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl TaskStatus {
    /// The opposite status (pending ↔ completed)
    pub fn toggled(self) -> TaskStatus {
        match self {
            TaskStatus::Pending => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task as persisted in the `tasks` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    /// Owner. Never changes after creation.
    pub user_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// True when the task is still pending and its due instant has passed
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.due_date.is_some_and(|due| due < now)
    }

    /// Merge the fields present in `patch` into this task.
    /// Returns true if anything changed.
    pub fn apply(&mut self, patch: &TaskPatch) -> bool {
        let before = self.clone();
        if let Some(title) = &patch.title
            && !title.trim().is_empty()
        {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        *self != before
    }
}

/// Fields supplied by the user when creating a task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        NewTask {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update merged into an existing task. `None` leaves a field alone;
/// `due_date: Some(None)` clears the due date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        TaskPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// The same patch with the status change removed
    pub fn without_status(&self) -> TaskPatch {
        TaskPatch {
            status: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Task {
        Task {
            id: 1,
            user_id: 7,
            title: "Buy milk".into(),
            description: String::new(),
            due_date: None,
            status: TaskStatus::Pending,
            created_at: Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let back: TaskStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(back, TaskStatus::Pending);
    }

    #[test]
    fn status_toggles() {
        assert_eq!(TaskStatus::Pending.toggled(), TaskStatus::Completed);
        assert_eq!(TaskStatus::Completed.toggled(), TaskStatus::Pending);
    }

    #[test]
    fn task_json_uses_snake_case_fields() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["user_id"], 7);
        assert!(json["due_date"].is_null());
        assert_eq!(json["status"], "pending");
        assert!(json.get("created_at").is_some());
    }

    #[test]
    fn description_defaults_when_missing() {
        let task: Task = serde_json::from_str(
            r#"{"id":3,"user_id":1,"title":"t","status":"pending","created_at":"2025-05-01T09:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(task.description, "");
        assert!(task.due_date.is_none());
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut task = sample();
        let changed = task.apply(&TaskPatch {
            description: Some("2 litres".into()),
            ..Default::default()
        });
        assert!(changed);
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.description, "2 litres");
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn apply_ignores_blank_title() {
        let mut task = sample();
        let changed = task.apply(&TaskPatch {
            title: Some("   ".into()),
            ..Default::default()
        });
        assert!(!changed);
        assert_eq!(task.title, "Buy milk");
    }

    #[test]
    fn apply_can_clear_due_date() {
        let mut task = sample();
        task.due_date = Some(Utc.with_ymd_and_hms(2025, 5, 2, 23, 59, 0).unwrap());
        task.apply(&TaskPatch {
            due_date: Some(None),
            ..Default::default()
        });
        assert!(task.due_date.is_none());
    }

    #[test]
    fn overdue_only_when_pending_and_past_due() {
        let now = Utc.with_ymd_and_hms(2025, 5, 3, 0, 0, 0).unwrap();
        let mut task = sample();
        assert!(!task.is_overdue(now));

        task.due_date = Some(Utc.with_ymd_and_hms(2025, 5, 2, 23, 59, 0).unwrap());
        assert!(task.is_overdue(now));

        task.status = TaskStatus::Completed;
        assert!(!task.is_overdue(now));
    }

    #[test]
    fn without_status_drops_only_status() {
        let patch = TaskPatch {
            title: Some("x".into()),
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let rest = patch.without_status();
        assert_eq!(rest.title.as_deref(), Some("x"));
        assert!(rest.status.is_none());
        assert!(TaskPatch::default().is_empty());
    }
}
