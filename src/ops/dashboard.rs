use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::io::store::StoreError;
use crate::model::task::{NewTask, Task, TaskPatch, TaskStatus};
use crate::model::user::PublicUser;
use crate::ops::scheduler::{CompletionRequest, CompletionScheduler, lock_repo};
use crate::ops::task_repo::sort_newest_first;

/// Which list the dashboard is showing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Pending,
    Completed,
}

impl Tab {
    /// Message shown when the tab has nothing in it
    pub fn empty_message(self) -> &'static str {
        match self {
            Tab::Pending => "You are all set for today",
            Tab::Completed => "No completed tasks yet",
        }
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Tab::Pending),
            "completed" | "done" => Ok(Tab::Completed),
            other => Err(format!("unknown tab: {} (expected pending or completed)", other)),
        }
    }
}

/// One displayed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRow {
    #[serde(flatten)]
    pub task: Task,
    /// Inside its completion grace period
    pub completing: bool,
    /// Past due and still pending
    pub overdue: bool,
}

/// Everything the dashboard displays for one tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub tab: Tab,
    pub pending_count: usize,
    pub completed_count: usize,
    pub rows: Vec<TaskRow>,
}

impl DashboardView {
    /// Derive the displayed list from one user's tasks and the completing set.
    ///
    /// A completing task stays on the pending tab, below the others, until its
    /// commit lands; only then does it count as completed.
    pub fn build(
        tasks: &[Task],
        completing: &HashSet<i64>,
        tab: Tab,
        now: DateTime<Utc>,
    ) -> Self {
        let pending_count = tasks.iter().filter(|t| t.is_pending()).count();
        let completed_count = tasks.iter().filter(|t| t.is_completed()).count();

        let mut shown: Vec<Task> = tasks
            .iter()
            .filter(|t| {
                let is_completing = completing.contains(&t.id);
                match tab {
                    Tab::Pending => t.is_pending() || is_completing,
                    Tab::Completed => t.is_completed() && !is_completing,
                }
            })
            .cloned()
            .collect();
        sort_newest_first(&mut shown);
        if tab == Tab::Pending {
            // Stable, so newest-first order holds within each group
            shown.sort_by_key(|t| completing.contains(&t.id));
        }

        let rows = shown
            .into_iter()
            .map(|task| TaskRow {
                completing: completing.contains(&task.id),
                overdue: task.is_overdue(now),
                task,
            })
            .collect();

        DashboardView {
            tab,
            pending_count,
            completed_count,
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of a dashboard update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Written to the store now
    Committed(Task),
    /// Completion armed; the task is still pending in the store
    Scheduled(Task),
    /// No task with that id belongs to the user
    NotFound,
}

/// Task operations for one logged-in user.
///
/// Completion requests go through the process-wide [`CompletionScheduler`];
/// everything else is written straight through the repository. Tasks owned by
/// other users are invisible: updates and deletes on them are no-ops.
#[derive(Clone)]
pub struct Dashboard {
    user: PublicUser,
    scheduler: CompletionScheduler,
}

impl Dashboard {
    pub fn new(user: PublicUser, scheduler: CompletionScheduler) -> Self {
        Dashboard { user, scheduler }
    }

    pub fn scheduler(&self) -> &CompletionScheduler {
        &self.scheduler
    }

    /// The user's tasks as currently stored
    pub fn tasks(&self) -> Vec<Task> {
        let mut repo = lock_repo(self.scheduler.repository());
        repo.reload();
        repo.list_for_user(self.user.id)
    }

    /// One of the user's tasks as currently stored. Other processes may have
    /// written since the repository was opened, so this re-reads the store.
    pub fn task(&self, id: i64) -> Option<Task> {
        let mut repo = lock_repo(self.scheduler.repository());
        repo.reload();
        repo.get(id).filter(|t| t.user_id == self.user.id).cloned()
    }

    pub fn view(&self, tab: Tab) -> DashboardView {
        DashboardView::build(
            &self.tasks(),
            &self.scheduler.completing(),
            tab,
            Utc::now(),
        )
    }

    /// Create a task. A blank title creates nothing.
    pub fn add_task(&self, new: NewTask) -> Result<Option<Task>, StoreError> {
        lock_repo(self.scheduler.repository()).create(self.user.id, new)
    }

    /// Apply a user edit.
    ///
    /// Marking a pending task completed arms a delayed commit (any other
    /// fields in the patch are written now). Marking a task pending commits
    /// immediately and cancels an in-flight completion.
    pub fn update_task(&self, id: i64, patch: TaskPatch) -> Result<UpdateOutcome, StoreError> {
        let Some(current) = self.task(id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        match patch.status {
            Some(TaskStatus::Completed) if current.is_pending() => {
                let rest = patch.without_status();
                let task = if rest.is_empty() {
                    current
                } else {
                    self.commit(id, &rest)?.unwrap_or(current)
                };
                match self.scheduler.request_completion(id) {
                    CompletionRequest::NotFound => Ok(UpdateOutcome::NotFound),
                    _ => Ok(UpdateOutcome::Scheduled(task)),
                }
            }
            Some(TaskStatus::Pending) => {
                self.scheduler.cancel(id);
                self.commit_outcome(id, &patch)
            }
            _ => self.commit_outcome(id, &patch),
        }
    }

    /// Flip a task's status the way the dashboard checkbox does
    pub fn toggle_task(&self, id: i64) -> Result<UpdateOutcome, StoreError> {
        let Some(current) = self.task(id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        self.update_task(id, TaskPatch::status(current.status.toggled()))
    }

    /// Delete a task, cancelling any in-flight completion for it
    pub fn delete_task(&self, id: i64) -> Result<Option<Task>, StoreError> {
        if self.task(id).is_none() {
            return Ok(None);
        }
        self.scheduler.cancel(id);
        lock_repo(self.scheduler.repository()).delete(id)
    }

    fn commit(&self, id: i64, patch: &TaskPatch) -> Result<Option<Task>, StoreError> {
        lock_repo(self.scheduler.repository()).update(id, patch)
    }

    fn commit_outcome(&self, id: i64, patch: &TaskPatch) -> Result<UpdateOutcome, StoreError> {
        Ok(match self.commit(id, patch)? {
            Some(task) => UpdateOutcome::Committed(task),
            None => UpdateOutcome::NotFound,
        })
    }
}
