use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;

use crate::model::task::Task;
use crate::model::user::PublicUser;
use crate::ops::dashboard::{DashboardView, TaskRow};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatsJson {
    pub pending: usize,
    pub completed: usize,
}

#[derive(Serialize)]
pub struct TaskDetailJson<'a> {
    #[serde(flatten)]
    pub task: &'a Task,
    pub completing: bool,
}

#[derive(Serialize)]
pub struct DoneJson<'a> {
    pub task: &'a Task,
    /// Milliseconds waited before the commit landed
    pub grace_period_ms: u64,
}

#[derive(Serialize)]
pub struct WhoamiJson<'a> {
    pub user: Option<&'a PublicUser>,
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// Checkbox for a row: `[x]` completed, `[~]` completing, `[ ]` pending
fn checkbox(row: &TaskRow) -> &'static str {
    if row.completing {
        "[~]"
    } else if row.task.is_completed() {
        "[x]"
    } else {
        "[ ]"
    }
}

/// Due instant in the viewer's zone, e.g. `May 2, 11:59 PM`
pub fn format_due_in<Tz: TimeZone>(due: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    due.with_timezone(tz).format("%b %-d, %-I:%M %p").to_string()
}

pub fn format_due(due: &DateTime<Utc>) -> String {
    format_due_in(due, &Local)
}

/// One-line summary of a displayed task
pub fn format_task_line(row: &TaskRow) -> String {
    format_task_line_in(row, &Local)
}

pub fn format_task_line_in<Tz: TimeZone>(row: &TaskRow, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let mut line = format!("{} {} {}", checkbox(row), row.task.id, row.task.title);
    if let Some(due) = &row.task.due_date {
        line.push_str(&format!("  (complete by {})", format_due_in(due, tz)));
    }
    if row.overdue {
        line.push_str("  OVERDUE");
    }
    if row.completing {
        line.push_str("  completing...");
    }
    line
}

/// Header plus one line per task, or the tab's empty message
pub fn format_view(view: &DashboardView) -> Vec<String> {
    let mut lines = vec![format_counts(view.pending_count, view.completed_count)];
    lines.push(String::new());
    if view.is_empty() {
        lines.push(view.tab.empty_message().to_string());
    } else {
        lines.extend(view.rows.iter().map(format_task_line));
    }
    lines
}

pub fn format_counts(pending: usize, completed: usize) -> String {
    format!("Pending: {}  Completed: {}", pending, completed)
}

/// Detailed multi-line view of one task
pub fn format_task_detail(task: &Task, completing: bool) -> Vec<String> {
    let mut lines = Vec::new();
    let row = TaskRow {
        task: task.clone(),
        completing,
        overdue: task.is_overdue(Utc::now()),
    };
    lines.push(format!("{} {}", checkbox(&row), task.title));
    lines.push(format!("  id: {}", task.id));
    lines.push(format!("  status: {}", task.status));
    lines.push(format!(
        "  created: {}",
        task.created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
    ));
    if let Some(due) = &task.due_date {
        lines.push(format!("  due: {}", format_due(due)));
    }
    if !task.description.is_empty() {
        lines.push("  description:".to_string());
        for l in task.description.lines() {
            lines.push(format!("    {}", l));
        }
    }
    lines
}

pub fn format_user(user: &PublicUser) -> String {
    format!("{} <{}> (id {})", user.name, user.email, user.id)
}

pub fn format_grace(grace: Duration) -> String {
    let ms = grace.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}ms", ms)
    }
}
