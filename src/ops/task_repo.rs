use chrono::{DateTime, Utc};
use tracing::debug;

use crate::io::store::{Persistence, StoreError};
use crate::model::task::{NewTask, Task, TaskPatch, TaskStatus};

/// CRUD over the task collection.
///
/// Every mutation re-reads the durable collection, applies the change, and
/// writes the whole collection back before updating the in-memory mirror, so
/// callers always see their own writes. Lookups by an unknown id are no-ops
/// (`Ok(None)`), never errors.
#[derive(Debug)]
pub struct TaskRepository {
    persistence: Persistence,
    tasks: Vec<Task>,
    last_id: i64,
}

impl TaskRepository {
    /// Load the current collection from `persistence`
    pub fn open(persistence: Persistence) -> Self {
        let tasks = persistence.load_tasks();
        let last_id = tasks.iter().map(|t| t.id).max().unwrap_or(0);
        TaskRepository {
            persistence,
            tasks,
            last_id,
        }
    }

    /// Re-read the durable collection, dropping the in-memory mirror
    pub fn reload(&mut self) {
        self.tasks = self.persistence.load_tasks();
        self.bump_last_id();
    }

    pub fn get(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks owned by `user_id`, most recently created first
    pub fn list_for_user(&self, user_id: i64) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        sort_newest_first(&mut tasks);
        tasks
    }

    /// Create a pending task for `user_id`. A blank title creates nothing.
    pub fn create(&mut self, user_id: i64, new: NewTask) -> Result<Option<Task>, StoreError> {
        self.create_at(user_id, new, Utc::now())
    }

    pub(crate) fn create_at(
        &mut self,
        user_id: i64,
        new: NewTask,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, StoreError> {
        if new.title.trim().is_empty() {
            return Ok(None);
        }

        let mut all = self.persistence.load_tasks();
        self.last_id = self
            .last_id
            .max(all.iter().map(|t| t.id).max().unwrap_or(0));
        let id = next_id(self.last_id, now);

        let task = Task {
            id,
            user_id,
            title: new.title,
            description: new.description,
            due_date: new.due_date,
            status: TaskStatus::Pending,
            created_at: now,
        };
        all.push(task.clone());
        self.persistence.save_tasks(&all)?;

        self.last_id = id;
        self.tasks = all;
        debug!(id, user_id, "task created");
        Ok(Some(task))
    }

    /// Merge `patch` into the task with `id`
    pub fn update(&mut self, id: i64, patch: &TaskPatch) -> Result<Option<Task>, StoreError> {
        let mut all = self.persistence.load_tasks();
        let Some(task) = all.iter_mut().find(|t| t.id == id) else {
            self.tasks = all;
            return Ok(None);
        };
        task.apply(patch);
        let updated = task.clone();
        self.persistence.save_tasks(&all)?;

        self.tasks = all;
        debug!(id, status = %updated.status, "task updated");
        Ok(Some(updated))
    }

    /// Remove the task with `id`, returning it
    pub fn delete(&mut self, id: i64) -> Result<Option<Task>, StoreError> {
        let mut all = self.persistence.load_tasks();
        let Some(idx) = all.iter().position(|t| t.id == id) else {
            self.tasks = all;
            return Ok(None);
        };
        let removed = all.remove(idx);
        self.persistence.save_tasks(&all)?;

        self.tasks = all;
        debug!(id, "task deleted");
        Ok(Some(removed))
    }

    fn bump_last_id(&mut self) {
        let max = self.tasks.iter().map(|t| t.id).max().unwrap_or(0);
        self.last_id = self.last_id.max(max);
    }
}

/// Millisecond timestamp, forced past the last issued id
fn next_id(last_id: i64, now: DateTime<Utc>) -> i64 {
    now.timestamp_millis().max(last_id + 1)
}

/// Sort by `created_at` descending; ids break ties the same way
pub fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
