use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::io::lock::DataLock;
use crate::model::task::{TaskPatch, TaskStatus};
use crate::ops::task_repo::TaskRepository;

/// Repository handle shared by the scheduler and its callers
pub type SharedRepository = Arc<Mutex<TaskRepository>>;

pub fn shared(repo: TaskRepository) -> SharedRepository {
    Arc::new(Mutex::new(repo))
}

/// Lock the shared repository. The repository is left consistent after every
/// statement, so a poisoned lock is still usable.
pub fn lock_repo(repo: &SharedRepository) -> MutexGuard<'_, TaskRepository> {
    repo.lock().unwrap_or_else(|e| e.into_inner())
}

/// What a completion request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionRequest {
    /// A commit is now armed for this task
    Armed,
    /// The task was already inside its grace period
    AlreadyCompleting,
    /// The task is already durably completed
    AlreadyCompleted,
    NotFound,
}

struct Inner {
    repo: SharedRepository,
    grace: Duration,
    lock_dir: Option<PathBuf>,
    in_flight: Mutex<HashMap<i64, JoinHandle<()>>>,
    idle: Notify,
}

/// Delays the durable `pending → completed` transition by a grace period.
///
/// While a task is inside the grace period its id is in the completing set
/// and its stored status is still `pending`. When the per-task timer fires the
/// scheduler writes `completed` through the repository and drops the id.
/// Timers run as independent tokio tasks holding their own handle to the
/// scheduler state, so they keep running when the handle that armed them is
/// dropped. Nothing is persisted: commits still in flight when the process
/// exits are lost and the task stays pending.
///
/// Built with [`CompletionScheduler::with_data_lock`], each commit holds the
/// data directory's [`DataLock`] for its write and waits while another writer
/// has it.
///
/// Arming a timer spawns onto the current tokio runtime.
#[derive(Clone)]
pub struct CompletionScheduler {
    inner: Arc<Inner>,
}

impl CompletionScheduler {
    pub fn new(repo: SharedRepository, grace: Duration) -> Self {
        Self::build(repo, grace, None)
    }

    /// A scheduler whose commits hold the data-directory lock in `dir`
    pub fn with_data_lock(repo: SharedRepository, grace: Duration, dir: &Path) -> Self {
        Self::build(repo, grace, Some(dir.to_path_buf()))
    }

    fn build(repo: SharedRepository, grace: Duration, lock_dir: Option<PathBuf>) -> Self {
        CompletionScheduler {
            inner: Arc::new(Inner {
                repo,
                grace,
                lock_dir,
                in_flight: Mutex::new(HashMap::new()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.inner.grace
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.inner.repo
    }

    /// Enter the completing state for a pending task and arm its commit
    pub fn request_completion(&self, id: i64) -> CompletionRequest {
        let status = lock_repo(&self.inner.repo).get(id).map(|t| t.status);
        match status {
            None => return CompletionRequest::NotFound,
            Some(TaskStatus::Completed) => return CompletionRequest::AlreadyCompleted,
            Some(TaskStatus::Pending) => {}
        }

        let mut in_flight = self.inner.in_flight();
        if in_flight.contains_key(&id) {
            return CompletionRequest::AlreadyCompleting;
        }

        let grace = self.inner.grace;
        let deadline = Instant::now() + grace;
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _guard = inner.writer_lock().await;
            inner.commit(id);
        });
        in_flight.insert(id, handle);
        debug!(id, grace_ms = grace.as_millis() as u64, "completion armed");
        CompletionRequest::Armed
    }

    /// Abort an in-flight completion. Returns false if `id` was not completing.
    pub fn cancel(&self, id: i64) -> bool {
        let removed = self.inner.in_flight().remove(&id);
        match removed {
            Some(handle) => {
                handle.abort();
                debug!(id, "completion cancelled");
                self.inner.idle.notify_waiters();
                true
            }
            None => false,
        }
    }

    pub fn is_completing(&self, id: i64) -> bool {
        self.inner.in_flight().contains_key(&id)
    }

    /// Snapshot of the completing set
    pub fn completing(&self) -> HashSet<i64> {
        self.inner.in_flight().keys().copied().collect()
    }

    /// Wait until every armed commit has fired or been cancelled
    pub async fn settle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight().is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<i64, JoinHandle<()>>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for the data-directory lock, if one is configured. A lock file
    /// that cannot be created is logged and the commit goes ahead unlocked.
    async fn writer_lock(&self) -> Option<DataLock> {
        let dir = self.lock_dir.as_deref()?;
        match DataLock::acquire_async(dir).await {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(error = %e, "committing without the data lock");
                None
            }
        }
    }

    /// Timer body. Holds the in-flight lock across the write so a concurrent
    /// cancel either wins outright or sees the commit already done.
    fn commit(&self, id: i64) {
        let mut in_flight = self.in_flight();
        if !in_flight.contains_key(&id) {
            return;
        }
        let result = lock_repo(&self.repo).update(id, &TaskPatch::status(TaskStatus::Completed));
        match result {
            Ok(Some(_)) => debug!(id, "completion committed"),
            Ok(None) => debug!(id, "completing task vanished before commit"),
            Err(e) => warn!(id, error = %e, "could not commit completion"),
        }
        in_flight.remove(&id);
        drop(in_flight);
        self.idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::{FileStore, Persistence};
    use crate::model::task::NewTask;
    use tempfile::TempDir;

    const GRACE: Duration = Duration::from_millis(5000);

    fn setup() -> (CompletionScheduler, Persistence, i64) {
        let p = Persistence::in_memory();
        let mut repo = TaskRepository::open(p.clone());
        let task = repo.create(1, NewTask::titled("Buy milk")).unwrap().unwrap();
        let scheduler = CompletionScheduler::new(shared(repo), GRACE);
        (scheduler, p, task.id)
    }

    fn stored_status(p: &Persistence, id: i64) -> TaskStatus {
        p.load_tasks().iter().find(|t| t.id == id).unwrap().status
    }

    #[tokio::test(start_paused = true)]
    async fn commit_waits_for_grace_period() {
        let (scheduler, p, id) = setup();
        assert_eq!(scheduler.request_completion(id), CompletionRequest::Armed);
        assert!(scheduler.is_completing(id));
        assert_eq!(stored_status(&p, id), TaskStatus::Pending);

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert!(scheduler.is_completing(id));
        assert_eq!(stored_status(&p, id), TaskStatus::Pending);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!scheduler.is_completing(id));
        assert_eq!(stored_status(&p, id), TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_request_does_not_rearm() {
        let (scheduler, p, id) = setup();
        scheduler.request_completion(id);
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(
            scheduler.request_completion(id),
            CompletionRequest::AlreadyCompleting
        );

        // Still fires on the first deadline
        tokio::time::sleep(Duration::from_millis(2001)).await;
        assert_eq!(stored_status(&p, id), TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_and_unknown_tasks_are_not_armed() {
        let (scheduler, _, id) = setup();
        lock_repo(scheduler.repository())
            .update(id, &TaskPatch::status(TaskStatus::Completed))
            .unwrap();
        assert_eq!(
            scheduler.request_completion(id),
            CompletionRequest::AlreadyCompleted
        );
        assert_eq!(scheduler.request_completion(999), CompletionRequest::NotFound);
        assert!(scheduler.completing().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_commit() {
        let (scheduler, p, id) = setup();
        scheduler.request_completion(id);
        tokio::time::sleep(Duration::from_millis(1000)).await;

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));

        tokio::time::sleep(GRACE).await;
        assert_eq!(stored_status(&p, id), TaskStatus::Pending);
        assert!(scheduler.completing().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timers_are_independent() {
        let (scheduler, p, first) = setup();
        let second = lock_repo(scheduler.repository())
            .create(1, NewTask::titled("Walk dog"))
            .unwrap()
            .unwrap()
            .id;

        scheduler.request_completion(first);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        scheduler.request_completion(second);
        assert_eq!(scheduler.completing(), HashSet::from([first, second]));

        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(stored_status(&p, first), TaskStatus::Completed);
        assert_eq!(stored_status(&p, second), TaskStatus::Pending);
        assert_eq!(scheduler.completing(), HashSet::from([second]));

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(stored_status(&p, second), TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn commit_survives_dropping_the_arming_handle() {
        let (scheduler, p, id) = setup();
        let view_handle = scheduler.clone();
        view_handle.request_completion(id);
        drop(view_handle);

        tokio::time::sleep(GRACE + Duration::from_millis(1)).await;
        assert_eq!(stored_status(&p, id), TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_returns_once_all_commits_land() {
        let (scheduler, p, id) = setup();
        scheduler.settle().await;

        scheduler.request_completion(id);
        scheduler.settle().await;
        assert_eq!(stored_status(&p, id), TaskStatus::Completed);
        assert!(scheduler.completing().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn commit_on_deleted_task_just_clears_the_id() {
        let (scheduler, p, id) = setup();
        scheduler.request_completion(id);
        lock_repo(scheduler.repository()).delete(id).unwrap();

        scheduler.settle().await;
        assert!(p.load_tasks().is_empty());
        assert!(!scheduler.is_completing(id));
    }

    #[cfg(unix)]
    #[tokio::test(start_paused = true)]
    async fn commit_waits_while_another_writer_holds_the_lock() {
        let tmp = TempDir::new().unwrap();
        let p = Persistence::new(Arc::new(FileStore::open(tmp.path()).unwrap()));
        let mut repo = TaskRepository::open(p.clone());
        let id = repo.create(1, NewTask::titled("Buy milk")).unwrap().unwrap().id;
        let scheduler = CompletionScheduler::with_data_lock(shared(repo), GRACE, tmp.path());

        scheduler.request_completion(id);
        let writer = DataLock::acquire_default(tmp.path()).unwrap();
        tokio::time::sleep(GRACE * 2).await;
        assert_eq!(stored_status(&p, id), TaskStatus::Pending);
        assert!(scheduler.is_completing(id));

        drop(writer);
        scheduler.settle().await;
        assert_eq!(stored_status(&p, id), TaskStatus::Completed);
        assert!(!scheduler.is_completing(id));
    }
}
