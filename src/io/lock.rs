use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_FILE: &str = ".lock";
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive advisory lock on a data directory.
///
/// Every writer (CLI write commands and delayed completion commits) holds it
/// around its read-modify-write of the records. The lock is the `flock` on
/// `<data_dir>/.lock` and is released when the handle closes. The file itself
/// is never removed, so every opener contends on the same inode.
/// Unix only; elsewhere acquiring always succeeds.
pub struct DataLock {
    _file: File,
}

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not acquire lock on {path}: another td process is writing")]
    Timeout { path: PathBuf },
}

impl DataLock {
    /// Take the lock if nobody holds it, without waiting
    pub fn try_acquire(data_dir: &Path) -> Result<Option<Self>, LockError> {
        let file = open_lock_file(data_dir)?;
        Ok(try_flock(&file).then_some(DataLock { _file: file }))
    }

    /// Acquire the lock, polling until `timeout` runs out
    pub fn acquire(data_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let file = open_lock_file(data_dir)?;
        let start = Instant::now();
        while !try_flock(&file) {
            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: data_dir.join(LOCK_FILE),
                });
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
        Ok(DataLock { _file: file })
    }

    /// Acquire with the default timeout (5 seconds)
    pub fn acquire_default(data_dir: &Path) -> Result<Self, LockError> {
        Self::acquire(data_dir, Duration::from_secs(5))
    }

    /// Acquire from async code, yielding to the runtime between attempts.
    /// Waits for as long as the lock is held elsewhere.
    pub async fn acquire_async(data_dir: &Path) -> Result<Self, LockError> {
        let file = open_lock_file(data_dir)?;
        while !try_flock(&file) {
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
        Ok(DataLock { _file: file })
    }
}

fn open_lock_file(data_dir: &Path) -> Result<File, LockError> {
    let path = data_dir.join(LOCK_FILE);
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|source| LockError::CreateError { path, source })
}

#[cfg(unix)]
fn try_flock(file: &File) -> bool {
    use std::os::unix::io::AsRawFd;
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

#[cfg(not(unix))]
fn try_flock(_file: &File) -> bool {
    true
}
