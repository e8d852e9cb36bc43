//! Single-instance advisory lock (spec §4.13).
//!
//! Acquired once at startup with `retries = 0` (fail fast if held). While
//! held, a background task refreshes the lock file's mtime every
//! `REFRESH_INTERVAL` so a second daemon can tell a live holder from a
//! crashed one that left the file behind: anything older than
//! `STALE_TTL` is considered abandoned and may be taken over.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DaemonError, Result};

const STALE_TTL: Duration = Duration::from_secs(30);
const REFRESH_INTERVAL: Duration = Duration::from_secs(10);

pub struct SingleInstanceLock {
    path: PathBuf,
    file: Option<File>,
    refresh_task: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl SingleInstanceLock {
    /// Acquire the lock at `path`, failing fast (no retry loop) if another
    /// live daemon already holds it. A stale lock (mtime older than
    /// `STALE_TTL`, meaning its refresher is gone) is taken over instead
    /// of treated as held.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).write(true).open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(_) => {
                if is_stale(path) {
                    warn!(path = %path.display(), "lock file is stale, taking over");
                    file.try_lock_exclusive().map_err(|_| DaemonError::AlreadyRunning)?;
                } else {
                    return Err(DaemonError::AlreadyRunning);
                }
            }
        }

        touch(&file);

        let shutdown = CancellationToken::new();
        let refresh_task = spawn_refresher(path.to_path_buf(), shutdown.clone());

        Ok(Self { path: path.to_path_buf(), file: Some(file), refresh_task: Some(refresh_task), shutdown })
    }

    /// Release the lock and remove the file. Called once, on graceful
    /// shutdown or process exit.
    pub async fn release(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.refresh_task.take() {
            let _ = task.await;
        }
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

fn spawn_refresher(path: PathBuf, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(REFRESH_INTERVAL) => {
                    if let Ok(file) = OpenOptions::new().write(true).open(&path) {
                        touch(&file);
                        debug!(path = %path.display(), "lock liveness refreshed");
                    }
                }
                _ = shutdown.cancelled() => return,
            }
        }
    })
}

fn touch(file: &File) {
    let _ = file.set_modified(std::time::SystemTime::now());
}

fn is_stale(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else { return true };
    let Ok(modified) = metadata.modified() else { return true };
    modified.elapsed().map(|age| age > STALE_TTL).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn acquire_and_release_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.lock");
        let lock = SingleInstanceLock::acquire(&path).unwrap();
        assert!(path.exists());
        lock.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn second_acquire_fails_while_first_is_live() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.lock");
        let first = SingleInstanceLock::acquire(&path).unwrap();
        assert!(matches!(SingleInstanceLock::acquire(&path), Err(DaemonError::AlreadyRunning)));
        first.release().await;
    }
}
