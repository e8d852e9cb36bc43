//! Debounced, batched filesystem watcher (spec §4.11).
//!
//! ```text
//! stopped → starting → watching
//!               ↑          │  event
//!               │          ▼
//!          indexed ←── debouncing ──(quiet period)──► batching ──► trigger ──► indexed
//!                                                                              │
//!                                                                              ▼
//!                                                                           watching
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use viberag_core::config::WatchConfig;
use viberag_core::ignore_engine::IgnoreEngine;

use crate::error::{Result, WatchError};
use crate::status::{WatchStatus, WatcherState};
use crate::trigger::IndexTrigger;

/// Never watched: they belong to the daemon, not the project tree.
const ALWAYS_EXCLUDED_DIRS: &[&str] = &[".viberag", ".git"];

struct Shared {
    state: Mutex<WatcherState>,
    pending: Mutex<BTreeSet<String>>,
    last_batch_at: Mutex<Option<chrono::DateTime<Utc>>>,
    last_trigger_error: Mutex<Option<String>>,
    paused_until: Mutex<Option<chrono::DateTime<Utc>>>,
    pause_reason: Mutex<Option<String>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(WatcherState::Stopped),
            pending: Mutex::new(BTreeSet::new()),
            last_batch_at: Mutex::new(None),
            last_trigger_error: Mutex::new(None),
            paused_until: Mutex::new(None),
            pause_reason: Mutex::new(None),
        }
    }

    fn is_paused(&self) -> bool {
        match *self.paused_until.lock() {
            Some(until) => Utc::now() < until,
            None => false,
        }
    }
}

/// Owns a live `notify` debouncer and the background task that turns its
/// events into reindex triggers. Dropping this stops the watch.
pub struct FileWatcher {
    project_root: PathBuf,
    config: WatchConfig,
    shared: Arc<Shared>,
    debouncer: Mutex<Option<Debouncer<notify::RecommendedWatcher, FileIdMap>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl FileWatcher {
    pub fn new(project_root: PathBuf, config: WatchConfig) -> Self {
        Self {
            project_root,
            config,
            shared: Arc::new(Shared::new()),
            debouncer: Mutex::new(None),
            task: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Begin watching `project_root`. `trigger` is called once per settled
    /// batch of changes with the set of changed relative paths.
    pub fn start(&self, trigger: Arc<dyn IndexTrigger>) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if !matches!(*state, WatcherState::Stopped) {
                return Err(WatchError::AlreadyRunning);
            }
            *state = WatcherState::Starting;
        }

        let (tx, rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();

        let debouncer = new_debouncer(
            Duration::from_millis(self.config.debounce_ms),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events.iter().flat_map(|e| e.paths.clone()).collect();
                    if !paths.is_empty() {
                        let _ = tx.send(paths);
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = ?e, "file watcher error");
                    }
                }
            },
        )
        .map_err(|source| WatchError::Start { path: self.project_root.display().to_string(), source })?;

        let mut debouncer = debouncer;
        debouncer
            .watch(&self.project_root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Start { path: self.project_root.display().to_string(), source })?;

        *self.debouncer.lock() = Some(debouncer);
        *self.shared.state.lock() = WatcherState::Watching;

        let batch_window = Duration::from_millis(self.config.batch_window_ms);
        let root = self.project_root.clone();
        let shared = self.shared.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(run_batch_loop(root, rx, batch_window, shared, trigger, shutdown));
        *self.task.lock() = Some(handle);

        info!(
            root = %self.project_root.display(),
            debounce_ms = self.config.debounce_ms,
            batch_window_ms = self.config.batch_window_ms,
            "file watcher started"
        );
        Ok(())
    }

    /// Stop watching. Waits for any in-flight batch to reach its next
    /// boundary before returning.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        *self.debouncer.lock() = None;

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        *self.shared.state.lock() = WatcherState::Stopped;
        info!("file watcher stopped");
    }

    pub fn pause(&self, until: chrono::DateTime<Utc>, reason: impl Into<String>) {
        *self.shared.paused_until.lock() = Some(until);
        *self.shared.pause_reason.lock() = Some(reason.into());
    }

    pub fn resume(&self) {
        *self.shared.paused_until.lock() = None;
        *self.shared.pause_reason.lock() = None;
    }

    pub fn status(&self) -> WatchStatus {
        WatchStatus {
            state: *self.shared.state.lock(),
            enabled: self.config.enabled,
            debounce_ms: self.config.debounce_ms,
            batch_window_ms: self.config.batch_window_ms,
            pending_paths: self.shared.pending.lock().len(),
            last_batch_at: *self.shared.last_batch_at.lock(),
            last_trigger_error: self.shared.last_trigger_error.lock().clone(),
            auto_index_paused_until: *self.shared.paused_until.lock(),
            auto_index_pause_reason: self.shared.pause_reason.lock().clone(),
        }
    }
}

async fn run_batch_loop(
    project_root: PathBuf,
    mut rx: mpsc::UnboundedReceiver<Vec<PathBuf>>,
    batch_window: Duration,
    shared: Arc<Shared>,
    trigger: Arc<dyn IndexTrigger>,
    shutdown: CancellationToken,
) {
    let mut ignore_engine = IgnoreEngine::load(&project_root);

    loop {
        let first_batch = tokio::select! {
            batch = rx.recv() => batch,
            _ = shutdown.cancelled() => return,
        };
        let Some(paths) = first_batch else { return };

        *shared.state.lock() = WatcherState::Debouncing;
        ingest(&project_root, &paths, &mut ignore_engine, &shared);

        *shared.state.lock() = WatcherState::Batching;
        loop {
            tokio::select! {
                more = tokio::time::timeout(batch_window, rx.recv()) => {
                    match more {
                        Ok(Some(paths)) => {
                            ingest(&project_root, &paths, &mut ignore_engine, &shared);
                            continue;
                        }
                        Ok(None) => return,
                        Err(_timeout) => break,
                    }
                }
                _ = shutdown.cancelled() => return,
            }
        }

        let pending: Vec<String> = shared.pending.lock().iter().cloned().collect();
        if pending.is_empty() {
            *shared.state.lock() = WatcherState::Watching;
            continue;
        }

        if shared.is_paused() {
            debug!(count = pending.len(), "auto-index paused, deferring batch");
            *shared.state.lock() = WatcherState::Watching;
            continue;
        }

        shared.pending.lock().clear();
        *shared.last_batch_at.lock() = Some(Utc::now());

        match trigger.trigger_indexing(pending.clone(), shutdown.child_token()).await {
            Ok(()) => {
                *shared.last_trigger_error.lock() = None;
                info!(files = pending.len(), "watch-triggered reindex complete");
            }
            Err(e) => {
                warn!(error = %e, "watch-triggered reindex failed");
                *shared.last_trigger_error.lock() = Some(e);
            }
        }

        *shared.state.lock() = WatcherState::Indexed;
        *shared.state.lock() = WatcherState::Watching;
    }
}

fn ingest(project_root: &Path, paths: &[PathBuf], ignore_engine: &mut IgnoreEngine, shared: &Arc<Shared>) {
    let mut gitignore_changed = false;

    for path in paths {
        let Ok(relative) = path.strip_prefix(project_root) else { continue };
        if relative.as_os_str() == ".gitignore" || relative.as_os_str() == ".viberagignore" {
            gitignore_changed = true;
        }
    }

    if gitignore_changed {
        ignore_engine.reload();
        debug!("ignore files changed, reloaded before processing batch");
    }

    let mut pending = shared.pending.lock();
    for path in paths {
        let Ok(relative) = path.strip_prefix(project_root) else { continue };
        if is_always_excluded(relative) {
            continue;
        }
        if ignore_engine.ignored(relative) {
            continue;
        }
        pending.insert(relative.to_string_lossy().replace('\\', "/"));
    }

    if gitignore_changed {
        pending.retain(|p| !ignore_engine.ignored(Path::new(p)));
    }
}

fn is_always_excluded(relative: &Path) -> bool {
    relative.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        ALWAYS_EXCLUDED_DIRS.iter().any(|excluded| s == *excluded)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingTrigger {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl IndexTrigger for CountingTrigger {
        async fn trigger_indexing(&self, _changed_paths: Vec<String>, _cancel: CancellationToken) -> std::result::Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_and_stop_round_trips_state() {
        let dir = TempDir::new().unwrap();
        let watcher = FileWatcher::new(dir.path().to_path_buf(), WatchConfig::default());
        let trigger = Arc::new(CountingTrigger { calls: AtomicUsize::new(0) });

        watcher.start(trigger).unwrap();
        assert_eq!(watcher.status().state, WatcherState::Watching);

        watcher.stop().await;
        assert_eq!(watcher.status().state, WatcherState::Stopped);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let watcher = FileWatcher::new(dir.path().to_path_buf(), WatchConfig::default());
        let trigger = Arc::new(CountingTrigger { calls: AtomicUsize::new(0) });

        watcher.start(trigger.clone()).unwrap();
        assert!(matches!(watcher.start(trigger).unwrap_err(), WatchError::AlreadyRunning));
        watcher.stop().await;
    }

    #[test]
    fn pause_and_resume_toggle_is_paused() {
        let shared = Shared::new();
        assert!(!shared.is_paused());

        *shared.paused_until.lock() = Some(Utc::now() + chrono::Duration::seconds(60));
        assert!(shared.is_paused());

        *shared.paused_until.lock() = Some(Utc::now() - chrono::Duration::seconds(60));
        assert!(!shared.is_paused());
    }

    #[test]
    fn always_excluded_dirs_are_recognized() {
        assert!(is_always_excluded(Path::new(".viberag/manifest.json")));
        assert!(is_always_excluded(Path::new(".git/HEAD")));
        assert!(!is_always_excluded(Path::new("src/main.rs")));
    }
}
