//! Auto-spawn logic (spec §4.14): if the daemon isn't reachable, either
//! wait for one that's already starting, or launch a fresh one detached.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use viberag_core::paths::PathResolver;

/// Mirrors `viberag-daemon`'s lock staleness window: a lock file whose
/// mtime is younger than this is still being refreshed by a live process.
const LOCK_STALE_TTL: Duration = Duration::from_secs(30);
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn ensure_daemon_running(paths: &PathResolver, socket_path: &Path, timeout: Duration) -> Result<()> {
    if can_connect(socket_path).await {
        return Ok(());
    }

    if lock_looks_live(&paths.lock_path()) {
        debug!("daemon appears to be starting (live lock held), waiting for socket");
        return wait_for_socket(socket_path, timeout).await;
    }

    cleanup_stale_runtime_files(paths);
    spawn_detached(paths)?;
    wait_for_socket(socket_path, timeout).await
}

async fn can_connect(socket_path: &Path) -> bool {
    UnixStream::connect(socket_path).await.is_ok()
}

fn lock_looks_live(lock_path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(lock_path) else { return false };
    let Ok(modified) = metadata.modified() else { return false };
    modified.elapsed().map(|age| age <= LOCK_STALE_TTL).unwrap_or(false)
}

/// If the pid file names a process that's no longer alive, the socket and
/// pid files it left behind are stale; remove them so the new daemon binds
/// cleanly instead of finding a dead socket in the way.
fn cleanup_stale_runtime_files(paths: &PathResolver) {
    let pid_path = paths.pid_path();
    let Ok(contents) = std::fs::read_to_string(&pid_path) else { return };
    let Ok(pid) = contents.trim().parse::<i32>() else { return };

    if process_is_alive(pid) {
        return;
    }

    info!(pid, "recorded daemon pid is dead, cleaning up stale runtime files");
    let _ = std::fs::remove_file(&pid_path);
    if let viberag_core::paths::SocketAddr::Unix(socket) = paths.socket_path() {
        let _ = std::fs::remove_file(socket);
    }
    let _ = std::fs::remove_file(paths.lock_path());
}

#[cfg(unix)]
fn process_is_alive(pid: i32) -> bool {
    // Signal 0 performs no actual signal delivery, only existence/permission
    // checks (kill(2)).
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: i32) -> bool {
    true
}

fn spawn_detached(paths: &PathResolver) -> Result<()> {
    let binary = daemon_binary_path();
    info!(binary = %binary.display(), root = %paths.project_root().display(), "auto-spawning viberag-daemon");

    std::process::Command::new(&binary)
        .arg("--root")
        .arg(paths.project_root())
        .arg("--home")
        .arg(paths.home_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ClientError::SpawnFailed(format!("failed to spawn {}: {}", binary.display(), e)))?;
    Ok(())
}

/// Resolves the daemon binary: alongside this executable if present (the
/// common case for an installed toolchain), else relies on `$PATH`.
fn daemon_binary_path() -> PathBuf {
    let name = if cfg!(windows) { "viberag-daemon.exe" } else { "viberag-daemon" };
    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let candidate = dir.join(name);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    PathBuf::from(name)
}

async fn wait_for_socket(socket_path: &Path, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if can_connect(socket_path).await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ClientError::SpawnTimeout(timeout));
        }
        tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
    }
}
