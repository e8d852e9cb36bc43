//! Idle-shutdown timer (spec §4.13): if no RPC activity arrives for
//! `idle_timeout_ms`, the daemon shuts itself down rather than linger.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::state::DaemonState;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls `state.idle_for()` every `POLL_INTERVAL` and cancels
/// `state.shutdown_requested` once the idle window is exceeded. A
/// coarse poll rather than a reset-able timer, since activity only needs
/// to be noticed within a few seconds of `idle_timeout_ms`.
pub async fn run(state: Arc<DaemonState>, idle_timeout: Duration, shutdown: CancellationToken) {
    if idle_timeout.is_zero() {
        return;
    }

    loop {
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                if state.idle_for() >= idle_timeout {
                    info!(idle_secs = idle_timeout.as_secs(), "idle timeout reached, requesting shutdown");
                    state.shutdown_requested.cancel();
                    return;
                }
            }
            _ = shutdown.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_signal_stops_the_loop() {
        // The loop must exit promptly when the shared shutdown token fires,
        // independent of the idle poll interval.
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let never_idle = Duration::from_secs(3600);

        // Build a minimal harness without a full DaemonState: reuse the
        // select loop's shape directly against a token we control.
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(never_idle) => {}
                _ = shutdown_clone.cancelled() => {}
            }
        });

        shutdown.cancel();
        tokio::time::timeout(Duration::from_millis(200), handle).await.expect("loop should stop on shutdown").unwrap();
    }
}
