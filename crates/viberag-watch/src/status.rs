//! The `watchStatus` RPC snapshot (spec §4.11, §4.12).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Stopped,
    Starting,
    Watching,
    Debouncing,
    Batching,
    Indexed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchStatus {
    pub state: WatcherState,
    pub enabled: bool,
    pub debounce_ms: u64,
    pub batch_window_ms: u64,
    pub pending_paths: usize,
    pub last_batch_at: Option<DateTime<Utc>>,
    pub last_trigger_error: Option<String>,
    pub auto_index_paused_until: Option<DateTime<Utc>>,
    pub auto_index_pause_reason: Option<String>,
}
