//! viberag-watch: converts filesystem events into debounced, batched
//! reindex triggers (spec §4.11).

pub mod error;
pub mod status;
pub mod trigger;
pub mod watcher;

pub use error::{Result, WatchError};
pub use status::{WatchStatus, WatcherState};
pub use trigger::IndexTrigger;
pub use watcher::FileWatcher;
