//! Keeping the note index consistent with external edits.
//!
//! - **debounce**: per-id coalescing of raw watcher events
//! - **reconciler**: last-write-wins state machine for a single id
//! - **watcher**: directory watcher feeding one worker thread

pub mod debounce;
pub mod reconciler;
pub mod watcher;

use std::time::Duration;

pub use debounce::Debouncer;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use watcher::SyncWatcher;

/// Default quiet period before a burst of events for one id is applied.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Default capacity of the watcher event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Tuning for the watcher worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub debounce: Duration,
    pub queue_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
