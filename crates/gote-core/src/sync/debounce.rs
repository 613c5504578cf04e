//! Per-id coalescing window for watcher events.
//!
//! Each raw event restarts its id's quiet period. An id becomes due once no
//! event for it has arrived for a full window; a burst therefore collapses
//! into one reconcile that runs after the burst has ended.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Record an event for `id` observed at `now`.
    pub fn push(&mut self, id: String, now: Instant) {
        self.pending.insert(id, now);
    }

    /// Remove and return ids that have been quiet for a full window,
    /// sorted so processing order is deterministic.
    pub fn take_due(&mut self, now: Instant) -> Vec<String> {
        let window = self.window;
        let mut due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, last_seen)| now.saturating_duration_since(**last_seen) >= window)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due {
            self.pending.remove(id);
        }
        due.sort();
        due
    }

    /// Remove and return every pending id regardless of age.
    pub fn drain(&mut self) -> Vec<String> {
        let mut all: Vec<String> = self.pending.drain().map(|(id, _)| id).collect();
        all.sort();
        all
    }

    /// Earliest instant at which some pending id becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().map(|last_seen| *last_seen + self.window)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
