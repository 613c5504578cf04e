//! Directory watcher and reconcile worker.
//!
//! The `notify` callback only classifies paths and pushes note ids into a
//! bounded queue; it never touches the index. One worker thread drains the
//! queue, debounces per id and hands due ids to the [`Reconciler`]. If the
//! queue overflows or the backend reports an error, events may have been
//! lost, so the worker falls back to a full rescan.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::debounce::Debouncer;
use super::reconciler::Reconciler;
use super::SyncSettings;
use crate::error::{GoteError, Result};
use crate::storage::types::note_id_from_path;

/// Longest the worker sleeps before re-checking its stop flag.
const IDLE_TICK: Duration = Duration::from_millis(200);

/// A running watcher. Dropping it stops the worker thread.
pub struct SyncWatcher {
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl SyncWatcher {
    /// Start watching the store's root directory (non-recursive).
    ///
    /// # Errors
    ///
    /// Returns `GoteError::FileSystem` if the platform watch API cannot be
    /// initialised. Callers treat that as "watching disabled".
    pub fn start(reconciler: Reconciler, settings: SyncSettings) -> Result<Self> {
        let root = reconciler.store().root().to_path_buf();
        let (tx, rx) = mpsc::sync_channel::<String>(settings.queue_capacity.max(1));
        let overflow = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let callback_overflow = Arc::clone(&overflow);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        return;
                    }
                    for path in &event.paths {
                        let Some(id) = note_id_from_path(path) else {
                            continue;
                        };
                        enqueue(&tx, &callback_overflow, id);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "watcher backend error; scheduling rescan");
                    callback_overflow.store(true, Ordering::SeqCst);
                }
            },
            notify::Config::default(),
        )
        .map_err(watch_error)?;
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        let worker_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("gote-sync".to_string())
            .spawn(move || run_worker(rx, reconciler, overflow, worker_stop, settings.debounce))?;

        tracing::info!(path = %root.display(), "watching notes directory");
        Ok(Self {
            watcher: Some(watcher),
            worker: Some(worker),
            stop,
        })
    }

    /// Stop watching and wait for the worker to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        drop(self.watcher.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("sync worker panicked");
            }
        }
    }
}

impl Drop for SyncWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_error(err: notify::Error) -> GoteError {
    GoteError::FileSystem {
        source: io::Error::new(io::ErrorKind::Other, format!("watcher unavailable: {}", err)),
    }
}

/// Queue `id` for the worker; a full queue flags the overflow instead.
fn enqueue(tx: &SyncSender<String>, overflow: &AtomicBool, id: String) {
    match tx.try_send(id) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => overflow.store(true, Ordering::SeqCst),
    }
}

/// If events were lost, drop pending ids and rescan the whole directory.
///
/// Returns whether a rescan ran.
fn rescan_if_overflowed(
    reconciler: &Reconciler,
    debouncer: &mut Debouncer,
    overflow: &AtomicBool,
) -> bool {
    if !overflow.swap(false, Ordering::SeqCst) {
        return false;
    }
    debouncer.drain();
    match reconciler.full_rescan() {
        Ok(report) => tracing::info!(
            loaded = report.loaded,
            failed = report.failures.len(),
            "rescanned notes after lost watcher events"
        ),
        Err(err) => tracing::error!(error = %err, "rescan after lost events failed"),
    }
    true
}

/// Create, modify (content or rename) and remove events matter; access
/// events do not.
fn is_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

fn run_worker(
    rx: mpsc::Receiver<String>,
    reconciler: Reconciler,
    overflow: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    window: Duration,
) {
    let mut debouncer = Debouncer::new(window);

    while !stop.load(Ordering::SeqCst) {
        let timeout = debouncer
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_TICK)
            .min(IDLE_TICK);

        match rx.recv_timeout(timeout) {
            Ok(id) => debouncer.push(id, Instant::now()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        // Pick up everything already queued before deciding what is due.
        while let Ok(id) = rx.try_recv() {
            debouncer.push(id, Instant::now());
        }

        if rescan_if_overflowed(&reconciler, &mut debouncer, &overflow) {
            continue;
        }

        for id in debouncer.take_due(Instant::now()) {
            let outcome = reconciler.reconcile_id(&id);
            tracing::debug!(id = %id, outcome = ?outcome, "reconciled watcher event");
        }
    }
}
