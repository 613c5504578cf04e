//! Reconciliation of external file changes into the note index.
//!
//! For one note id the reconciler looks at the file as it is *now*:
//!
//! - file missing: drop the id from the index
//! - file is the echo of our own write: skip
//! - file does not decrypt: log and skip (partial write, foreign file)
//! - file decrypts: last write wins on `updated_at`; ties keep memory
//!
//! Reading and decrypting happen without locks. The commit goes through
//! the store, which re-checks the file under its writer lock, so a local
//! trash, restore or rescan that lands in between always wins.

use std::path::Path;
use std::sync::Arc;

use crate::codec;
use crate::error::{GoteError, Result};
use crate::storage::types::note_id_from_path;
use crate::storage::{ExternalChange, FileStore, LoadReport, NoteStorage};

/// What reconciling a single id did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// New id added to the index.
    Inserted,
    /// External copy was newer and replaced memory.
    Replaced,
    /// Memory copy was newer or equal; external copy ignored.
    Stale,
    /// The file was produced by the store itself.
    Echo,
    /// File gone (possibly by commit time); id is not indexed.
    Removed,
    /// File gone and id was not indexed.
    Absent,
    /// File exists but could not be read or decrypted.
    Undecryptable,
    /// Path is not a note file.
    Ignored,
    /// No session key loaded.
    Locked,
}

/// Applies the reconcile state machine against a shared store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<FileStore>,
}

impl Reconciler {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    /// Reconcile whatever note `path` names; other paths are ignored.
    pub fn reconcile_path(&self, path: &Path) -> ReconcileOutcome {
        match note_id_from_path(path) {
            Some(id) => self.reconcile_id(&id),
            None => ReconcileOutcome::Ignored,
        }
    }

    /// Bring the index entry for `id` in line with its active file.
    pub fn reconcile_id(&self, id: &str) -> ReconcileOutcome {
        let path = self.store.active_path(id);
        if !path.exists() {
            return self.file_gone(id);
        }

        let Some(key) = self.store.session_key() else {
            return ReconcileOutcome::Locked;
        };

        let envelope = match FileStore::read_envelope(&path, id) {
            Ok(envelope) => envelope,
            Err(GoteError::NotFound(_)) => return self.file_gone(id),
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "ignoring unreadable note file");
                return ReconcileOutcome::Undecryptable;
            }
        };

        if self.store.take_self_write(id, envelope.updated_at) {
            tracing::debug!(id = %id, "skipping echo of local write");
            return ReconcileOutcome::Echo;
        }

        let note = match codec::open(&envelope, &key) {
            Ok(note) => note,
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "ignoring note file that does not decrypt");
                return ReconcileOutcome::Undecryptable;
            }
        };

        match self.store.apply_external(note) {
            ExternalChange::Inserted => {
                tracing::info!(id = %id, "indexed note created externally");
                ReconcileOutcome::Inserted
            }
            ExternalChange::Replaced => {
                tracing::info!(id = %id, "applied newer external edit");
                ReconcileOutcome::Replaced
            }
            ExternalChange::Stale => {
                tracing::debug!(id = %id, "external copy is not newer; keeping memory");
                ReconcileOutcome::Stale
            }
            ExternalChange::Vanished => {
                tracing::debug!(id = %id, "note file moved away before commit");
                ReconcileOutcome::Removed
            }
            ExternalChange::Locked => ReconcileOutcome::Locked,
        }
    }

    fn file_gone(&self, id: &str) -> ReconcileOutcome {
        if self.store.remove_external(id) {
            tracing::info!(id = %id, "note file removed externally");
            ReconcileOutcome::Removed
        } else {
            ReconcileOutcome::Absent
        }
    }

    /// Full rescan, used when events may have been lost.
    pub fn full_rescan(&self) -> Result<LoadReport> {
        self.store.refresh_from_disk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::{derive_legacy, derive_salted};
    use crate::crypto::NoteKey;
    use crate::storage::Note;
    use chrono::Duration;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TempDir, Reconciler, Arc<NoteKey>) {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let key = Arc::new(
            derive_salted("test-password", b"test-salt-1234567890123456", 1_000, 32).unwrap(),
        );
        store.load_notes(key.clone()).unwrap();
        (dir, Reconciler::new(store), key)
    }

    fn write_external(store: &FileStore, note: &Note, key: &NoteKey) {
        let envelope = codec::seal(note, key).unwrap();
        fs::write(
            store.active_path(&note.id),
            serde_json::to_vec_pretty(&envelope).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_own_write_is_echo() {
        let (_dir, reconciler, key) = setup();
        let note = reconciler.store().create_note("local", &key).unwrap();

        assert_eq!(reconciler.reconcile_id(&note.id), ReconcileOutcome::Echo);
        // The echo record is consumed; a second look is a plain tie.
        assert_eq!(reconciler.reconcile_id(&note.id), ReconcileOutcome::Stale);
    }

    #[test]
    fn test_older_external_copy_is_ignored() {
        let (_dir, reconciler, key) = setup();
        let store = reconciler.store();
        let note = store.create_note("local", &key).unwrap();
        store.take_self_write(&note.id, note.updated_at);

        let older = Note {
            content: "stale sync artifact".to_string(),
            created_at: note.created_at - Duration::seconds(1),
            updated_at: note.updated_at - Duration::seconds(1),
            ..note.clone()
        };
        write_external(store, &older, &key);

        assert_eq!(reconciler.reconcile_id(&note.id), ReconcileOutcome::Stale);
        assert_eq!(store.get_note(&note.id).unwrap().content, "local");
    }

    #[test]
    fn test_newer_external_copy_replaces_memory() {
        let (_dir, reconciler, key) = setup();
        let store = reconciler.store();
        let note = store.create_note("local", &key).unwrap();

        let newer = Note {
            content: "edited on another machine".to_string(),
            updated_at: note.updated_at + Duration::seconds(1),
            ..note.clone()
        };
        write_external(store, &newer, &key);

        assert_eq!(reconciler.reconcile_id(&note.id), ReconcileOutcome::Replaced);
        assert_eq!(store.get_note(&note.id).unwrap(), newer);
    }

    #[test]
    fn test_unknown_id_is_inserted() {
        let (_dir, reconciler, key) = setup();
        let store = reconciler.store();
        let now = chrono::Utc::now();
        let note = Note {
            id: "00c0ffee".to_string(),
            content: "synced in".to_string(),
            created_at: now,
            updated_at: now,
        };
        write_external(store, &note, &key);

        let path = store.active_path(&note.id);
        assert_eq!(reconciler.reconcile_path(&path), ReconcileOutcome::Inserted);
        assert_eq!(store.get_note("00c0ffee").unwrap(), note);
    }

    #[test]
    fn test_removed_file_drops_note() {
        let (_dir, reconciler, key) = setup();
        let store = reconciler.store();
        let note = store.create_note("doomed", &key).unwrap();

        fs::remove_file(store.active_path(&note.id)).unwrap();

        assert_eq!(reconciler.reconcile_id(&note.id), ReconcileOutcome::Removed);
        assert!(store.get_note(&note.id).is_err());
        assert_eq!(reconciler.reconcile_id(&note.id), ReconcileOutcome::Absent);
    }

    #[test]
    fn test_undecryptable_and_partial_files_are_ignored() {
        let (_dir, reconciler, _key) = setup();
        let store = reconciler.store();
        let now = chrono::Utc::now();
        let foreign = Note {
            id: "0000beef".to_string(),
            content: "other key".to_string(),
            created_at: now,
            updated_at: now,
        };
        write_external(store, &foreign, &derive_legacy("other-password").unwrap());
        fs::write(store.active_path("0000f00d"), b"{\"id\":\"0000f00d\",").unwrap();

        assert_eq!(reconciler.reconcile_id("0000beef"), ReconcileOutcome::Undecryptable);
        assert_eq!(reconciler.reconcile_id("0000f00d"), ReconcileOutcome::Undecryptable);
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_note_paths_are_ignored() {
        let (dir, reconciler, _key) = setup();
        assert_eq!(
            reconciler.reconcile_path(&dir.path().join(".gote_config.json")),
            ReconcileOutcome::Ignored
        );
        assert_eq!(
            reconciler.reconcile_path(&dir.path().join("trash")),
            ReconcileOutcome::Ignored
        );
    }

    #[test]
    fn test_locked_store_does_not_reconcile() {
        let (_dir, reconciler, key) = setup();
        let store = reconciler.store();
        let note = store.create_note("x", &key).unwrap();
        store.clear_session();

        assert_eq!(reconciler.reconcile_id(&note.id), ReconcileOutcome::Locked);
        assert!(matches!(reconciler.full_rescan(), Err(GoteError::Locked)));
    }

    #[test]
    fn test_reconcile_racing_trash_and_restore_keeps_index_in_step() {
        let (_dir, reconciler, key) = setup();
        let store = Arc::clone(reconciler.store());
        let note = store.create_note("contended", &key).unwrap();

        let local = {
            let store = Arc::clone(&store);
            let key = Arc::clone(&key);
            let id = note.id.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    store.move_note_to_trash(&id).unwrap();
                    store.restore_note_from_trash(&id, &key).unwrap();
                }
                store.move_note_to_trash(&id).unwrap();
            })
        };
        let watcher = {
            let reconciler = reconciler.clone();
            let id = note.id.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    reconciler.reconcile_id(&id);
                }
            })
        };
        local.join().unwrap();
        watcher.join().unwrap();

        assert!(!store.active_path(&note.id).exists());
        assert!(store.trash_path(&note.id).exists());
        assert!(store.get_note(&note.id).is_err());
    }
}
