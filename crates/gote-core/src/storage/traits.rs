//! Note storage trait definition.
//!
//! `NoteStorage` is the contract the service facade programs against. The
//! disk is the source of truth; implementations keep an in-memory index as
//! a cache of decrypted notes.

use std::sync::Arc;

use super::types::{LoadReport, Note};
use crate::crypto::NoteKey;
use crate::error::Result;

/// Encrypted note storage.
///
/// All implementations must ensure:
/// - Content is encrypted at rest; timestamps are not
/// - Index reads can run concurrently; writers are exclusive
/// - No index lock is held across disk I/O
/// - An id lives in at most one of the active set and the trash
pub trait NoteStorage: Send + Sync {
    /// Scan the notes directory and rebuild the index with `key`.
    ///
    /// Files that fail to decrypt are skipped and listed in the report.
    /// The key is retained for later refreshes and watcher events.
    fn load_notes(&self, key: Arc<NoteKey>) -> Result<LoadReport>;

    /// All active notes, newest first.
    fn get_all_notes(&self) -> Vec<Note>;

    /// A single active note.
    ///
    /// # Errors
    ///
    /// Returns `GoteError::NotFound` if the id is not indexed.
    fn get_note(&self, id: &str) -> Result<Note>;

    /// Create a note with a fresh unique id.
    fn create_note(&self, content: &str, key: &NoteKey) -> Result<Note>;

    /// Replace a note's content and bump `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `GoteError::NotFound` if the id is not indexed.
    fn update_note(&self, id: &str, content: &str, key: &NoteKey) -> Result<Note>;

    /// Soft-delete: same as [`NoteStorage::move_note_to_trash`].
    fn delete_note(&self, id: &str) -> Result<()>;

    /// Move the note file into the trash and drop it from the index.
    fn move_note_to_trash(&self, id: &str) -> Result<()>;

    /// Move a trashed note back and re-index it.
    fn restore_note_from_trash(&self, id: &str, key: &NoteKey) -> Result<Note>;

    /// Decrypt and list trashed notes, newest first.
    fn get_trashed_notes(&self, key: &NoteKey) -> Result<Vec<Note>>;

    /// Irreversibly remove a trashed note.
    fn permanently_delete_note(&self, id: &str) -> Result<()>;

    /// Irreversibly remove every trashed note, returning how many.
    fn empty_trash(&self) -> Result<usize>;

    /// Case-insensitive substring search over indexed content.
    ///
    /// Never touches the disk. An empty query matches every note.
    fn search_notes(&self, query: &str) -> Vec<Note>;

    /// Re-scan the directory with the retained key and reconcile the index.
    ///
    /// # Errors
    ///
    /// Returns `GoteError::Locked` if no key has been loaded.
    fn refresh_from_disk(&self) -> Result<LoadReport>;
}
