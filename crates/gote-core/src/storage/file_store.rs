//! Directory-backed encrypted note store.
//!
//! Layout of a data directory:
//!
//! ```text
//! <root>/<id>.json          active notes
//! <root>/trash/<id>.json    trashed notes, same envelope format
//! <root>/.gote_config.json  key derivation config
//! <root>/.gote_password     password hash
//! ```
//!
//! Locking discipline: `index` is a reader/writer lock only ever held for
//! in-memory work. Local writers additionally take `write_lock`, held
//! across encrypt, write and commit, so that for any id the last file
//! written is also the last index commit. Readers never touch
//! `write_lock`.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};

use super::traits::NoteStorage;
use super::types::{
    is_valid_note_id, note_file_name, note_id_from_path, sort_notes, EncryptedNote, LoadFailure,
    LoadFailureKind, LoadReport, Note,
};
use crate::codec;
use crate::crypto::random::random_note_id;
use crate::crypto::NoteKey;
use crate::error::{GoteError, Result};
use crate::fs::{rename_with_fallback, write_atomic};

/// Name of the trash subdirectory.
pub const TRASH_DIR_NAME: &str = "trash";

/// Id allocation gives up after this many consecutive collisions.
const MAX_ID_ATTEMPTS: usize = 32;

/// Result of offering an externally changed note to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalChange {
    /// The id was not indexed and has been added.
    Inserted,
    /// The external copy was strictly newer and replaced the indexed one.
    Replaced,
    /// The indexed copy is newer or equal; nothing changed.
    Stale,
    /// The active file was gone by commit time; the id is not indexed.
    Vanished,
    /// The session ended before the commit; nothing changed.
    Locked,
}

/// Encrypted note store over a single data directory.
pub struct FileStore {
    root: PathBuf,
    trash_dir: PathBuf,
    index: RwLock<BTreeMap<String, Note>>,
    key: RwLock<Option<Arc<NoteKey>>>,
    write_lock: Mutex<()>,
    self_writes: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory and its trash.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let trash_dir = root.join(TRASH_DIR_NAME);
        fs::create_dir_all(&trash_dir)?;

        Ok(Self {
            root,
            trash_dir,
            index: RwLock::new(BTreeMap::new()),
            key: RwLock::new(None),
            write_lock: Mutex::new(()),
            self_writes: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trash_dir(&self) -> &Path {
        &self.trash_dir
    }

    pub fn active_path(&self, id: &str) -> PathBuf {
        self.root.join(note_file_name(id))
    }

    pub fn trash_path(&self, id: &str) -> PathBuf {
        self.trash_dir.join(note_file_name(id))
    }

    /// The key retained by the last `load_notes`, if any.
    pub fn session_key(&self) -> Option<Arc<NoteKey>> {
        self.key.read().clone()
    }

    fn require_key(&self) -> Result<Arc<NoteKey>> {
        self.session_key().ok_or(GoteError::Locked)
    }

    /// Forget the retained key and drop every decrypted note from memory.
    pub fn clear_session(&self) {
        let _writer = self.write_lock.lock();
        *self.key.write() = None;
        self.index.write().clear();
        self.self_writes.lock().clear();
    }

    /// Number of indexed notes.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    // --- Envelope I/O ---

    /// Read and validate the envelope stored at `path` for `id`.
    pub fn read_envelope(path: &Path, id: &str) -> Result<EncryptedNote> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(GoteError::NotFound(id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let envelope: EncryptedNote = serde_json::from_slice(&raw)
            .map_err(|e| GoteError::corruption(id, format!("malformed envelope: {}", e)))?;
        if envelope.id != id {
            return Err(GoteError::corruption(
                id,
                format!("envelope id {} does not match filename", envelope.id),
            ));
        }
        if envelope.updated_at < envelope.created_at {
            return Err(GoteError::corruption(id, "updated_at precedes created_at"));
        }
        Ok(envelope)
    }

    fn write_envelope(path: &Path, envelope: &EncryptedNote) -> Result<()> {
        let contents = serde_json::to_vec_pretty(envelope)?;
        write_atomic(path, &contents)?;
        Ok(())
    }

    /// Read and decrypt a single note file.
    pub fn read_note(path: &Path, id: &str, key: &NoteKey) -> Result<Note> {
        let envelope = Self::read_envelope(path, id)?;
        codec::open(&envelope, key)
    }

    /// Note files directly inside `dir` as `(id, path)` pairs.
    fn note_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if let Some(id) = note_id_from_path(&path) {
                if path.is_file() {
                    files.push((id, path));
                }
            }
        }
        Ok(files)
    }

    /// Decrypt every note file in `dir`, collecting per-file failures.
    fn scan_dir(dir: &Path, key: &NoteKey) -> Result<(Vec<Note>, Vec<LoadFailure>)> {
        let mut notes = Vec::new();
        let mut failures = Vec::new();

        for (id, path) in Self::note_files(dir)? {
            match Self::read_note(&path, &id, key) {
                Ok(note) => notes.push(note),
                Err(err) => {
                    tracing::warn!(id = %id, path = %path.display(), error = %err, "skipping note file");
                    let kind = match err {
                        GoteError::Authentication => LoadFailureKind::Authentication,
                        GoteError::Corruption { .. } => LoadFailureKind::Corruption,
                        _ => LoadFailureKind::Io,
                    };
                    failures.push(LoadFailure {
                        id,
                        kind,
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok((notes, failures))
    }

    // --- Self-write suppression ---

    fn record_self_write(&self, id: &str, updated_at: DateTime<Utc>) {
        self.self_writes.lock().insert(id.to_string(), updated_at);
    }

    fn forget_self_write(&self, id: &str) {
        self.self_writes.lock().remove(id);
    }

    /// Whether a file with `updated_at` for `id` is the echo of our own write.
    ///
    /// The record is consumed on a match so a later external edit carrying
    /// the same id is not mistaken for an echo.
    pub fn take_self_write(&self, id: &str, updated_at: DateTime<Utc>) -> bool {
        let mut writes = self.self_writes.lock();
        match writes.get(id) {
            Some(recorded) if *recorded == updated_at => {
                writes.remove(id);
                true
            }
            _ => false,
        }
    }

    // --- Reconciler hooks ---

    /// Offer a note read from disk; applies last-write-wins by `updated_at`.
    ///
    /// Ties keep the indexed copy. The commit runs under the writer lock and
    /// re-checks that the active file still exists, so a note trashed or
    /// deleted after it was read is never put back in the index.
    pub fn apply_external(&self, note: Note) -> ExternalChange {
        let _writer = self.write_lock.lock();
        if self.key.read().is_none() {
            return ExternalChange::Locked;
        }
        if !self.active_path(&note.id).is_file() {
            self.index.write().remove(&note.id);
            return ExternalChange::Vanished;
        }

        let mut index = self.index.write();
        match index.get(&note.id) {
            Some(current) if current.updated_at >= note.updated_at => ExternalChange::Stale,
            Some(_) => {
                index.insert(note.id.clone(), note);
                ExternalChange::Replaced
            }
            None => {
                index.insert(note.id.clone(), note);
                ExternalChange::Inserted
            }
        }
    }

    /// Drop an id whose file disappeared. Returns whether it was removed.
    ///
    /// An id whose active file is back by commit time (a local restore, a
    /// re-created file) is kept.
    pub fn remove_external(&self, id: &str) -> bool {
        let _writer = self.write_lock.lock();
        if self.active_path(id).is_file() {
            return false;
        }
        self.index.write().remove(id).is_some()
    }

    // --- Id allocation ---

    fn id_in_use(&self, id: &str) -> bool {
        self.index.read().contains_key(id)
            || self.active_path(id).exists()
            || self.trash_path(id).exists()
    }

    /// Draw ids from `next_id` until one is free in the index, the active
    /// directory and the trash.
    fn allocate_id_with<F>(&self, mut next_id: F) -> Result<String>
    where
        F: FnMut() -> Result<String>,
    {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = next_id()?;
            if !is_valid_note_id(&candidate) {
                return Err(GoteError::Crypto(format!(
                    "Generated malformed note id {}",
                    candidate
                )));
            }
            if !self.id_in_use(&candidate) {
                return Ok(candidate);
            }
            tracing::debug!(id = %candidate, "note id collision; regenerating");
        }
        Err(GoteError::Crypto(
            "Could not allocate a unique note id".to_string(),
        ))
    }

    fn create_note_with<F>(&self, content: &str, key: &NoteKey, next_id: F) -> Result<Note>
    where
        F: FnMut() -> Result<String>,
    {
        let _writer = self.write_lock.lock();
        let id = self.allocate_id_with(next_id)?;
        let now = Utc::now();
        let note = Note {
            id: id.clone(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };

        let envelope = codec::seal(&note, key)?;
        self.record_self_write(&id, note.updated_at);
        if let Err(err) = Self::write_envelope(&self.active_path(&id), &envelope) {
            self.forget_self_write(&id);
            return Err(err);
        }

        self.index.write().insert(id.clone(), note.clone());
        tracing::debug!(id = %id, "created note");
        Ok(note)
    }

    // --- Maintenance ---

    /// Re-encrypt every active and trashed note from `old` to `new`.
    ///
    /// Files that already decrypt under `new` are left alone, so an
    /// interrupted pass can be run again. Every remaining file is decrypted
    /// before any file is written, so a wrong key or a damaged file aborts
    /// the pass with nothing changed. Timestamps are preserved. Returns the
    /// number of files rewritten.
    pub fn reencrypt_all(&self, old: &NoteKey, new: Arc<NoteKey>) -> Result<usize> {
        self.reencrypt_all_with(old, new, Self::write_envelope)
    }

    fn reencrypt_all_with<W>(
        &self,
        old: &NoteKey,
        new: Arc<NoteKey>,
        mut write: W,
    ) -> Result<usize>
    where
        W: FnMut(&Path, &EncryptedNote) -> Result<()>,
    {
        let _writer = self.write_lock.lock();

        let mut plan = Vec::new();
        for (dir, active) in [(&self.root, true), (&self.trash_dir, false)] {
            for (id, path) in Self::note_files(dir)? {
                let envelope = Self::read_envelope(&path, &id)?;
                match codec::open(&envelope, &new) {
                    Ok(_) => continue,
                    Err(GoteError::Authentication) => {}
                    Err(err) => return Err(err),
                }
                let note = codec::open(&envelope, old)?;
                plan.push((path, note, active));
            }
        }

        for (path, note, active) in &plan {
            let envelope = codec::seal(note, &new)?;
            // Trash is not watched, so only active rewrites produce echoes.
            if *active {
                self.record_self_write(&note.id, note.updated_at);
            }
            if let Err(err) = write(path, &envelope) {
                if *active {
                    self.forget_self_write(&note.id);
                }
                return Err(err);
            }
        }

        let mut key = self.key.write();
        if key.is_some() {
            *key = Some(new);
        }
        tracing::info!(count = plan.len(), "re-encrypted notes under new key");
        Ok(plan.len())
    }
}

/// Timestamp for a write following `previous`, never going backwards.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

impl NoteStorage for FileStore {
    fn load_notes(&self, key: Arc<NoteKey>) -> Result<LoadReport> {
        fs::create_dir_all(&self.trash_dir)?;
        *self.key.write() = Some(key);
        self.refresh_from_disk()
    }

    fn get_all_notes(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = self.index.read().values().cloned().collect();
        sort_notes(&mut notes);
        notes
    }

    fn get_note(&self, id: &str) -> Result<Note> {
        self.index
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| GoteError::NotFound(id.to_string()))
    }

    fn create_note(&self, content: &str, key: &NoteKey) -> Result<Note> {
        self.create_note_with(content, key, random_note_id)
    }

    fn update_note(&self, id: &str, content: &str, key: &NoteKey) -> Result<Note> {
        let _writer = self.write_lock.lock();
        let current = self.get_note(id)?;

        let note = Note {
            content: content.to_string(),
            updated_at: next_timestamp(current.updated_at),
            ..current
        };

        let envelope = codec::seal(&note, key)?;
        self.record_self_write(id, note.updated_at);
        if let Err(err) = Self::write_envelope(&self.active_path(id), &envelope) {
            self.forget_self_write(id);
            return Err(err);
        }

        self.index.write().insert(id.to_string(), note.clone());
        tracing::debug!(id = %id, "updated note");
        Ok(note)
    }

    fn delete_note(&self, id: &str) -> Result<()> {
        self.move_note_to_trash(id)
    }

    fn move_note_to_trash(&self, id: &str) -> Result<()> {
        let _writer = self.write_lock.lock();
        let source = self.active_path(id);
        if !source.is_file() {
            self.index.write().remove(id);
            return Err(GoteError::NotFound(id.to_string()));
        }

        fs::create_dir_all(&self.trash_dir)?;
        rename_with_fallback(&source, &self.trash_path(id))?;
        self.index.write().remove(id);
        self.forget_self_write(id);
        tracing::debug!(id = %id, "moved note to trash");
        Ok(())
    }

    fn restore_note_from_trash(&self, id: &str, key: &NoteKey) -> Result<Note> {
        let _writer = self.write_lock.lock();
        let source = self.trash_path(id);
        let note = Self::read_note(&source, id, key)?;

        let destination = self.active_path(id);
        if destination.exists() {
            return Err(GoteError::Validation(format!(
                "An active note with id {} already exists",
                id
            )));
        }

        self.record_self_write(id, note.updated_at);
        if let Err(err) = rename_with_fallback(&source, &destination) {
            self.forget_self_write(id);
            return Err(err.into());
        }
        self.index.write().insert(id.to_string(), note.clone());
        tracing::debug!(id = %id, "restored note from trash");
        Ok(note)
    }

    fn get_trashed_notes(&self, key: &NoteKey) -> Result<Vec<Note>> {
        let (mut notes, _failures) = Self::scan_dir(&self.trash_dir, key)?;
        sort_notes(&mut notes);
        Ok(notes)
    }

    fn permanently_delete_note(&self, id: &str) -> Result<()> {
        let _writer = self.write_lock.lock();
        match fs::remove_file(self.trash_path(id)) {
            Ok(()) => {
                tracing::debug!(id = %id, "permanently deleted note");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(GoteError::NotFound(id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn empty_trash(&self) -> Result<usize> {
        let _writer = self.write_lock.lock();
        let entries = match fs::read_dir(&self.trash_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if note_id_from_path(&path).is_some() && path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        tracing::info!(count = removed, "emptied trash");
        Ok(removed)
    }

    fn search_notes(&self, query: &str) -> Vec<Note> {
        let needle = query.to_lowercase();
        let mut notes: Vec<Note> = self
            .index
            .read()
            .values()
            .filter(|note| note.content.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        sort_notes(&mut notes);
        notes
    }

    fn refresh_from_disk(&self) -> Result<LoadReport> {
        let key = self.require_key()?;
        let _writer = self.write_lock.lock();

        let (notes, failures) = Self::scan_dir(&self.root, &key)?;
        let report = LoadReport {
            loaded: notes.len(),
            failures,
        };

        let fresh: BTreeMap<String, Note> =
            notes.into_iter().map(|note| (note.id.clone(), note)).collect();
        *self.index.write() = fresh;

        tracing::info!(
            loaded = report.loaded,
            failed = report.failures.len(),
            "loaded notes from disk"
        );
        Ok(report)
    }
}
