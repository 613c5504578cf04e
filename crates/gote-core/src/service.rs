//! Service facade: the only surface the UI/IPC layer calls.
//!
//! The facade validates input, forwards to the store and maps core errors
//! to [`ServiceError`], which carries a stable code and a user hint. It
//! also owns the optional directory watcher.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::GoteConfig;
use crate::crypto::NoteKey;
use crate::error::GoteError;
use crate::storage::{is_valid_note_id, FileStore, LoadReport, Note, NoteStorage};
use crate::sync::{Reconciler, SyncSettings, SyncWatcher};

/// Result type alias for facade calls.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// User-facing error returned by [`NoteService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Note not found: {0}")]
    NotFound(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Note file {id} is corrupted: {reason}")]
    Corrupted { id: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Notes are locked")]
    Locked,
}

impl ServiceError {
    /// Stable machine-readable code for the IPC layer.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::InvalidPassword => "INVALID_PASSWORD",
            ServiceError::Corrupted { .. } => "CORRUPTED",
            ServiceError::Storage(_) => "FILESYSTEM",
            ServiceError::Crypto(_) => "CRYPTO",
            ServiceError::Locked => "LOCKED",
        }
    }

    /// What the user should do next, if there is anything useful to say.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ServiceError::InvalidPassword => Some("Re-enter your password and try again."),
            ServiceError::Corrupted { .. } => {
                Some("Inspect the file or restore it from a backup; other notes are unaffected.")
            }
            ServiceError::Locked => Some("Log in to load your notes first."),
            _ => None,
        }
    }
}

impl From<GoteError> for ServiceError {
    fn from(err: GoteError) -> Self {
        match err {
            GoteError::Validation(message) => ServiceError::Validation(message),
            GoteError::NotFound(id) => ServiceError::NotFound(id),
            GoteError::Authentication => ServiceError::InvalidPassword,
            GoteError::Corruption { id, reason } => ServiceError::Corrupted { id, reason },
            GoteError::FileSystem { source } => ServiceError::Storage(source.to_string()),
            GoteError::Json { source } => ServiceError::Storage(source.to_string()),
            GoteError::Config(message) => ServiceError::Storage(message),
            GoteError::Crypto(message) => ServiceError::Crypto(message),
            GoteError::Locked => ServiceError::Locked,
        }
    }
}

/// Whether external changes are being followed automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStatus {
    Active,
    /// Watching is off; `sync_from_disk` still works.
    Disabled(String),
}

fn validate_id(id: &str) -> ServiceResult<()> {
    if id.trim().is_empty() {
        return Err(ServiceError::Validation("Note id is required".to_string()));
    }
    if !is_valid_note_id(id) {
        return Err(ServiceError::Validation(format!("Invalid note id: {}", id)));
    }
    Ok(())
}

pub struct NoteService {
    store: Arc<FileStore>,
    settings: SyncSettings,
    watch_enabled: bool,
    watcher: Mutex<Option<SyncWatcher>>,
}

impl NoteService {
    pub fn new(store: Arc<FileStore>, settings: SyncSettings) -> Self {
        Self {
            store,
            settings,
            watch_enabled: true,
            watcher: Mutex::new(None),
        }
    }

    /// Open the store at `data_dir`.
    pub fn open(data_dir: &Path, settings: SyncSettings) -> ServiceResult<Self> {
        let store = FileStore::open(data_dir)?;
        Ok(Self::new(Arc::new(store), settings))
    }

    /// Open the store described by an application config.
    pub fn from_config(config: &GoteConfig) -> ServiceResult<Self> {
        let mut service = Self::open(&config.data_dir()?, config.sync.settings())?;
        service.watch_enabled = config.sync.watch;
        Ok(service)
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    pub fn load_notes(&self, key: Arc<NoteKey>) -> ServiceResult<LoadReport> {
        let report = self.store.load_notes(key)?;
        if report.all_failed_authentication() {
            tracing::warn!(
                failed = report.failures.len(),
                "no note decrypted; the key is probably wrong"
            );
        }
        Ok(report)
    }

    pub fn get_all_notes(&self) -> Vec<Note> {
        self.store.get_all_notes()
    }

    pub fn get_note(&self, id: &str) -> ServiceResult<Note> {
        validate_id(id)?;
        Ok(self.store.get_note(id)?)
    }

    pub fn create_note(&self, content: &str, key: &NoteKey) -> ServiceResult<Note> {
        Ok(self.store.create_note(content, key)?)
    }

    pub fn update_note(&self, id: &str, content: &str, key: &NoteKey) -> ServiceResult<Note> {
        validate_id(id)?;
        Ok(self.store.update_note(id, content, key)?)
    }

    pub fn delete_note(&self, id: &str) -> ServiceResult<()> {
        validate_id(id)?;
        Ok(self.store.delete_note(id)?)
    }

    pub fn move_note_to_trash(&self, id: &str) -> ServiceResult<()> {
        validate_id(id)?;
        Ok(self.store.move_note_to_trash(id)?)
    }

    pub fn restore_note_from_trash(&self, id: &str, key: &NoteKey) -> ServiceResult<Note> {
        validate_id(id)?;
        Ok(self.store.restore_note_from_trash(id, key)?)
    }

    pub fn get_trashed_notes(&self, key: &NoteKey) -> ServiceResult<Vec<Note>> {
        Ok(self.store.get_trashed_notes(key)?)
    }

    pub fn permanently_delete_note(&self, id: &str) -> ServiceResult<()> {
        validate_id(id)?;
        Ok(self.store.permanently_delete_note(id)?)
    }

    pub fn empty_trash(&self) -> ServiceResult<usize> {
        Ok(self.store.empty_trash()?)
    }

    pub fn search_notes(&self, query: &str) -> Vec<Note> {
        self.store.search_notes(query)
    }

    /// Manual sync: re-read the directory and reconcile. Safe to repeat.
    pub fn sync_from_disk(&self) -> ServiceResult<LoadReport> {
        Ok(self.store.refresh_from_disk()?)
    }

    /// Start following external changes.
    ///
    /// Never fails: if the platform watcher is unavailable the reason is
    /// logged and returned as [`WatchStatus::Disabled`].
    pub fn start_watching(&self) -> WatchStatus {
        if !self.watch_enabled {
            return WatchStatus::Disabled("watching is disabled in the configuration".to_string());
        }

        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            return WatchStatus::Active;
        }

        let reconciler = Reconciler::new(Arc::clone(&self.store));
        match SyncWatcher::start(reconciler, self.settings) {
            Ok(started) => {
                *watcher = Some(started);
                WatchStatus::Active
            }
            Err(err) => {
                tracing::warn!(error = %err, "file watching disabled; use manual sync");
                WatchStatus::Disabled(err.to_string())
            }
        }
    }

    pub fn stop_watching(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Stop watching and drop the key and every decrypted note from memory.
    pub fn logout(&self) {
        self.stop_watching();
        self.store.clear_session();
    }
}

impl Drop for NoteService {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::crypto::kdf::derive_salted;
    use tempfile::{tempdir, TempDir};

    fn service() -> (TempDir, NoteService, Arc<NoteKey>) {
        let dir = tempdir().unwrap();
        let service = NoteService::open(dir.path(), SyncSettings::default()).unwrap();
        let key = Arc::new(
            derive_salted("test-password", b"test-salt-1234567890123456", 1_000, 32).unwrap(),
        );
        service.load_notes(key.clone()).unwrap();
        (dir, service, key)
    }

    #[test]
    fn test_invalid_ids_are_validation_errors() {
        let (_dir, service, key) = service();

        for bad in ["", "   ", "XYZ", "../../etc/passwd", "DEADBEEF"] {
            let err = service.get_note(bad).unwrap_err();
            assert_eq!(err.code(), "VALIDATION", "{:?}", bad);
            assert!(service.update_note(bad, "x", &key).is_err());
            assert!(service.permanently_delete_note(bad).is_err());
        }
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (_dir, service, _key) = service();
        let err = service.get_note("0a1b2c3d").unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_password_and_corruption_messages_differ() {
        let auth: ServiceError = GoteError::Authentication.into();
        let corrupt: ServiceError = GoteError::Corruption {
            id: "0a1b2c3d".to_string(),
            reason: "malformed envelope".to_string(),
        }
        .into();

        assert_eq!(auth.to_string(), "Invalid password");
        assert_eq!(auth.code(), "INVALID_PASSWORD");
        assert!(auth.hint().unwrap().contains("password"));
        assert_eq!(corrupt.code(), "CORRUPTED");
        assert!(corrupt.hint().unwrap().contains("backup"));
    }

    #[test]
    fn test_facade_round_trip() {
        let (_dir, service, key) = service();

        let note = service.create_note("Hello", &key).unwrap();
        let updated = service.update_note(&note.id, "Hello World", &key).unwrap();
        assert_eq!(service.get_all_notes(), vec![updated.clone()]);
        assert_eq!(service.search_notes(" WORLD"), vec![updated]);

        service.move_note_to_trash(&note.id).unwrap();
        assert_eq!(service.get_trashed_notes(&key).unwrap().len(), 1);
        service.restore_note_from_trash(&note.id, &key).unwrap();
        service.delete_note(&note.id).unwrap();
        assert_eq!(service.empty_trash().unwrap(), 1);
        assert!(service.get_all_notes().is_empty());
    }

    #[test]
    fn test_search_keeps_query_whitespace() {
        let (_dir, service, key) = service();
        let joined = service.create_note("helloworld", &key).unwrap();

        assert!(service.search_notes(" world").is_empty());
        assert_eq!(service.search_notes("world"), vec![joined]);
    }

    #[test]
    fn test_sync_is_idempotent() {
        let (_dir, service, key) = service();
        service.create_note("one", &key).unwrap();

        let first = service.sync_from_disk().unwrap();
        let notes = service.get_all_notes();
        let second = service.sync_from_disk().unwrap();

        assert_eq!(first.loaded, second.loaded);
        assert_eq!(service.get_all_notes(), notes);
    }

    #[test]
    fn test_logout_locks() {
        let (_dir, service, key) = service();
        service.create_note("one", &key).unwrap();

        service.logout();

        assert!(service.get_all_notes().is_empty());
        assert_eq!(service.sync_from_disk().unwrap_err().code(), "LOCKED");
    }

    #[test]
    fn test_watching_disabled_by_config() {
        let dir = tempdir().unwrap();
        let mut config = GoteConfig::default();
        config.storage.data_dir = Some(dir.path().to_string_lossy().to_string());
        config.sync.watch = false;

        let service = NoteService::from_config(&config).unwrap();

        assert!(matches!(service.start_watching(), WatchStatus::Disabled(_)));
        assert!(!service.is_watching());
    }

    #[test]
    fn test_watcher_failure_falls_back_to_manual_sync() {
        let (dir, service, key) = service();
        std::fs::remove_dir_all(dir.path()).unwrap();

        let status = service.start_watching();

        assert!(matches!(status, WatchStatus::Disabled(_)), "{:?}", status);
        assert!(!service.is_watching());

        std::fs::create_dir_all(dir.path()).unwrap();
        let now = chrono::Utc::now();
        let external = Note {
            id: "00c0ffee".to_string(),
            content: "arrived while unwatched".to_string(),
            created_at: now,
            updated_at: now,
        };
        let envelope = codec::seal(&external, &key).unwrap();
        std::fs::write(
            dir.path().join("00c0ffee.json"),
            serde_json::to_vec(&envelope).unwrap(),
        )
        .unwrap();

        let report = service.sync_from_disk().unwrap();

        assert_eq!(report.loaded, 1);
        assert_eq!(service.get_note("00c0ffee").unwrap(), external);
    }
}
