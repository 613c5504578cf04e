//! Authenticated session: password check, key derivation, legacy upgrade.
//!
//! A `Session` owns the note key for as long as the user is logged in. The
//! key is shared read-only through `Arc<NoteKey>` and zeroized when the
//! last holder drops it, so ending a session means dropping the `Session`
//! and clearing the store (see `NoteService::logout`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::crypto::kdf::{self, prepare_migration, KeyDerivationConfig};
use crate::crypto::PENDING_CONFIG_FILE_NAME;
use crate::crypto::password::{has_password, set_password_hash, validate_password, verify_password};
use crate::crypto::{KdfMethod, NoteKey, CONFIG_FILE_NAME, DEFAULT_ITERATIONS};
use crate::error::{GoteError, Result};
use crate::storage::types::note_id_from_path;
use crate::storage::FileStore;

pub struct Session {
    data_dir: PathBuf,
    config: KeyDerivationConfig,
    key: Arc<NoteKey>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("data_dir", &self.data_dir)
            .field("method", &self.config.method)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

fn pending_path(data_dir: &Path) -> PathBuf {
    data_dir.join(PENDING_CONFIG_FILE_NAME)
}

fn contains_notes(data_dir: &Path) -> Result<bool> {
    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };
    for entry in entries {
        if note_id_from_path(&entry?.path()).is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Session {
    /// First-run setup with the default iteration count.
    pub fn initialize(data_dir: &Path, password: &SecretString) -> Result<Self> {
        Self::initialize_with_iterations(data_dir, password, DEFAULT_ITERATIONS)
    }

    /// First-run setup: store the password hash, create a salted config and
    /// derive the key.
    ///
    /// # Errors
    ///
    /// Returns `GoteError::Validation` if the password is too weak or the
    /// directory is already set up or already holds notes.
    pub fn initialize_with_iterations(
        data_dir: &Path,
        password: &SecretString,
        iterations: u32,
    ) -> Result<Self> {
        let password = password.expose_secret();
        validate_password(password)?;

        if has_password(data_dir)
            || !kdf::detect_method(&config_path(data_dir)).is_legacy()
            || contains_notes(data_dir)?
        {
            return Err(GoteError::Validation(format!(
                "{} is already initialized",
                data_dir.display()
            )));
        }

        fs::create_dir_all(data_dir)?;
        let (config, key) = prepare_migration(password, iterations)?;
        config.save(&config_path(data_dir))?;
        set_password_hash(data_dir, password)?;

        tracing::info!(path = %data_dir.display(), "initialized notes directory");
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            key: Arc::new(key),
        })
    }

    /// Log in to an existing directory.
    ///
    /// The stored password hash is checked first when present. Directories
    /// that predate the hash file rely on note decryption to reject a wrong
    /// password. An upgrade that was interrupted is finished here.
    ///
    /// # Errors
    ///
    /// Returns `GoteError::Authentication` if the password does not match.
    pub fn unlock(data_dir: &Path, password: &SecretString) -> Result<Self> {
        let password = password.expose_secret();
        if has_password(data_dir) && !verify_password(data_dir, password)? {
            tracing::warn!(path = %data_dir.display(), "rejected login attempt");
            return Err(GoteError::Authentication);
        }

        let config = kdf::detect_method(&config_path(data_dir));
        if config.is_legacy() {
            if let Some(staged) = kdf::read_pending(&pending_path(data_dir)) {
                return Self::resume_upgrade(data_dir, password, staged);
            }
        }
        let key = config.derive_key(password)?;
        if config.is_legacy() {
            tracing::info!(path = %data_dir.display(), "directory uses legacy key derivation");
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            key: Arc::new(key),
        })
    }

    /// Finish an upgrade whose staged config was never promoted.
    ///
    /// Notes still under the legacy key are rewritten; notes already under
    /// the staged key are left alone. If the staged config still cannot be
    /// promoted the session runs on it and the next login tries again.
    fn resume_upgrade(
        data_dir: &Path,
        password: &str,
        staged: KeyDerivationConfig,
    ) -> Result<Self> {
        let legacy = kdf::derive_legacy(password)?;
        let key = Arc::new(staged.derive_key(password)?);

        let store = FileStore::open(data_dir)?;
        let rewritten = store.reencrypt_all(&legacy, Arc::clone(&key))?;
        match kdf::promote_pending(&pending_path(data_dir), &config_path(data_dir)) {
            Ok(()) => tracing::info!(
                path = %data_dir.display(),
                rewritten,
                "finished interrupted upgrade to salted key derivation"
            ),
            Err(err) => tracing::warn!(
                path = %data_dir.display(),
                error = %err,
                "staged key derivation config not promoted; retrying at next login"
            ),
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config: staged,
            key,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Shared handle to the session key.
    pub fn key(&self) -> Arc<NoteKey> {
        Arc::clone(&self.key)
    }

    pub fn method(&self) -> KdfMethod {
        self.config.method
    }

    pub fn needs_migration(&self) -> bool {
        self.config.is_legacy()
    }

    /// Upgrade a legacy directory with the default iteration count.
    pub fn upgrade(&mut self, password: &SecretString, store: &FileStore) -> Result<usize> {
        self.upgrade_with_iterations(password, store, DEFAULT_ITERATIONS)
    }

    /// Move a legacy directory to salted key derivation.
    ///
    /// The new config is staged durably next to the notes first, then every
    /// note (active and trashed) is re-encrypted and the staged config is
    /// promoted. The session switches keys as soon as the notes are
    /// rewritten. If promotion fails the error is returned and the next
    /// [`Session::unlock`] completes the upgrade. Returns the number of
    /// notes rewritten; a directory that is already salted returns 0.
    pub fn upgrade_with_iterations(
        &mut self,
        password: &SecretString,
        store: &FileStore,
        iterations: u32,
    ) -> Result<usize> {
        if !self.needs_migration() {
            return Ok(0);
        }
        let password = password.expose_secret();
        if kdf::derive_legacy(password)? != *self.key {
            return Err(GoteError::Authentication);
        }

        if !has_password(&self.data_dir) {
            set_password_hash(&self.data_dir, password)?;
        }

        let pending = pending_path(&self.data_dir);
        let (config, new_key) = match kdf::read_pending(&pending) {
            Some(staged) => {
                let key = staged.derive_key(password)?;
                (staged, key)
            }
            None => {
                let (config, key) = prepare_migration(password, iterations)?;
                kdf::stage_pending(&config, &pending)?;
                (config, key)
            }
        };
        let new_key = Arc::new(new_key);
        let rewritten = store.reencrypt_all(&self.key, Arc::clone(&new_key))?;

        self.config = config;
        self.key = new_key;
        kdf::promote_pending(&pending, &config_path(&self.data_dir))?;
        tracing::info!(
            path = %self.data_dir.display(),
            rewritten,
            "upgraded directory to salted key derivation"
        );
        Ok(rewritten)
    }

    /// End the session. The key is zeroized once no store still holds it.
    pub fn logout(self) {
        tracing::info!(path = %self.data_dir.display(), "session ended");
    }
}
