//! Password-based key derivation and legacy migration.
//!
//! Two methods exist. The legacy method is a single unsalted SHA-256 of the
//! password and is kept only so older data directories stay readable. The
//! salted method is PBKDF2-HMAC-SHA256 with a random per-directory salt.
//!
//! The method used by a data directory is recorded in `.gote_config.json`
//! next to the notes, so every directory is self-describing.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::key::{NoteKey, KEY_LENGTH};
use super::random::fill_random;
use crate::error::{GoteError, Result};

/// Key derivation config filename inside a data directory.
pub const CONFIG_FILE_NAME: &str = ".gote_config.json";

/// Salted config staged by an upgrade that has not finished yet.
pub const PENDING_CONFIG_FILE_NAME: &str = ".gote_config.json.pending";

/// Default PBKDF2 iteration count for newly created configs.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Salt length in bytes for the salted method.
pub const SALT_LENGTH: usize = 32;

/// Smallest salt accepted when reading an existing config.
const MIN_SALT_LENGTH: usize = 16;

/// Key derivation method recorded for a data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KdfMethod {
    /// Single unsalted SHA-256 pass.
    Legacy,
    /// PBKDF2-HMAC-SHA256 with a persisted random salt.
    Pbkdf2,
}

/// Persisted key derivation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDerivationConfig {
    pub method: KdfMethod,

    /// Base64-encoded salt, present only for the salted method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,

    pub iterations: u32,

    pub key_length: usize,
}

impl KeyDerivationConfig {
    /// Config describing the legacy method.
    pub fn legacy() -> Self {
        Self {
            method: KdfMethod::Legacy,
            salt: None,
            iterations: 1,
            key_length: KEY_LENGTH,
        }
    }

    /// Config for the salted method with a fresh random salt.
    ///
    /// Fails if the entropy source fails; there is no weaker fallback.
    pub fn generate_salted(iterations: u32) -> Result<Self> {
        let mut salt = [0u8; SALT_LENGTH];
        fill_random(&mut salt)?;
        Ok(Self {
            method: KdfMethod::Pbkdf2,
            salt: Some(STANDARD.encode(salt)),
            iterations,
            key_length: KEY_LENGTH,
        })
    }

    pub fn is_legacy(&self) -> bool {
        self.method == KdfMethod::Legacy
    }

    /// Decoded salt bytes.
    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        let encoded = self
            .salt
            .as_deref()
            .ok_or_else(|| GoteError::Crypto("Salted config has no salt".to_string()))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| GoteError::Crypto(format!("Salt is not valid base64: {}", e)))
    }

    /// Derive the note key for `password` using this config.
    pub fn derive_key(&self, password: &str) -> Result<NoteKey> {
        match self.method {
            KdfMethod::Legacy => derive_legacy(password),
            KdfMethod::Pbkdf2 => {
                let salt = self.salt_bytes()?;
                derive_salted(password, &salt, self.iterations, self.key_length)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.key_length != KEY_LENGTH {
            return Err(GoteError::Crypto(format!(
                "Unsupported key length {}",
                self.key_length
            )));
        }
        if self.method == KdfMethod::Pbkdf2 {
            if self.iterations == 0 {
                return Err(GoteError::Crypto("Iteration count is zero".to_string()));
            }
            if self.salt_bytes()?.len() < MIN_SALT_LENGTH {
                return Err(GoteError::Crypto("Salt is too short".to_string()));
            }
        }
        Ok(())
    }

    /// Persist this config at `path`.
    ///
    /// Refuses to replace an existing salted config: notes encrypted under
    /// its salt would become undecryptable.
    pub fn save(&self, path: &Path) -> Result<()> {
        let current = detect_method(path);
        if !current.is_legacy() && current != *self {
            return Err(GoteError::Validation(format!(
                "A salted key derivation config already exists at {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_vec_pretty(self)?;
        crate::fs::write_atomic(path, &contents)?;
        Ok(())
    }
}

/// Derive a key with the legacy method: one unsalted SHA-256 pass.
///
/// Deterministic and stateless. Only used to read directories that have
/// not been migrated yet.
pub fn derive_legacy(password: &str) -> Result<NoteKey> {
    if password.is_empty() {
        return Err(GoteError::Validation("Password cannot be empty".to_string()));
    }
    let digest: [u8; KEY_LENGTH] = Sha256::digest(password.as_bytes()).into();
    Ok(NoteKey::from_bytes(digest))
}

/// Derive a key with PBKDF2-HMAC-SHA256.
///
/// Same password, salt and iteration count always produce the same key.
///
/// # Examples
///
/// ```
/// use gote_core::crypto::derive_salted;
///
/// let salt = b"unique-salt-per-directory";
/// let key = derive_salted("my-password", salt, 1_000, 32).unwrap();
/// assert_eq!(key.as_bytes().len(), 32);
/// ```
pub fn derive_salted(
    password: &str,
    salt: &[u8],
    iterations: u32,
    key_length: usize,
) -> Result<NoteKey> {
    if password.is_empty() {
        return Err(GoteError::Validation("Password cannot be empty".to_string()));
    }
    if salt.len() < MIN_SALT_LENGTH {
        return Err(GoteError::Validation(format!(
            "Salt must be at least {} bytes",
            MIN_SALT_LENGTH
        )));
    }
    if iterations == 0 {
        return Err(GoteError::Validation(
            "Iteration count must be positive".to_string(),
        ));
    }
    if key_length != KEY_LENGTH {
        return Err(GoteError::Validation(format!(
            "Key length must be {} bytes",
            KEY_LENGTH
        )));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key_bytes);
    Ok(NoteKey::from_bytes(key_bytes))
}

/// Read the key derivation config at `config_path`.
///
/// A missing, unreadable or malformed file yields the legacy config rather
/// than an error, so a damaged config never locks the user out of
/// directories that predate the salted method.
pub fn detect_method(config_path: &Path) -> KeyDerivationConfig {
    let contents = match fs::read(config_path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return KeyDerivationConfig::legacy();
        }
        Err(err) => {
            tracing::warn!(
                path = %config_path.display(),
                error = %err,
                "unreadable key derivation config; assuming legacy method"
            );
            return KeyDerivationConfig::legacy();
        }
    };

    let parsed = serde_json::from_slice::<KeyDerivationConfig>(&contents)
        .map_err(GoteError::from)
        .and_then(|config| config.validate().map(|_| config));
    match parsed {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                path = %config_path.display(),
                error = %err,
                "malformed key derivation config; assuming legacy method"
            );
            KeyDerivationConfig::legacy()
        }
    }
}

/// Write `config` as the staged config of an upgrade in progress.
///
/// The staged file is durable before any note is rewritten, so notes
/// already under the new key can always be read back.
pub fn stage_pending(config: &KeyDerivationConfig, pending_path: &Path) -> Result<()> {
    if config.is_legacy() {
        return Err(GoteError::Validation(
            "Only a salted config can be staged".to_string(),
        ));
    }
    config.validate()?;
    let contents = serde_json::to_vec_pretty(config)?;
    crate::fs::write_atomic(pending_path, &contents)?;
    Ok(())
}

/// Read the staged config left by an unfinished upgrade, if any.
///
/// A malformed staged file is ignored with a warning.
pub fn read_pending(pending_path: &Path) -> Option<KeyDerivationConfig> {
    let contents = match fs::read(pending_path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::warn!(path = %pending_path.display(), error = %err, "unreadable staged config");
            return None;
        }
    };
    let parsed = serde_json::from_slice::<KeyDerivationConfig>(&contents)
        .map_err(GoteError::from)
        .and_then(|config| config.validate().map(|_| config));
    match parsed {
        Ok(config) if !config.is_legacy() => Some(config),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(path = %pending_path.display(), error = %err, "ignoring malformed staged config");
            None
        }
    }
}

/// Make the staged config the directory's config with an atomic rename.
///
/// Refuses to replace a different salted config.
pub fn promote_pending(pending_path: &Path, config_path: &Path) -> Result<()> {
    let staged = read_pending(pending_path).ok_or_else(|| {
        GoteError::NotFound(pending_path.display().to_string())
    })?;
    let current = detect_method(config_path);
    if !current.is_legacy() && current != staged {
        return Err(GoteError::Validation(format!(
            "A salted key derivation config already exists at {}",
            config_path.display()
        )));
    }
    crate::fs::rename_with_fallback(pending_path, config_path)?;
    Ok(())
}

/// Build a fresh salted config and the key it derives, without persisting.
///
/// Callers that re-encrypt existing notes stage it with [`stage_pending`]
/// first and promote it once every note is rewritten.
pub fn prepare_migration(
    password: &str,
    iterations: u32,
) -> Result<(KeyDerivationConfig, NoteKey)> {
    let config = KeyDerivationConfig::generate_salted(iterations)?;
    let key = config.derive_key(password)?;
    Ok((config, key))
}

/// Switch a data directory from the legacy method to the salted method.
///
/// Generates a new salt, derives the new key, persists the config and
/// returns the key. Existing notes are not touched; re-encrypting them is
/// the caller's job.
pub fn migrate_from_legacy(password: &str, config_path: &Path) -> Result<NoteKey> {
    if !detect_method(config_path).is_legacy() {
        return Err(GoteError::Validation(
            "Data directory already uses salted key derivation".to_string(),
        ));
    }
    let (config, key) = prepare_migration(password, DEFAULT_ITERATIONS)?;
    config.save(config_path)?;
    tracing::info!(path = %config_path.display(), "migrated key derivation to salted method");
    Ok(key)
}
