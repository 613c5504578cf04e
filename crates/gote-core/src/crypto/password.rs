//! Password policy and the local password-hash file.
//!
//! The hash file holds an Argon2id PHC string used only to check a login
//! attempt before any note is decrypted. It is unrelated to the note key.

use std::fs;
use std::path::{Path, PathBuf};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use super::random::random_bytes;
use crate::error::{GoteError, Result};

/// Password-hash filename inside a data directory.
pub const PASSWORD_FILE_NAME: &str = ".gote_password";

/// Minimum password length in characters.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate that a new password meets minimum requirements.
///
/// # Requirements
///
/// - Not empty or only whitespace
/// - At least 8 characters long
///
/// # Examples
///
/// ```
/// use gote_core::crypto::validate_password;
///
/// assert!(validate_password("my-secure-password-123").is_ok());
/// assert!(validate_password("short").is_err());
/// ```
pub fn validate_password(password: &str) -> Result<()> {
    if password.trim().is_empty() {
        return Err(GoteError::Validation("Password cannot be empty".to_string()));
    }

    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(GoteError::Validation(format!(
            "Password must be at least {} characters (got {})",
            MIN_PASSWORD_LENGTH, length
        )));
    }

    Ok(())
}

/// Path of the password-hash file for `data_dir`.
pub fn password_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(PASSWORD_FILE_NAME)
}

/// Whether `data_dir` has a stored password hash.
pub fn has_password(data_dir: &Path) -> bool {
    password_file_path(data_dir).is_file()
}

/// Hash `password` with Argon2id and store it in `data_dir`.
pub fn set_password_hash(data_dir: &Path, password: &str) -> Result<()> {
    let salt_bytes = random_bytes::<16>()?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| GoteError::Crypto(format!("Failed to encode salt: {}", e)))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| GoteError::Crypto(format!("Password hashing failed: {}", e)))?
        .to_string();

    fs::create_dir_all(data_dir)?;
    crate::fs::write_atomic(&password_file_path(data_dir), hash.as_bytes())?;
    Ok(())
}

/// Check `password` against the stored hash.
///
/// Returns `Ok(false)` on mismatch. A missing file is `NotFound`; an
/// unparsable file is `Corruption`.
pub fn verify_password(data_dir: &Path, password: &str) -> Result<bool> {
    let path = password_file_path(data_dir);
    let stored = match fs::read_to_string(&path) {
        Ok(stored) => stored,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(GoteError::NotFound("password hash".to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    let parsed = PasswordHash::new(stored.trim())
        .map_err(|e| GoteError::corruption(PASSWORD_FILE_NAME, e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
