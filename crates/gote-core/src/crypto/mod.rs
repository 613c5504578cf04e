//! Cryptographic operations for Gote.
//!
//! This module provides key derivation, password verification and secure
//! randomness using well-audited libraries:
//! - **SHA-256**: legacy unsalted key derivation (read-only compatibility)
//! - **PBKDF2-HMAC-SHA256**: salted, iterated key derivation
//! - **Argon2id**: password-hash file used for local login verification
//!
//! ## Security Model
//!
//! - Each data directory describes its own key derivation method
//! - The salt is generated once and never rotated while notes depend on it
//! - Key material is zeroized from memory on drop
//! - No plaintext passwords are stored
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft of the notes directory
//! - Offline brute-force attacks on the password (salted method only)
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger
//! - Access to an unlocked session / process memory

pub mod kdf;
pub mod key;
pub mod password;
pub mod random;

pub use kdf::{
    derive_legacy, derive_salted, detect_method, migrate_from_legacy, KdfMethod,
    KeyDerivationConfig, CONFIG_FILE_NAME, DEFAULT_ITERATIONS, PENDING_CONFIG_FILE_NAME,
};
pub use key::{NoteKey, KEY_LENGTH};
pub use password::{has_password, set_password_hash, validate_password, verify_password};
