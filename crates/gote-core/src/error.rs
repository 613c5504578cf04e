//! Error types for Gote core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Errors are descriptive at the core level; the service facade maps these
//! to user-facing messages.

use thiserror::Error;

/// Result type alias for Gote operations.
pub type Result<T> = std::result::Result<T, GoteError>;

/// Core error type for Gote operations.
#[derive(Debug, Error)]
pub enum GoteError {
    /// Input rejected before touching the store (empty id, bad id format)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Note id not present in the active index or trash
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Key derivation succeeded but the integrity check failed
    #[error("Invalid password")]
    Authentication,

    /// A single note file could not be parsed or does not match its name
    #[error("Note {id} is corrupted: {reason}")]
    Corruption { id: String, reason: String },

    /// Permission, disk-full, watcher-init and other I/O failures
    #[error("File system error: {source}")]
    FileSystem {
        #[from]
        source: std::io::Error,
    },

    /// Entropy source or cipher failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Operation requires a loaded session key
    #[error("Notes are locked; load notes with a key first")]
    Locked,

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Application config file could not be read or written
    #[error("Config error: {0}")]
    Config(String),
}

impl GoteError {
    pub(crate) fn corruption(id: impl Into<String>, reason: impl Into<String>) -> Self {
        GoteError::Corruption {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that are isolated to a single note file.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            GoteError::Authentication | GoteError::Corruption { .. }
        )
    }
}
