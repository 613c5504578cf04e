//! # Gote Core
//!
//! Core library for Gote - encrypted, file-per-note storage that stays in
//! step with external edits made by sync tools.
//!
//! This crate provides key derivation, the note envelope codec, the note
//! store and the watch-and-reconcile engine, independent of any UI.
//!
//! ## Architecture
//!
//! - **crypto**: password-based key derivation, legacy migration, password hash
//! - **codec**: AES-256-GCM note envelopes
//! - **storage**: note store trait and the directory-backed implementation
//! - **sync**: debounced directory watcher and last-write-wins reconciler
//! - **session**: login, key lifetime and legacy upgrade
//! - **service**: validated facade for the UI/IPC layer
//! - **config** / **logging**: application config file and tracing setup

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod logging;
pub mod service;
pub mod session;
pub mod storage;
pub mod sync;

pub use error::{GoteError, Result};
pub use service::{NoteService, ServiceError, ServiceResult, WatchStatus};
pub use session::Session;
pub use storage::{FileStore, Note, NoteStorage};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
