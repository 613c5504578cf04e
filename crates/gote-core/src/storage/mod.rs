//! Encrypted note storage.
//!
//! - **types**: `Note`, `EncryptedNote`, load reports, id rules
//! - **traits**: the `NoteStorage` contract
//! - **file_store**: one-file-per-note implementation with a trash area

pub mod file_store;
pub mod traits;
pub mod types;

pub use file_store::{ExternalChange, FileStore, TRASH_DIR_NAME};
pub use traits::NoteStorage;
pub use types::{
    is_valid_note_id, EncryptedNote, LoadFailure, LoadFailureKind, LoadReport, Note,
};
