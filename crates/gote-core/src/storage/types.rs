//! Core data types for the note store.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix of every note file, active or trashed.
pub const NOTE_FILE_SUFFIX: &str = ".json";

/// Length of a note id in characters.
pub const NOTE_ID_LENGTH: usize = 8;

/// A decrypted note held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// 8 lowercase hex characters, immutable after creation
    pub id: String,

    /// Markdown-oriented plaintext, may be empty
    pub content: String,

    pub created_at: DateTime<Utc>,

    /// Always `>= created_at`
    pub updated_at: DateTime<Utc>,
}

/// The on-disk envelope of a note.
///
/// Timestamps stay in the clear so conflicts can be resolved without
/// decrypting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedNote {
    /// Same value as the filename stem
    pub id: String,

    /// Base64 of nonce followed by ciphertext and tag
    pub encrypted_data: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Why a single file was skipped during a bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureKind {
    /// Integrity check failed; most likely a wrong key.
    Authentication,
    /// Unparsable envelope or an id that does not match the filename.
    Corruption,
    /// The file disappeared or could not be read.
    Io,
}

/// A note file that could not be loaded.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub id: String,
    pub kind: LoadFailureKind,
    pub message: String,
}

/// Outcome of a bulk load or refresh.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Notes decrypted and indexed
    pub loaded: usize,

    /// Files skipped, one entry per file
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when every file failed authentication, which points at a wrong
    /// password rather than damaged files.
    pub fn all_failed_authentication(&self) -> bool {
        self.loaded == 0
            && !self.failures.is_empty()
            && self
                .failures
                .iter()
                .all(|f| f.kind == LoadFailureKind::Authentication)
    }
}

/// Whether `id` is exactly 8 lowercase hex characters.
pub fn is_valid_note_id(id: &str) -> bool {
    id.len() == NOTE_ID_LENGTH
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// The note id a path refers to, if its filename is `<id>.json`.
///
/// Anything else (temp files, sync-tool artifacts, config files) is `None`.
pub fn note_id_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(NOTE_FILE_SUFFIX)?;
    is_valid_note_id(stem).then(|| stem.to_string())
}

/// Filename for a note id.
pub fn note_file_name(id: &str) -> String {
    format!("{}{}", id, NOTE_FILE_SUFFIX)
}

/// Ordering used by listings: newest `updated_at` first, ties by id.
pub fn sort_notes(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::path::PathBuf;

    #[test]
    fn test_note_id_validation() {
        assert!(is_valid_note_id("0a1b2c3d"));
        assert!(is_valid_note_id("deadbeef"));
        assert!(!is_valid_note_id("DEADBEEF"));
        assert!(!is_valid_note_id("deadbee"));
        assert!(!is_valid_note_id("deadbeef0"));
        assert!(!is_valid_note_id("deadbeeg"));
        assert!(!is_valid_note_id(""));
    }

    #[test]
    fn test_note_id_from_path_ignores_strays() {
        let ok = PathBuf::from("/notes/0a1b2c3d.json");
        assert_eq!(note_id_from_path(&ok), Some("0a1b2c3d".to_string()));

        for stray in [
            "/notes/.gote_config.json",
            "/notes/.0a1b2c3d.json.123.tmp",
            "/notes/0a1b2c3d.json.sync-conflict",
            "/notes/0a1b2c3d (copy).json",
            "/notes/0a1b2c3d.txt",
            "/notes/trash",
        ] {
            assert_eq!(note_id_from_path(Path::new(stray)), None, "{}", stray);
        }
    }

    #[test]
    fn test_envelope_json_field_names() {
        let now = Utc::now();
        let envelope = EncryptedNote {
            id: "0a1b2c3d".to_string(),
            encrypted_data: "AAAA".to_string(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&envelope).unwrap();

        assert!(json.get("encrypted_data").is_some());
        assert!(json.get("created_at").is_some());
        assert!(json.get("updated_at").is_some());
        let parsed: EncryptedNote = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_sort_notes_newest_first() {
        let now = Utc::now();
        let note = |id: &str, offset: i64| Note {
            id: id.to_string(),
            content: String::new(),
            created_at: now,
            updated_at: now + Duration::seconds(offset),
        };
        let mut notes = vec![note("00000001", 0), note("00000003", 5), note("00000002", 5)];

        sort_notes(&mut notes);

        let ids: Vec<_> = notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["00000002", "00000003", "00000001"]);
    }

    #[test]
    fn test_load_report_wrong_password_detection() {
        let mut report = LoadReport::default();
        assert!(!report.all_failed_authentication());

        report.failures.push(LoadFailure {
            id: "0a1b2c3d".to_string(),
            kind: LoadFailureKind::Authentication,
            message: "Invalid password".to_string(),
        });
        assert!(report.all_failed_authentication());

        report.loaded = 1;
        assert!(!report.all_failed_authentication());
    }
}
