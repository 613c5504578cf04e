use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use gote_core::codec;
use gote_core::crypto::derive_salted;
use gote_core::storage::Note;
use gote_core::sync::SyncSettings;
use gote_core::{NoteService, WatchStatus};
use tempfile::tempdir;

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    condition()
}

fn write_note(path: &std::path::Path, note: &Note, key: &gote_core::crypto::NoteKey) {
    let envelope = codec::seal(note, key).expect("seal should succeed");
    let tmp = path.with_extension("partial");
    fs::write(&tmp, serde_json::to_vec_pretty(&envelope).expect("serialize should succeed"))
        .expect("write should succeed");
    fs::rename(&tmp, path).expect("rename should succeed");
}

#[test]
fn test_external_edits_follow_last_write_wins() {
    let dir = tempdir().expect("tempdir should be available");
    let key = Arc::new(
        derive_salted("test-password", b"test-salt-1234567890123456", 1_000, 32)
            .expect("derive should succeed"),
    );
    let settings = SyncSettings {
        debounce: Duration::from_millis(50),
        queue_capacity: 64,
    };
    let service = NoteService::open(dir.path(), settings).expect("open should succeed");
    service.load_notes(key.clone()).expect("load should succeed");
    let note = service.create_note("local", &key).expect("create should succeed");
    let path = dir.path().join(format!("{}.json", note.id));

    let watching = service.start_watching() == WatchStatus::Active;

    let stale = Note {
        content: "stale".to_string(),
        created_at: note.created_at - ChronoDuration::seconds(1),
        updated_at: note.updated_at - ChronoDuration::seconds(1),
        ..note.clone()
    };
    write_note(&path, &stale, &key);

    let newer = Note {
        id: "00c0ffee".to_string(),
        content: "synced from elsewhere".to_string(),
        created_at: note.created_at,
        updated_at: note.updated_at + ChronoDuration::seconds(5),
    };
    write_note(&dir.path().join("00c0ffee.json"), &newer, &key);

    if watching {
        assert!(wait_for(|| service.get_note("00c0ffee").is_ok()));
    } else {
        service.sync_from_disk().expect("manual sync should succeed");
        assert!(service.get_note("00c0ffee").is_ok());
    }

    // The stale artifact never replaces the local copy while watching.
    if watching {
        assert_eq!(
            service.get_note(&note.id).expect("note should exist").content,
            "local"
        );
    }

    fs::remove_file(dir.path().join("00c0ffee.json")).expect("remove should succeed");
    if watching {
        assert!(wait_for(|| service.get_note("00c0ffee").is_err()));
    } else {
        service.sync_from_disk().expect("manual sync should succeed");
        assert!(service.get_note("00c0ffee").is_err());
    }

    service.stop_watching();
    assert!(!service.is_watching());
}

#[test]
fn test_manual_sync_without_watcher() {
    let dir = tempdir().expect("tempdir should be available");
    let key = Arc::new(
        derive_salted("test-password", b"test-salt-1234567890123456", 1_000, 32)
            .expect("derive should succeed"),
    );
    let service =
        NoteService::open(dir.path(), SyncSettings::default()).expect("open should succeed");
    service.load_notes(key.clone()).expect("load should succeed");

    let now = chrono::Utc::now();
    let external = Note {
        id: "0000abcd".to_string(),
        content: "dropped in by a sync tool".to_string(),
        created_at: now,
        updated_at: now,
    };
    write_note(&dir.path().join("0000abcd.json"), &external, &key);
    fs::write(dir.path().join("0000abcd.json.conflict"), b"ignored").expect("write should succeed");

    let report = service.sync_from_disk().expect("sync should succeed");

    assert_eq!(report.loaded, 1);
    assert_eq!(service.get_note("0000abcd").expect("note should exist"), external);
}
