mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ragwatch::config::DuplicatePolicy;
use ragwatch::ingest::Indexer;
use ragwatch::watcher::{WatchState, Watcher};
use tempfile::TempDir;

use common::FlakyStore;

const TIMEOUT: Duration = Duration::from_secs(20);

fn setup(policy: DuplicatePolicy) -> (TempDir, Arc<Indexer>) {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("staging")).unwrap();
    let indexer = common::memory_indexer(&tmp, policy);
    (tmp, Arc::new(indexer))
}

/// Write outside the watched directory, then rename in, so the watcher
/// only ever sees a complete file.
fn drop_in(tmp: &TempDir, root: &Path, name: &str, content: &str) {
    let staged = tmp.path().join("staging").join(name);
    fs::write(&staged, content).unwrap();
    fs::rename(&staged, root.join(name)).unwrap();
}

fn spawn(indexer: &Arc<Indexer>) -> ragwatch::watcher::WatcherHandle {
    Watcher::new(
        Arc::clone(indexer),
        indexer.root().to_path_buf(),
        false,
        Duration::from_millis(50),
    )
    .spawn()
    .unwrap()
}

#[test]
fn renamed_in_file_is_indexed() {
    let (tmp, indexer) = setup(DuplicatePolicy::Skip);
    let handle = spawn(&indexer);

    drop_in(&tmp, indexer.root(), "notes.md", "# Notes\n\nThe build runs nightly.");
    assert!(handle.signal().wait_for(1, TIMEOUT));

    assert_eq!(indexer.index().count().unwrap(), 1);
    assert!(indexer.tracker().get("notes.md").is_some());
    assert_eq!(handle.state(), WatchState::Idle);
    handle.stop();
}

#[test]
fn copy_of_known_file_leaves_index_unchanged() {
    let (tmp, indexer) = setup(DuplicatePolicy::Skip);
    fs::write(indexer.root().join("a.txt"), "original content").unwrap();
    indexer.index_file(&indexer.root().join("a.txt")).unwrap();
    let handle = spawn(&indexer);

    drop_in(&tmp, indexer.root(), "a_copy.txt", "original content");
    assert!(handle.signal().wait_for(1, TIMEOUT));

    assert_eq!(indexer.index().count().unwrap(), 1);
    assert!(indexer.tracker().get("a_copy.txt").is_none());
    assert!(indexer.root().join("a_copy.txt").exists());
    handle.stop();
}

#[test]
fn delete_policy_removes_duplicate_file() {
    let (tmp, indexer) = setup(DuplicatePolicy::Delete);
    fs::write(indexer.root().join("a.txt"), "original content").unwrap();
    indexer.index_file(&indexer.root().join("a.txt")).unwrap();
    let handle = spawn(&indexer);

    drop_in(&tmp, indexer.root(), "a_copy.txt", "original content");
    assert!(handle.signal().wait_for(1, TIMEOUT));

    assert!(!indexer.root().join("a_copy.txt").exists());
    assert_eq!(indexer.index().count().unwrap(), 1);
    handle.stop();
}

#[test]
fn unsupported_file_is_recorded_and_watcher_keeps_going() {
    let (tmp, indexer) = setup(DuplicatePolicy::Skip);
    let handle = spawn(&indexer);

    drop_in(&tmp, indexer.root(), "image.bin", "not text");
    assert!(handle.signal().wait_for(1, TIMEOUT));
    assert!(indexer.tracker().get("image.bin").is_some());
    assert_eq!(indexer.index().count().unwrap(), 0);

    drop_in(&tmp, indexer.root(), "after.txt", "still watching");
    assert!(handle.signal().wait_for(2, TIMEOUT));
    assert_eq!(indexer.index().count().unwrap(), 1);
    handle.stop();
}

#[test]
fn store_failure_is_survived_and_next_file_indexed() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("staging")).unwrap();
    let store = FlakyStore::new();
    let indexer = Arc::new(common::indexer(&tmp, store.clone(), DuplicatePolicy::Skip));
    store.fail_writes_for("first.txt");
    let handle = spawn(&indexer);

    drop_in(&tmp, indexer.root(), "first.txt", "lost to a store outage");
    assert!(handle.signal().wait_for(1, TIMEOUT));
    assert!(indexer.tracker().get("first.txt").is_none());
    assert_eq!(indexer.index().count().unwrap(), 0);

    drop_in(&tmp, indexer.root(), "second.txt", "arrives after the outage");
    assert!(handle.signal().wait_for(2, TIMEOUT));
    assert_eq!(indexer.index().count().unwrap(), 1);
    assert!(indexer.tracker().get("second.txt").is_some());
    assert_eq!(handle.state(), WatchState::Idle);
    handle.stop();
}
