// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[test]
fn appended_lines_are_timestamp_prefixed() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::open(dir.path());

    store.append("svc", "hello");
    let lines = store.logs("svc", 0);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with(" hello"));
    // "YYYY-MM-DD HH:MM:SS hello"
    assert!(lines[0].len() > "hello".len() + 19);
}

#[test]
fn logs_returns_the_newest_max_lines() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::open(dir.path());

    for i in 0..5 {
        store.append("svc", &format!("line {i}"));
    }

    let lines = store.logs("svc", 2);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("line 3"));
    assert!(lines[1].ends_with("line 4"));

    assert_eq!(store.logs("svc", 0).len(), 5);
    assert_eq!(store.logs("svc", 100).len(), 5);
}

#[test]
fn lines_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = LogStore::open(dir.path());
        store.append("svc", "persisted");
    }
    let store = LogStore::open(dir.path());
    let lines = store.logs("svc", 0);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("persisted"));
}

#[test]
fn retention_cap_bounds_memory_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::with_cap(dir.path(), 10);

    for i in 0..25 {
        store.append("svc", &format!("line {i}"));
    }

    // In-memory view is capped immediately.
    let lines = store.logs("svc", 0);
    assert_eq!(lines.len(), 10);
    assert!(lines[0].ends_with("line 15"));
    assert!(lines[9].ends_with("line 24"));

    // The async trimmer eventually rewrites the file to at most the cap.
    let path = dir.path().join("svc.log");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let count = std::fs::read_to_string(&path)
            .map(|c| c.lines().count())
            .unwrap_or(usize::MAX);
        if count <= 10 || std::time::Instant::now() > deadline {
            assert!(count <= 25, "file should exist with bounded lines");
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn delete_removes_memory_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::open(dir.path());

    store.append("svc", "x");
    store.delete("svc");

    assert!(store.logs("svc", 0).is_empty());
    assert!(!dir.path().join("svc.log").exists());
}

#[test]
fn agents_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::open(dir.path());

    store.append("a", "from a");
    store.append("b", "from b");

    assert_eq!(store.logs("a", 0).len(), 1);
    assert_eq!(store.logs("b", 0).len(), 1);
    assert!(store.logs("a", 0)[0].ends_with("from a"));
}
