// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn store(dir: &tempfile::TempDir) -> AgentDataStore {
    AgentDataStore::open(dir.path().join("agent_data.json"))
}

#[test]
fn start_sets_resume_flag_and_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.record_start("svc");
    let rec = store.agent_data("svc").unwrap();
    assert!(rec.was_running);
    assert!(rec.last_started.is_some());
    assert_eq!(rec.crash_count, 0);
}

#[test]
fn graceful_stop_clears_resume_flag() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.record_start("svc");
    store.record_stop("svc");
    let rec = store.agent_data("svc").unwrap();
    assert!(!rec.was_running);
    assert!(rec.last_stopped.is_some());
    assert_eq!(rec.crash_count, 0);
}

#[test]
fn preserving_stop_keeps_resume_flag() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.record_start("svc");
    store.record_stop_preserving("svc");
    assert!(store.agent_data("svc").unwrap().was_running);
    assert_eq!(store.previously_running_agents(), ["svc"]);
}

#[test]
fn crash_increments_counter() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.record_start("svc");
    store.record_crash("svc");
    store.record_start("svc");
    store.record_crash("svc");
    assert_eq!(store.agent_data("svc").unwrap().crash_count, 2);
}

#[test]
fn restart_counter_accrues() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.record_restart("svc");
    store.record_restart("svc");
    assert_eq!(store.agent_data("svc").unwrap().restart_count, 2);
}

#[test]
fn snapshot_replaces_the_running_set() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.record_running("a", true);
    store.record_running("b", true);
    store.snapshot_running_agents(&["b".to_string(), "c".to_string()]);

    let mut running = store.previously_running_agents();
    running.sort();
    assert_eq!(running, ["b", "c"]);
}

#[test]
fn total_runtime_includes_live_delta() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.record_start("svc");
    // The live delta counts whole seconds; immediately after start it is 0
    // but must not underflow or panic.
    let _ = store.total_runtime("svc");

    store.record_stop("svc");
    assert_eq!(store.total_runtime("svc"), store.agent_data("svc").unwrap().total_runtime_seconds);
}

#[test]
fn delete_removes_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    store.record_start("svc");
    store.delete_agent_data("svc");
    assert!(store.agent_data("svc").is_none());
}

#[test]
fn save_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent_data.json");

    {
        let store = AgentDataStore::open(&path);
        store.record_start("svc");
        store.record_stop_preserving("svc");
        store.save();
    }

    let reopened = AgentDataStore::open(&path);
    let rec = reopened.agent_data("svc").unwrap();
    assert!(rec.was_running);
    assert_eq!(reopened.previously_running_agents(), ["svc"]);
}

#[test]
fn corrupt_document_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent_data.json");
    std::fs::write(&path, "{not json").unwrap();

    let store = AgentDataStore::open(&path);
    assert!(store.agent_data("anything").is_none());
}

#[test]
fn unknown_agent_has_zero_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    assert_eq!(store.total_runtime("ghost"), 0);
}
