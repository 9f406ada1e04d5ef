// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::manager::Manager;
use crate::supervisor::StateCallback;
use herd_config::Topology;
use std::sync::Arc;

fn build_manager(dir: &std::path::Path, content: &str) -> (Arc<Manager>, PathBuf) {
    let config_path = dir.join("agents.yaml");
    std::fs::write(&config_path, content).unwrap();
    let topology = Topology::load(&config_path).unwrap();
    let store = Arc::new(herd_storage::AgentDataStore::open(dir.join("agent_data.json")));
    let logs = Arc::new(herd_storage::LogStore::open(dir.join("logs")));
    let callback: StateCallback = Arc::new(|_| {});
    (
        Manager::new(config_path.clone(), topology, store, logs, callback),
        config_path,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_change_triggers_reload() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, config_path) =
        build_manager(dir.path(), "agents:\n  - name: one\n    command: /bin/cat\n");
    assert_eq!(manager.all_agents().len(), 1);

    let watcher = ConfigWatcher::spawn(Arc::clone(&manager), config_path.clone()).unwrap();

    // Coarse-mtime filesystems need the rewrite to land in a later second.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    std::fs::write(
        &config_path,
        "agents:\n  - name: one\n    command: /bin/cat\n  - name: two\n    command: /bin/cat\n",
    )
    .unwrap();

    // Wait for debounce + reload.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while manager.all_agents().len() != 2 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(manager.all_agents().len(), 2);

    watcher.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unrelated_files_do_not_trigger_reload() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, config_path) =
        build_manager(dir.path(), "agents:\n  - name: one\n    command: /bin/cat\n");

    let watcher = ConfigWatcher::spawn(Arc::clone(&manager), config_path).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(dir.path().join("other.yaml"), "agents: []").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(manager.all_agents().len(), 1);
    watcher.stop();
}
