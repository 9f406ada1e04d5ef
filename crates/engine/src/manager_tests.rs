// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use herd_core::AgentStatus;
use parking_lot::Mutex;
use std::path::Path;

struct Fixture {
    dir: tempfile::TempDir,
    events: Arc<Mutex<Vec<AgentStateEvent>>>,
}

impl Fixture {
    fn new() -> Fixture {
        Fixture {
            dir: tempfile::tempdir().unwrap(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn manager(&self, content: &str) -> Arc<Manager> {
        let config_path = self.dir.path().join("agents.yaml");
        std::fs::write(&config_path, content).unwrap();
        let topology = Topology::load(&config_path).unwrap();

        let store = Arc::new(herd_storage::AgentDataStore::open(
            self.dir.path().join("agent_data.json"),
        ));
        let logs = Arc::new(herd_storage::LogStore::open(self.dir.path().join("logs")));
        let events = Arc::clone(&self.events);
        let callback: StateCallback = Arc::new(move |event| {
            events.lock().push(event);
        });
        Manager::new(config_path, topology, store, logs, callback)
    }

    fn topology(&self, content: &str) -> Topology {
        Topology::parse(
            content,
            self.dir.path().to_path_buf(),
            Path::new("agents.yaml"),
        )
        .unwrap()
    }
}

const TWO_AGENTS: &str = "\
agents:
  - name: alpha
    command: /bin/sh
    args: [\"-c\", \"sleep 60\"]
  - name: beta
    command: /bin/cat
    description: reads things
";

#[tokio::test]
async fn agents_are_exposed_in_declared_order() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    let names: Vec<String> = manager
        .all_agents()
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert_eq!(names, ["alpha", "beta"]);
    assert!(manager.get_agent("alpha").is_some());
    assert!(manager.get_agent("missing").is_none());
}

#[tokio::test]
async fn unknown_agent_operations_error() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    assert!(matches!(
        manager.start_agent("ghost").await,
        Err(ManagerError::UnknownAgent(_))
    ));
    assert!(matches!(
        manager
            .invoke_command("ghost", "ping", None, "", None)
            .await,
        Err(ManagerError::UnknownAgent(_))
    ));
}

#[tokio::test]
async fn identical_reload_is_a_noop() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    let before: Vec<_> = manager.all_agents();
    let summary = manager.reload_config().await.unwrap();
    assert_eq!(summary, ReloadSummary::default());

    // Same supervisors, not replacements.
    let after: Vec<_> = manager.all_agents();
    for (a, b) in before.iter().zip(after.iter()) {
        assert!(Arc::ptr_eq(a, b));
    }
}

#[tokio::test]
async fn metadata_only_change_updates_in_place() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);
    let beta_before = manager.get_agent("beta").unwrap();

    let updated = TWO_AGENTS.replace("reads things", "writes things");
    let summary = manager.reconcile_with(fx.topology(&updated)).await.unwrap();

    assert_eq!(summary.metadata_updated, ["beta"]);
    assert!(summary.replaced.is_empty());
    assert!(summary.restarted.is_empty());

    // Same supervisor object, new metadata.
    let beta_after = manager.get_agent("beta").unwrap();
    assert!(Arc::ptr_eq(&beta_before, &beta_after));
    assert_eq!(beta_after.description().as_deref(), Some("writes things"));

    // Exactly one metadata event for beta.
    let metadata_events: Vec<_> = fx
        .events
        .lock()
        .iter()
        .filter(|e| matches!(e, AgentStateEvent::Metadata { name, .. } if name == "beta"))
        .cloned()
        .collect();
    assert_eq!(metadata_events.len(), 1);
}

#[tokio::test]
async fn structural_change_replaces_the_supervisor() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);
    let beta_before = manager.get_agent("beta").unwrap();

    let updated = TWO_AGENTS.replace("/bin/cat", "/bin/true");
    let summary = manager.reconcile_with(fx.topology(&updated)).await.unwrap();

    assert_eq!(summary.replaced, ["beta"]);
    // Stopped agent: no restart enqueued.
    assert!(summary.restarted.is_empty());

    let beta_after = manager.get_agent("beta").unwrap();
    assert!(!Arc::ptr_eq(&beta_before, &beta_after));
    assert_eq!(beta_after.declaration().command, "/bin/true");
}

#[tokio::test]
async fn removed_agents_are_dropped_and_announced() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    let only_alpha = "agents:\n  - name: alpha\n    command: /bin/sh\n    args: [\"-c\", \"sleep 60\"]\n";
    let summary = manager.reconcile_with(fx.topology(only_alpha)).await.unwrap();

    assert_eq!(summary.removed, ["beta"]);
    assert!(manager.get_agent("beta").is_none());
    assert!(fx
        .events
        .lock()
        .iter()
        .any(|e| matches!(e, AgentStateEvent::Removed { name } if name == "beta")));
}

#[tokio::test]
async fn added_agents_are_constructed_and_announced() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    let three = format!("{TWO_AGENTS}  - name: gamma\n    command: /bin/cat\n");
    let summary = manager.reconcile_with(fx.topology(&three)).await.unwrap();

    assert_eq!(summary.added, ["gamma"]);
    assert!(manager.get_agent("gamma").is_some());
    assert_eq!(manager.all_agents().len(), 3);
}

#[tokio::test]
async fn runtime_added_agents_survive_reload() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    let mut extra = herd_core::AgentDeclaration {
        name: "dynamic".to_string(),
        command: "/bin/cat".to_string(),
        ..beta_like()
    };
    extra.description = None;
    manager.add_agent(extra).unwrap();
    assert!(manager.get_agent("dynamic").is_some());

    let updated = TWO_AGENTS.replace("reads things", "changed");
    manager.reconcile_with(fx.topology(&updated)).await.unwrap();
    assert!(manager.get_agent("dynamic").is_some());
}

#[tokio::test]
async fn add_agent_rejects_duplicates() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    let dup = herd_core::AgentDeclaration {
        name: "alpha".to_string(),
        command: "/bin/cat".to_string(),
        ..beta_like()
    };
    assert!(matches!(
        manager.add_agent(dup),
        Err(ManagerError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn remove_agent_deletes_state() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    manager.remove_agent("beta").await.unwrap();
    assert!(manager.get_agent("beta").is_none());
    assert!(fx
        .events
        .lock()
        .iter()
        .any(|e| matches!(e, AgentStateEvent::Removed { name } if name == "beta")));
}

#[tokio::test]
async fn reload_with_unparseable_file_preserves_topology() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    std::fs::write(fx.dir.path().join("agents.yaml"), "agents: {broken").unwrap();
    let err = manager.reload_config().await.unwrap_err();
    assert!(matches!(err, ManagerError::Reload(_)));
    assert_eq!(manager.all_agents().len(), 2);
}

#[tokio::test]
async fn structural_change_restarts_a_running_agent() {
    let fx = Fixture::new();
    let manager = fx.manager(TWO_AGENTS);

    manager.start_agent("alpha").await.unwrap();
    let pid_before = manager.get_agent("alpha").unwrap().pid();
    assert_ne!(pid_before, 0);

    let updated = TWO_AGENTS.replace("sleep 60", "sleep 61");
    let summary = manager.reconcile_with(fx.topology(&updated)).await.unwrap();

    assert_eq!(summary.replaced, ["alpha"]);
    assert_eq!(summary.restarted, ["alpha"]);

    let alpha = manager.get_agent("alpha").unwrap();
    assert_eq!(alpha.status(), AgentStatus::Running);
    assert_ne!(alpha.pid(), 0);
    assert_ne!(alpha.pid(), pid_before);

    manager.stop_all().await;
}

fn beta_like() -> herd_core::AgentDeclaration {
    herd_core::AgentDeclaration {
        name: String::new(),
        command: String::new(),
        args: vec![],
        process_root: None,
        env: Default::default(),
        auto_restart: false,
        max_restarts: 0,
        start_with_daemon: false,
        description: None,
        color: None,
        system_prompt: None,
    }
}
