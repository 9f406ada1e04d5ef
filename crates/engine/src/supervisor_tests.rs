// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use herd_core::AgentDeclaration;
use std::collections::HashMap;
use yare::parameterized;

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<AgentDataStore>,
    logs: Arc<LogStore>,
    events: Arc<Mutex<Vec<AgentStateEvent>>>,
}

impl Fixture {
    fn new() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AgentDataStore::open(dir.path().join("agent_data.json")));
        let logs = Arc::new(LogStore::open(dir.path().join("logs")));
        Fixture {
            _dir: dir,
            store,
            logs,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn supervisor(&self, decl: AgentDeclaration) -> Arc<Supervisor> {
        let events = Arc::clone(&self.events);
        let callback: StateCallback = Arc::new(move |event| {
            events.lock().push(event);
        });
        Supervisor::new(
            decl,
            PathBuf::from("/tmp"),
            Arc::clone(&self.store),
            Arc::clone(&self.logs),
            callback,
        )
    }

    fn statuses(&self) -> Vec<AgentStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                AgentStateEvent::Status { status, .. } => Some(*status),
                _ => None,
            })
            .collect()
    }
}

fn decl(name: &str, command: &str, args: &[&str]) -> AgentDeclaration {
    AgentDeclaration {
        name: name.to_string(),
        command: command.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        process_root: None,
        env: HashMap::new(),
        auto_restart: false,
        max_restarts: 0,
        start_with_daemon: false,
        description: None,
        color: None,
        system_prompt: None,
    }
}

#[parameterized(
    bare_name = { "cat", "cat" },
    absolute = { "/bin/cat", "/bin/cat" },
    relative_with_sep = { "bin/tool", "/work/bin/tool" },
)]
fn command_path_resolution(command: &str, expected: &str) {
    let resolved = resolve_command_path(command, Path::new("/work"));
    assert_eq!(resolved, PathBuf::from(expected));
}

#[tokio::test]
async fn failing_command_is_a_startup_crash() {
    let fx = Fixture::new();
    let sup = fx.supervisor(decl("echo-fail", "/bin/false", &[]));

    let started = std::time::Instant::now();
    let err = sup.start().await.unwrap_err();

    // The gate reports well before its 3-second ceiling.
    assert!(started.elapsed() < STABILITY_GATE);
    assert!(err.to_string().contains("startup"), "got: {err}");
    assert_eq!(sup.status(), AgentStatus::Crashed);
    assert_eq!(fx.store.agent_data("echo-fail").unwrap().crash_count, 1);
    assert_eq!(fx.statuses(), [AgentStatus::Crashed]);
}

#[tokio::test]
async fn long_lived_child_passes_the_gate_and_stops_cleanly() {
    let fx = Fixture::new();
    let sup = fx.supervisor(decl("sleeper", "/bin/sh", &["-c", "sleep 60"]));

    sup.start().await.unwrap();
    assert_eq!(sup.status(), AgentStatus::Running);
    assert_ne!(sup.pid(), 0);
    assert!(fx.store.agent_data("sleeper").unwrap().was_running);

    sup.stop().await.unwrap();
    assert_eq!(sup.status(), AgentStatus::Stopped);
    assert_eq!(sup.pid(), 0);
    let record = fx.store.agent_data("sleeper").unwrap();
    assert!(!record.was_running);
    assert_eq!(record.crash_count, 0);

    assert_eq!(fx.statuses(), [AgentStatus::Running, AgentStatus::Stopped]);
}

#[tokio::test]
async fn second_start_is_rejected_while_running() {
    let fx = Fixture::new();
    let sup = fx.supervisor(decl("solo", "/bin/sh", &["-c", "sleep 60"]));

    sup.start().await.unwrap();
    let err = sup.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::AlreadyRunning(_)));

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn stop_requires_a_running_agent() {
    let fx = Fixture::new();
    let sup = fx.supervisor(decl("idle", "/bin/sh", &["-c", "sleep 60"]));

    let err = sup.stop().await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning(_)));
}

#[tokio::test]
async fn preserving_stop_keeps_the_resume_flag() {
    let fx = Fixture::new();
    let sup = fx.supervisor(decl("keeper", "/bin/sh", &["-c", "sleep 60"]));

    sup.start().await.unwrap();
    sup.stop_preserving_state().await.unwrap();

    assert_eq!(sup.status(), AgentStatus::Stopped);
    assert!(fx.store.agent_data("keeper").unwrap().was_running);
}

#[tokio::test]
async fn child_protocol_messages_update_observable_state() {
    let fx = Fixture::new();
    // The child advertises a registry and a prompt, then stays alive.
    let script = concat!(
        r#"printf '%s\n' '{"type":"ready","pid":0,"version":"1.0"}'; "#,
        r#"printf '%s\n' '{"type":"command_registry","commands":[{"name":"ping"}]}'; "#,
        r#"printf '%s\n' '{"type":"system_prompt","text":"stay focused"}'; "#,
        r#"printf '%s\n' 'loose line'; "#,
        "sleep 60",
    );
    let sup = fx.supervisor(decl("chatty", "/bin/sh", &["-c", script]));

    sup.start().await.unwrap();

    let commands = sup.registered_commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].name, "ping");
    assert_eq!(sup.system_prompt().as_deref(), Some("stay focused"));

    // The non-frame line went to the raw-output handler and the log store.
    let logged = sup.logs(0).join("\n");
    assert!(logged.contains("loose line"), "logs: {logged}");

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn stderr_lines_are_captured() {
    let fx = Fixture::new();
    let sup = fx.supervisor(decl(
        "noisy",
        "/bin/sh",
        &["-c", "echo oops >&2; sleep 60"],
    ));

    sup.start().await.unwrap();
    let logged = sup.logs(0).join("\n");
    assert!(logged.contains("[stderr] oops"), "logs: {logged}");

    sup.stop().await.unwrap();
}

#[tokio::test]
async fn auto_restart_is_bounded_by_max_restarts() {
    let fx = Fixture::new();
    let mut d = decl("flaky", "/bin/false", &[]);
    d.auto_restart = true;
    d.max_restarts = 1;
    let sup = fx.supervisor(d);

    // First start crashes inside the gate and schedules one restart.
    let err = sup.start().await.unwrap_err();
    assert!(matches!(err, SupervisorError::StartupCrash { .. }));

    // Wait past the restart backoff for the single retry to crash too.
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(sup.restart_count(), 1);
    assert_eq!(sup.status(), AgentStatus::Crashed);
    assert_eq!(fx.store.agent_data("flaky").unwrap().crash_count, 2);

    // No further restarts: crash count stays put.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(fx.store.agent_data("flaky").unwrap().crash_count, 2);
}

#[tokio::test]
async fn declared_env_overlay_reaches_the_child() {
    let fx = Fixture::new();
    let mut d = decl(
        "env-check",
        "/bin/sh",
        &["-c", r#"printf '%s\n' "$GREETING" >&2; sleep 60"#],
    );
    d.env.insert("GREETING".to_string(), "hello-overlay".to_string());
    let sup = fx.supervisor(d);

    sup.start().await.unwrap();
    let logged = sup.logs(0).join("\n");
    assert!(logged.contains("hello-overlay"), "logs: {logged}");

    sup.stop().await.unwrap();
}
