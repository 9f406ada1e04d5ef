// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn requests_parse_from_tagged_json() {
    let req: Request = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
    assert_eq!(req, Request::Ping);

    let req: Request =
        serde_json::from_str(r#"{"type":"StartAgent","name":"scout"}"#).unwrap();
    assert_eq!(
        req,
        Request::StartAgent {
            name: "scout".to_string()
        }
    );
}

#[test]
fn command_request_defaults() {
    let req: Request =
        serde_json::from_str(r#"{"type":"Command","agent":"a","command":"ping"}"#).unwrap();
    match req {
        Request::Command {
            agent,
            command,
            args,
            working_dir,
            timeout_ms,
        } => {
            assert_eq!(agent, "a");
            assert_eq!(command, "ping");
            assert_eq!(args, None);
            assert_eq!(working_dir, "");
            assert_eq!(timeout_ms, None);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn submit_task_flattens_the_request() {
    let req: Request = serde_json::from_str(
        r#"{"type":"SubmitToolTask","kind":"tool","tool_name":"echo","session_id":"s1"}"#,
    )
    .unwrap();
    match req {
        Request::SubmitToolTask { request } => {
            assert_eq!(request.tool_name.as_deref(), Some("echo"));
            assert_eq!(request.session_id, "s1");
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[parameterized(
    agent_state = { r#"{"type":"WatchAgentState"}"#, true },
    all_tasks = { r#"{"type":"WatchAllTasks"}"#, true },
    one_task = { r#"{"type":"WatchToolTask","id":"t1"}"#, true },
    ping = { r#"{"type":"Ping"}"#, false },
    shutdown = { r#"{"type":"Shutdown"}"#, false },
)]
fn watch_classification(raw: &str, watch: bool) {
    let req: Request = serde_json::from_str(raw).unwrap();
    assert_eq!(req.is_watch(), watch);
}

#[test]
fn ok_envelope_is_bare_success() {
    let value = serde_json::to_value(Envelope::ok()).unwrap();
    assert_eq!(value, serde_json::json!({"success": true}));
}

#[test]
fn error_envelope_carries_the_message() {
    let value = serde_json::to_value(Envelope::err("boom")).unwrap();
    assert_eq!(value["success"], false);
    assert_eq!(value["error"], "boom");
}

#[test]
fn payload_fields_merge_into_the_envelope() {
    let value = serde_json::to_value(Envelope::with(SecretsPayload {
        names: vec!["a".to_string()],
    }))
    .unwrap();
    assert_eq!(value["success"], true);
    assert_eq!(value["names"][0], "a");
    assert!(value.get("error").is_none());
}

#[test]
fn envelope_round_trips_with_payload() {
    let envelope = Envelope::with(DeletedPayload { deleted: 3 });
    let line = serde_json::to_string(&envelope).unwrap();
    let back: Envelope = serde_json::from_str(&line).unwrap();
    assert!(back.success);
    assert_eq!(back.data.unwrap()["deleted"], 3);
}

#[test]
fn set_secret_mode_defaults_to_upsert() {
    let req: Request =
        serde_json::from_str(r#"{"type":"SetSecret","name":"k","value":"v"}"#).unwrap();
    match req {
        Request::SetSecret { mode, .. } => {
            assert_eq!(mode, crate::secrets::SecretMode::Upsert);
        }
        other => panic!("unexpected: {:?}", other),
    }
}
