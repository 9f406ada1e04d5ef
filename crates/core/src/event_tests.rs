// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::AgentStatus;

#[test]
fn status_event_serializes_with_kind_tag() {
    let event = AgentStateEvent::Status {
        name: "svc".to_string(),
        status: AgentStatus::Running,
        pid: 42,
        error: None,
    };
    let value: serde_json::Value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["kind"], "status");
    assert_eq!(value["status"], "running");
    assert_eq!(value["pid"], 42);
    assert!(value.get("error").is_none());
}

#[test]
fn agent_name_is_reachable_on_every_variant() {
    let events = vec![
        AgentStateEvent::Status {
            name: "a".to_string(),
            status: AgentStatus::Stopped,
            pid: 0,
            error: None,
        },
        AgentStateEvent::Metadata {
            name: "a".to_string(),
            description: Some("d".to_string()),
            color: None,
            system_prompt: None,
        },
        AgentStateEvent::Commands {
            name: "a".to_string(),
            commands: vec![],
        },
        AgentStateEvent::Sections {
            name: "a".to_string(),
            sections: vec![],
        },
        AgentStateEvent::Added {
            name: "a".to_string(),
        },
        AgentStateEvent::Removed {
            name: "a".to_string(),
        },
    ];
    for event in events {
        assert_eq!(event.agent_name(), "a");
    }
}

#[test]
fn metadata_event_round_trips() {
    let event = AgentStateEvent::Metadata {
        name: "svc".to_string(),
        description: Some("b".to_string()),
        color: Some("cyan".to_string()),
        system_prompt: None,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: AgentStateEvent = serde_json::from_str(&json).unwrap();
    match back {
        AgentStateEvent::Metadata { description, .. } => {
            assert_eq!(description.as_deref(), Some("b"));
        }
        other => panic!("unexpected variant: {:?}", other),
    }
}
