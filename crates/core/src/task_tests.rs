// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn pending_task() -> Task {
    Task::from_request(TaskRequest {
        kind: Some(TaskKind::Tool),
        tool_name: Some("echo".to_string()),
        ..Default::default()
    })
}

#[test]
fn from_request_starts_pending() {
    let task = pending_task();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.completed_at.is_none());
    assert!(task.progress.is_empty());
    assert!(!task.id.as_str().is_empty());
}

#[test]
fn transitions_follow_the_one_way_sequence() {
    let mut task = pending_task();
    assert!(task.transition(TaskStatus::Running));
    assert!(task.transition(TaskStatus::Completed));
    assert!(task.completed_at.is_some());

    // Terminal states are final.
    assert!(!task.transition(TaskStatus::Running));
    assert!(!task.transition(TaskStatus::Failed));
    assert_eq!(task.status, TaskStatus::Completed);
}

#[test]
fn pending_can_be_deleted_directly() {
    let mut task = pending_task();
    assert!(task.transition(TaskStatus::Deleted));
    assert!(task.completed_at.is_some());
}

#[test]
fn backwards_transition_is_rejected() {
    let mut task = pending_task();
    assert!(task.transition(TaskStatus::Running));
    assert!(!task.transition(TaskStatus::Pending));
    assert_eq!(task.status, TaskStatus::Running);
}

#[test]
fn progress_appends_and_touches_updated_at() {
    let mut task = pending_task();
    task.transition(TaskStatus::Running);
    let before = task.updated_at;

    let entry = task.push_progress("halfway", None, Some("working".to_string()));
    assert_eq!(task.progress.len(), 1);
    assert_eq!(entry.text, "halfway");
    assert!(task.updated_at >= before);
}

#[parameterized(
    pending = { TaskStatus::Pending, false },
    running = { TaskStatus::Running, false },
    completed = { TaskStatus::Completed, true },
    failed = { TaskStatus::Failed, true },
    deleted = { TaskStatus::Deleted, true },
)]
fn terminal_statuses(status: TaskStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn event_serializes_with_type_tag() {
    let task = pending_task();
    let event = TaskEvent::Submitted { task };
    let value: serde_json::Value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "submitted");
    assert_eq!(value["task"]["status"], "pending");
}

#[test]
fn progress_event_implies_running() {
    let mut task = pending_task();
    task.transition(TaskStatus::Running);
    let entry = task.push_progress("tick", None, None);
    let event = TaskEvent::Progress {
        id: task.id.clone(),
        entry,
    };
    assert_eq!(event.implied_status(), TaskStatus::Running);
    assert_eq!(event.task_id(), &task.id);
}

#[test]
fn task_round_trips_through_json() {
    let mut task = pending_task();
    task.transition(TaskStatus::Running);
    task.push_progress("tick", Some("{\"n\":1}".to_string()), None);

    let json = serde_json::to_string(&task).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(back.id, task.id);
    assert_eq!(back.status, TaskStatus::Running);
    assert_eq!(back.progress.len(), 1);
}
