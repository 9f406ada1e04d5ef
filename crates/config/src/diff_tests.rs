// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::{Path, PathBuf};

fn topo(content: &str) -> Topology {
    Topology::parse(content, PathBuf::from("/etc/herd"), Path::new("agents.yaml")).unwrap()
}

#[test]
fn identical_topologies_are_a_noop() {
    let content = "agents:\n  - name: a\n    command: echo\n";
    let diff = classify(&topo(content), &topo(content));
    assert!(diff.is_noop());
    assert_eq!(diff.unchanged, ["a"]);
}

#[test]
fn added_and_removed_are_classified() {
    let old = topo("agents:\n  - name: a\n  - name: b\n");
    let new = topo("agents:\n  - name: b\n  - name: c\n");

    let diff = classify(&old, &new);
    assert_eq!(diff.removed, ["a"]);
    assert_eq!(diff.added, ["c"]);
    assert_eq!(diff.unchanged, ["b"]);
}

#[test]
fn description_change_is_metadata_only() {
    let old = topo("agents:\n  - name: svc\n    command: run\n    description: a\n");
    let new = topo("agents:\n  - name: svc\n    command: run\n    description: b\n");

    let diff = classify(&old, &new);
    assert_eq!(diff.metadata_only, ["svc"]);
    assert!(diff.structural.is_empty());
}

#[test]
fn command_change_is_structural() {
    let old = topo("agents:\n  - name: svc\n    command: run\n");
    let new = topo("agents:\n  - name: svc\n    command: run2\n");

    let diff = classify(&old, &new);
    assert_eq!(diff.structural, ["svc"]);
    assert!(diff.metadata_only.is_empty());
}

#[test]
fn combined_metadata_and_structural_counts_as_structural() {
    let old = topo("agents:\n  - name: svc\n    command: run\n    description: a\n");
    let new = topo("agents:\n  - name: svc\n    command: run2\n    description: b\n");

    let diff = classify(&old, &new);
    assert_eq!(diff.structural, ["svc"]);
    assert!(diff.metadata_only.is_empty());
}

#[test]
fn diff_preserves_declared_order() {
    let old = topo("agents:\n  - name: a\n  - name: b\n  - name: c\n");
    let new = topo("agents:\n  - name: c\n  - name: x\n  - name: y\n");

    let diff = classify(&old, &new);
    assert_eq!(diff.removed, ["a", "b"]);
    assert_eq!(diff.added, ["x", "y"]);
}
