// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const BASIC: &str = r#"
agents:
  - name: scout
    command: /usr/bin/scout
    args: ["--verbose"]
    auto_restart: true
    max_restarts: 2
  - name: scribe
    command: scribe
    process_root: workers/scribe
    env:
      SCRIBE_MODE: fast
    description: takes notes
"#;

#[test]
fn parses_agents_in_declared_order() {
    let topo = Topology::parse(BASIC, PathBuf::from("/etc/herd"), Path::new("agents.yaml")).unwrap();
    let names: Vec<_> = topo.names().collect();
    assert_eq!(names, ["scout", "scribe"]);

    let scout = topo.get("scout").unwrap();
    assert_eq!(scout.command, "/usr/bin/scout");
    assert_eq!(scout.args, ["--verbose"]);
    assert!(scout.auto_restart);
    assert_eq!(scout.max_restarts, 2);
}

#[test]
fn duplicate_names_are_rejected() {
    let content = "agents:\n  - name: a\n  - name: a\n";
    let err = Topology::parse(content, PathBuf::new(), Path::new("agents.yaml")).unwrap_err();
    assert!(matches!(err, TopologyError::DuplicateName(name) if name == "a"));
}

#[test]
fn blank_names_are_rejected() {
    let content = "agents:\n  - name: '  '\n";
    let err = Topology::parse(content, PathBuf::new(), Path::new("agents.yaml")).unwrap_err();
    assert!(matches!(err, TopologyError::EmptyName));
}

#[test]
fn empty_file_parses_to_empty_topology() {
    let topo = Topology::parse("agents: []", PathBuf::new(), Path::new("agents.yaml")).unwrap();
    assert!(topo.is_empty());
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let err =
        Topology::parse("agents: {not a list", PathBuf::new(), Path::new("x.yaml")).unwrap_err();
    assert!(matches!(err, TopologyError::Parse { .. }));
}

#[test]
fn process_root_resolution() {
    let topo = Topology::parse(BASIC, PathBuf::from("/etc/herd"), Path::new("agents.yaml")).unwrap();

    // Relative root joins the config dir.
    let scribe = topo.get("scribe").unwrap();
    assert_eq!(
        topo.resolve_process_root(scribe),
        PathBuf::from("/etc/herd/workers/scribe")
    );

    // Absent root falls back to the config dir.
    let scout = topo.get("scout").unwrap();
    assert_eq!(topo.resolve_process_root(scout), PathBuf::from("/etc/herd"));
}

#[test]
fn absolute_process_root_passes_through() {
    let content = "agents:\n  - name: a\n    process_root: /srv/a\n";
    let topo = Topology::parse(content, PathBuf::from("/etc/herd"), Path::new("agents.yaml")).unwrap();
    let a = topo.get("a").unwrap();
    assert_eq!(topo.resolve_process_root(a), PathBuf::from("/srv/a"));
}

#[test]
fn identical_content_hashes_identically() {
    let a = Topology::parse(BASIC, PathBuf::new(), Path::new("agents.yaml")).unwrap();
    let b = Topology::parse(BASIC, PathBuf::new(), Path::new("agents.yaml")).unwrap();
    let c = Topology::parse("agents: []", PathBuf::new(), Path::new("agents.yaml")).unwrap();
    assert_eq!(a.content_hash(), b.content_hash());
    assert_ne!(a.content_hash(), c.content_hash());
}

#[test]
fn load_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agents.yaml");
    std::fs::write(&path, BASIC).unwrap();

    let topo = Topology::load(&path).unwrap();
    assert_eq!(topo.len(), 2);
    assert_eq!(topo.config_dir, dir.path());
}

#[test]
fn load_missing_file_is_a_read_error() {
    let err = Topology::load(Path::new("/nonexistent/agents.yaml")).unwrap_err();
    assert!(matches!(err, TopologyError::Read { .. }));
}
