// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Resolve state directory: HERD_STATE_DIR > XDG_STATE_HOME/herd > ~/.local/state/herd
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("HERD_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("herd"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/herd"))
}

/// Resolve config file: HERD_CONFIG > XDG_CONFIG_HOME/herd/agents.yaml > ~/.config/herd/agents.yaml
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("HERD_CONFIG") {
        return Some(PathBuf::from(path));
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join("herd/agents.yaml"));
    }
    dirs::home_dir().map(|home| home.join(".config/herd/agents.yaml"))
}

/// TCP listener port (HERD_TCP_PORT), if set and parseable.
pub fn tcp_port() -> Option<u16> {
    std::env::var("HERD_TCP_PORT").ok().and_then(|s| s.parse().ok())
}

/// TCP auth token (HERD_TCP_TOKEN), if set and non-empty.
pub fn tcp_token() -> Option<String> {
    std::env::var("HERD_TCP_TOKEN").ok().filter(|t| !t.is_empty())
}
