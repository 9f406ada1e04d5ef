// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Classification of a reloaded topology against the current one.

use crate::Topology;

/// Outcome of diffing two topologies, by agent name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TopologyDiff {
    /// In new, not in old.
    pub added: Vec<String>,
    /// In old, not in new.
    pub removed: Vec<String>,
    /// Only description, color, or system prompt differ.
    pub metadata_only: Vec<String>,
    /// Anything else differs; the process must be replaced.
    pub structural: Vec<String>,
    pub unchanged: Vec<String>,
}

impl TopologyDiff {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.metadata_only.is_empty()
            && self.structural.is_empty()
    }
}

/// Classify every agent named by either topology.
///
/// Order follows the new topology's declared order for added/changed
/// agents; removed agents follow the old topology's order.
pub fn classify(old: &Topology, new: &Topology) -> TopologyDiff {
    let mut diff = TopologyDiff::default();

    for name in old.names() {
        if new.get(name).is_none() {
            diff.removed.push(name.to_string());
        }
    }

    for decl in new.agents() {
        match old.get(&decl.name) {
            None => diff.added.push(decl.name.clone()),
            Some(prev) => {
                if !prev.same_structure(decl) {
                    diff.structural.push(decl.name.clone());
                } else if !prev.same_metadata(decl) {
                    diff.metadata_only.push(decl.name.clone());
                } else {
                    diff.unchanged.push(decl.name.clone());
                }
            }
        }
    }

    diff
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
