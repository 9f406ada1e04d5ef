// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager: the collection of supervisors keyed by agent name, and the
//! diffed reconcile that brings the running topology into agreement with
//! a reloaded declaration file.
//!
//! Lock discipline: work is collected under the map lock, blocking actions
//! (stop, start) run outside it, and changes are committed by re-acquiring
//! the lock. Holding the lock across `stop()` would deadlock, because stop
//! publishes notifications that re-enter the manager's callback path.

use crate::supervisor::{StateCallback, Supervisor, SupervisorError};
use herd_config::{classify, Topology, TopologyError};
use herd_core::{AgentDeclaration, AgentSnapshot, AgentStateEvent, CommandDescriptor};
use herd_proto::{CommandResponse, ProgressFn};
use herd_storage::{AgentDataStore, LogStore};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for synchronous command invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after stopping agents during reconcile so reap notifications
/// drain before the map is rewritten.
const RECONCILE_DRAIN: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("agent {0} already exists")]
    AlreadyExists(String),

    #[error("config reload failed: {0}")]
    Reload(#[from] TopologyError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// What a reconcile pass did.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReloadSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub replaced: Vec<String>,
    pub metadata_updated: Vec<String>,
    pub restarted: Vec<String>,
}

struct ManagerInner {
    topology: Topology,
    agents: IndexMap<String, Arc<Supervisor>>,
}

/// Collection of supervisors plus the reconcile machinery.
pub struct Manager {
    inner: RwLock<ManagerInner>,
    config_path: PathBuf,
    store: Arc<AgentDataStore>,
    logs: Arc<LogStore>,
    callback: StateCallback,
}

impl Manager {
    /// Build supervisors for every declared agent. Nothing is started.
    pub fn new(
        config_path: PathBuf,
        topology: Topology,
        store: Arc<AgentDataStore>,
        logs: Arc<LogStore>,
        callback: StateCallback,
    ) -> Arc<Manager> {
        let mut agents = IndexMap::new();
        for decl in topology.agents() {
            let sup = Supervisor::new(
                decl.clone(),
                topology.config_dir.clone(),
                Arc::clone(&store),
                Arc::clone(&logs),
                Arc::clone(&callback),
            );
            agents.insert(decl.name.clone(), sup);
        }

        Arc::new(Manager {
            inner: RwLock::new(ManagerInner { topology, agents }),
            config_path,
            store,
            logs,
            callback,
        })
    }

    pub fn get_agent(&self, name: &str) -> Option<Arc<Supervisor>> {
        self.inner.read().agents.get(name).cloned()
    }

    /// All supervisors in declared order.
    pub fn all_agents(&self) -> Vec<Arc<Supervisor>> {
        self.inner.read().agents.values().cloned().collect()
    }

    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.all_agents().iter().map(|s| s.snapshot()).collect()
    }

    fn require(&self, name: &str) -> Result<Arc<Supervisor>, ManagerError> {
        self.get_agent(name)
            .ok_or_else(|| ManagerError::UnknownAgent(name.to_string()))
    }

    pub async fn start_agent(&self, name: &str) -> Result<(), ManagerError> {
        Ok(self.require(name)?.start().await?)
    }

    pub async fn stop_agent(&self, name: &str) -> Result<(), ManagerError> {
        Ok(self.require(name)?.stop().await?)
    }

    pub async fn restart_agent(&self, name: &str) -> Result<(), ManagerError> {
        Ok(self.require(name)?.restart().await?)
    }

    pub async fn stop_all(&self) {
        for sup in self.all_agents() {
            if let Err(e) = sup.stop().await {
                tracing::debug!(agent = sup.name(), error = %e, "stop-all skipped agent");
            }
        }
    }

    /// Stop every agent but keep the persisted resume flags, so the next
    /// daemon generation restores the running set.
    pub async fn stop_all_preserving_state(&self) {
        for sup in self.all_agents() {
            if let Err(e) = sup.stop_preserving_state().await {
                tracing::debug!(agent = sup.name(), error = %e, "stop-all skipped agent");
            }
        }
    }

    /// Persist the currently-running set for resume-on-next-start.
    pub fn snapshot_running_agents(&self) {
        let running: Vec<String> = self
            .all_agents()
            .iter()
            .filter(|s| s.status().is_running())
            .map(|s| s.name().to_string())
            .collect();
        self.store.snapshot_running_agents(&running);
    }

    /// Start agents declared `start_with_daemon` plus those the previous
    /// generation left running. Start failures are contained per agent.
    pub async fn start_on_boot(&self) {
        let previously_running = self.store.previously_running_agents();
        for sup in self.all_agents() {
            let wanted =
                sup.declaration().start_with_daemon || previously_running.contains(&sup.name().to_string());
            if !wanted {
                continue;
            }
            if let Err(e) = sup.start().await {
                warn!(agent = sup.name(), error = %e, "boot start failed");
            }
        }
    }

    /// Invoke a command synchronously. A missing timeout defaults to
    /// [`DEFAULT_COMMAND_TIMEOUT`].
    pub async fn invoke_command(
        &self,
        agent: &str,
        command: &str,
        args: Option<Value>,
        working_dir: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResponse, ManagerError> {
        let sup = self.require(agent)?;
        let timeout = match timeout {
            Some(t) if !t.is_zero() => t,
            _ => DEFAULT_COMMAND_TIMEOUT,
        };
        let ctx = CancellationToken::new();
        Ok(sup
            .send_command(&ctx, command, args, working_dir, Some(timeout))
            .await?)
    }

    /// Invoke a command with progress streaming. A non-positive timeout
    /// means unbounded: the request ends only on caller cancellation,
    /// response, or protocol termination.
    pub async fn invoke_command_async(
        &self,
        agent: &str,
        command: &str,
        args: Option<Value>,
        working_dir: &str,
        timeout: Option<Duration>,
        ctx: &CancellationToken,
        on_progress: Option<ProgressFn>,
    ) -> Result<CommandResponse, ManagerError> {
        let sup = self.require(agent)?;
        let timeout = timeout.filter(|t| !t.is_zero());
        Ok(sup
            .send_command_with_progress(ctx, command, args, working_dir, timeout, on_progress)
            .await?)
    }

    /// Every agent's registered commands, in declared agent order.
    pub fn list_commands(&self) -> Vec<(String, Vec<CommandDescriptor>)> {
        self.all_agents()
            .iter()
            .map(|s| (s.name().to_string(), s.registered_commands()))
            .collect()
    }

    /// Register a new agent at runtime.
    pub fn add_agent(&self, decl: AgentDeclaration) -> Result<(), ManagerError> {
        let name = decl.name.clone();
        {
            let mut inner = self.inner.write();
            if inner.agents.contains_key(&name) {
                return Err(ManagerError::AlreadyExists(name));
            }
            let sup = Supervisor::new(
                decl,
                inner.topology.config_dir.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.logs),
                Arc::clone(&self.callback),
            );
            inner.agents.insert(name.clone(), sup);
        }
        (self.callback)(AgentStateEvent::Added { name });
        Ok(())
    }

    /// Unregister an agent: stop its child, then drop its state and data.
    pub async fn remove_agent(&self, name: &str) -> Result<(), ManagerError> {
        let sup = self.require(name)?;
        if sup.status().is_running() {
            if let Err(e) = sup.stop().await {
                warn!(agent = name, error = %e, "stop before removal failed");
            }
        }
        self.inner.write().agents.shift_remove(name);
        self.store.delete_agent_data(name);
        self.logs.delete(name);
        (self.callback)(AgentStateEvent::Removed {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Reload the config file and reconcile the running topology.
    ///
    /// A parse failure aborts and preserves the current topology. An
    /// unchanged file is a no-op.
    pub async fn reload_config(&self) -> Result<ReloadSummary, ManagerError> {
        let new_topology = Topology::load(&self.config_path)?;
        self.reconcile(new_topology).await
    }

    async fn reconcile(&self, new_topology: Topology) -> Result<ReloadSummary, ManagerError> {
        // Phase 1 (read lock): classify and collect the stop list.
        let (diff, stop_list) = {
            let inner = self.inner.read();
            if inner.topology.content_hash() == new_topology.content_hash() {
                return Ok(ReloadSummary::default());
            }
            let diff = classify(&inner.topology, &new_topology);

            let mut stop_list: Vec<(Arc<Supervisor>, bool)> = Vec::new();
            for name in diff.structural.iter().chain(diff.removed.iter()) {
                if let Some(sup) = inner.agents.get(name) {
                    if sup.status().is_running() {
                        // Structural agents come back up after replacement.
                        let restart_after = diff.structural.contains(name);
                        stop_list.push((Arc::clone(sup), restart_after));
                    }
                }
            }
            (diff, stop_list)
        };

        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            structural = diff.structural.len(),
            metadata = diff.metadata_only.len(),
            "reconciling topology"
        );

        // Phase 2 (no lock): stop what must go down, then let reap
        // notifications drain.
        let mut was_running: Vec<String> = Vec::new();
        for (sup, restart_after) in &stop_list {
            match sup.stop().await {
                Ok(()) if *restart_after => was_running.push(sup.name().to_string()),
                Ok(()) => {}
                Err(e) => warn!(agent = sup.name(), error = %e, "reconcile stop failed"),
            }
        }
        if !stop_list.is_empty() {
            tokio::time::sleep(RECONCILE_DRAIN).await;
        }

        // Phase 3 (write lock): commit the new topology.
        let mut summary = ReloadSummary::default();
        let mut metadata_events = Vec::new();
        let mut to_start: Vec<Arc<Supervisor>> = Vec::new();
        {
            let mut inner = self.inner.write();

            for name in &diff.removed {
                inner.agents.shift_remove(name);
                self.store.delete_agent_data(name);
                self.logs.delete(name);
                summary.removed.push(name.clone());
            }

            let mut rebuilt = IndexMap::with_capacity(new_topology.len());
            for decl in new_topology.agents() {
                let name = &decl.name;
                if diff.structural.contains(name) {
                    // Replace with a fresh supervisor; persistent counters
                    // live in the store and carry over by name.
                    let sup = Supervisor::new(
                        decl.clone(),
                        new_topology.config_dir.clone(),
                        Arc::clone(&self.store),
                        Arc::clone(&self.logs),
                        Arc::clone(&self.callback),
                    );
                    if was_running.contains(name) {
                        to_start.push(Arc::clone(&sup));
                        summary.restarted.push(name.clone());
                    }
                    summary.replaced.push(name.clone());
                    rebuilt.insert(name.clone(), sup);
                } else if diff.metadata_only.contains(name) {
                    if let Some(sup) = inner.agents.get(name) {
                        sup.update_metadata(
                            decl.description.clone(),
                            decl.color.clone(),
                            decl.system_prompt.clone(),
                        );
                        metadata_events.push(AgentStateEvent::Metadata {
                            name: name.clone(),
                            description: decl.description.clone(),
                            color: decl.color.clone(),
                            system_prompt: decl.system_prompt.clone(),
                        });
                        summary.metadata_updated.push(name.clone());
                        rebuilt.insert(name.clone(), Arc::clone(sup));
                    }
                } else if diff.added.contains(name) {
                    let sup = Supervisor::new(
                        decl.clone(),
                        new_topology.config_dir.clone(),
                        Arc::clone(&self.store),
                        Arc::clone(&self.logs),
                        Arc::clone(&self.callback),
                    );
                    summary.added.push(name.clone());
                    rebuilt.insert(name.clone(), sup);
                } else if let Some(sup) = inner.agents.get(name) {
                    rebuilt.insert(name.clone(), Arc::clone(sup));
                }
            }

            // Agents added at runtime are not declared in either file;
            // they survive reloads untouched.
            for (name, sup) in inner.agents.iter() {
                if !rebuilt.contains_key(name) && !diff.removed.contains(name) {
                    rebuilt.insert(name.clone(), Arc::clone(sup));
                }
            }

            inner.agents = rebuilt;
            inner.topology = new_topology;
        }

        // Phase 4 (no lock): start replacements and emit queued events.
        for sup in to_start {
            if let Err(e) = sup.start().await {
                warn!(agent = sup.name(), error = %e, "post-reconcile start failed");
            }
        }
        for event in metadata_events {
            (self.callback)(event);
        }
        for name in &summary.added {
            (self.callback)(AgentStateEvent::Added { name: name.clone() });
        }
        for name in &summary.removed {
            (self.callback)(AgentStateEvent::Removed { name: name.clone() });
        }

        Ok(summary)
    }

    /// Shutdown path: snapshot the running set, then stop everything
    /// without clearing resume flags.
    pub async fn cleanup(&self) {
        self.snapshot_running_agents();
        self.stop_all_preserving_state().await;
    }

    #[cfg(test)]
    pub(crate) fn reconcile_with(
        &self,
        topology: Topology,
    ) -> impl std::future::Future<Output = Result<ReloadSummary, ManagerError>> + '_ {
        self.reconcile(topology)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
