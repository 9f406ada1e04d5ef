// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent supervisor: owns one child process, its stdio protocol
//! attachment, crash accounting, and bounded auto-restart.

use chrono::Utc;
use herd_core::{
    AgentDeclaration, AgentSnapshot, AgentStateEvent, AgentStatus, CommandDescriptor,
    SidebarSection,
};
use herd_proto::{CommandResponse, ProgressFn, Protocol, ProtocolHandler};
use herd_storage::{AgentDataStore, LogStore};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Post-launch window during which a child exit is a startup failure.
pub const STABILITY_GATE: Duration = Duration::from_secs(3);

/// Grace period after SIGTERM before escalating to SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Grace period after SIGKILL before giving up on the wait.
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Delay before a crash-triggered restart.
const RESTART_BACKOFF: Duration = Duration::from_secs(2);

/// Callback the manager wires at construction; the supervisor publishes
/// every state change through it after releasing its own locks.
pub type StateCallback = Arc<dyn Fn(AgentStateEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("agent {0} is already running")]
    AlreadyRunning(String),

    #[error("agent {0} is not running")]
    NotRunning(String),

    #[error("failed to spawn agent {name}: {message}")]
    Spawn { name: String, message: String },

    #[error("agent {name} crashed during startup (exit code {code})")]
    StartupCrash { name: String, code: i32 },

    #[error(transparent)]
    Protocol(#[from] herd_proto::ProtocolError),
}

/// Mutable observable state, guarded by the per-agent lock.
struct SupervisorState {
    status: AgentStatus,
    /// Reported pid; the `ready` handshake may override it.
    pid: u32,
    /// Pid the child was spawned with. Process-group signals and reaper
    /// staleness checks use this one, regardless of overrides.
    launch_pid: u32,
    started_at: Option<chrono::DateTime<Utc>>,
    /// Child-advertised overrides; cleared on stop.
    child_description: Option<String>,
    child_system_prompt: Option<String>,
    custom_sections: Vec<SidebarSection>,
    /// Last advertised registry; survives restarts so clients keep
    /// seeing commands while the child is briefly down.
    registered_commands: Vec<CommandDescriptor>,
    last_invoke_dir: Option<PathBuf>,
}

/// Supervisor for exactly one declared agent.
pub struct Supervisor {
    name: String,
    decl: RwLock<AgentDeclaration>,
    config_dir: PathBuf,
    state: Mutex<SupervisorState>,
    protocol: Mutex<Option<Arc<Protocol>>>,
    store: Arc<AgentDataStore>,
    logs: Arc<LogStore>,
    callback: StateCallback,
    /// Crash-triggered restarts in this supervisor's lifetime.
    restart_count: AtomicU32,
    exit_notify: Arc<Notify>,
    /// Weak self-handle for reaper and restart tasks.
    self_weak: Weak<Supervisor>,
}

impl Supervisor {
    pub fn new(
        decl: AgentDeclaration,
        config_dir: PathBuf,
        store: Arc<AgentDataStore>,
        logs: Arc<LogStore>,
        callback: StateCallback,
    ) -> Arc<Supervisor> {
        Arc::new_cyclic(|self_weak| Supervisor {
            name: decl.name.clone(),
            decl: RwLock::new(decl),
            config_dir,
            state: Mutex::new(SupervisorState {
                status: AgentStatus::Stopped,
                pid: 0,
                launch_pid: 0,
                started_at: None,
                child_description: None,
                child_system_prompt: None,
                custom_sections: Vec::new(),
                registered_commands: Vec::new(),
                last_invoke_dir: None,
            }),
            protocol: Mutex::new(None),
            store,
            logs,
            callback,
            restart_count: AtomicU32::new(0),
            exit_notify: Arc::new(Notify::new()),
            self_weak: self_weak.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> AgentStatus {
        self.state.lock().status
    }

    pub fn pid(&self) -> u32 {
        self.state.lock().pid
    }

    pub fn declaration(&self) -> AgentDeclaration {
        self.decl.read().clone()
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::Relaxed)
    }

    /// Effective description: the child's advertisement wins over the
    /// declared one.
    pub fn description(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .child_description
            .clone()
            .or_else(|| self.decl.read().description.clone())
    }

    pub fn system_prompt(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .child_system_prompt
            .clone()
            .or_else(|| self.decl.read().system_prompt.clone())
    }

    pub fn color(&self) -> Option<String> {
        self.decl.read().color.clone()
    }

    pub fn custom_sections(&self) -> Vec<SidebarSection> {
        self.state.lock().custom_sections.clone()
    }

    pub fn registered_commands(&self) -> Vec<CommandDescriptor> {
        self.state.lock().registered_commands.clone()
    }

    pub fn logs(&self, max_lines: usize) -> Vec<String> {
        self.logs.logs(&self.name, max_lines)
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let decl = self.decl.read().clone();
        let state = self.state.lock();
        AgentSnapshot {
            name: self.name.clone(),
            status: state.status,
            pid: state.pid,
            started_at: state.started_at,
            restart_count: self.restart_count.load(Ordering::Relaxed),
            description: state.child_description.clone().or(decl.description),
            color: decl.color,
            system_prompt: state.child_system_prompt.clone().or(decl.system_prompt),
            registered_commands: state.registered_commands.clone(),
            custom_sections: state.custom_sections.clone(),
            last_invoke_dir: state.last_invoke_dir.clone(),
        }
    }

    /// Replace metadata in place (declaration changed without a restart).
    pub fn update_metadata(&self, description: Option<String>, color: Option<String>, system_prompt: Option<String>) {
        let mut decl = self.decl.write();
        decl.description = description;
        decl.color = color;
        decl.system_prompt = system_prompt;
    }

    /// Launch the child and hold the stability gate.
    ///
    /// Returns once the child has survived [`STABILITY_GATE`], or with an
    /// error if it exited before the gate elapsed.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let decl = self.decl.read().clone();
        let working_dir = self.resolve_working_dir(&decl);
        let command_path = resolve_command_path(&decl.command, &working_dir);

        let mut cmd = tokio::process::Command::new(&command_path);
        cmd.args(&decl.args)
            .current_dir(&working_dir)
            // Parent environment is inherited; the overlay wins on collision.
            .envs(&decl.env)
            // Own process group so the whole subtree can be signalled.
            .process_group(0)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Spawn while holding the state lock: at most one live child.
        let (pid, mut child, stdin, stdout, stderr) = {
            let mut state = self.state.lock();
            if matches!(state.status, AgentStatus::Running | AgentStatus::Stopping) {
                return Err(SupervisorError::AlreadyRunning(self.name.clone()));
            }

            let mut child = cmd.spawn().map_err(|e| SupervisorError::Spawn {
                name: self.name.clone(),
                message: e.to_string(),
            })?;
            let pid = child.id().unwrap_or(0);
            let stdin = child.stdin.take();
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            let (Some(stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
                return Err(SupervisorError::Spawn {
                    name: self.name.clone(),
                    message: "missing stdio pipes".to_string(),
                });
            };

            state.status = AgentStatus::Running;
            state.pid = pid;
            state.launch_pid = pid;
            state.started_at = Some(Utc::now());
            (pid, child, stdin, stdout, stderr)
        };

        self.store.record_start(&self.name);
        info!(agent = %self.name, pid, "agent started");

        // Stderr capture: every line lands in the log store.
        let logs = Arc::clone(&self.logs);
        let log_name = self.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logs.append(&log_name, &format!("[stderr] {line}"));
            }
        });

        // Attach the framed protocol to stdout/stdin.
        let handler = Arc::new(SupervisorProtocolHandler {
            supervisor: self.self_weak.clone(),
        });
        let protocol = Protocol::start(stdout, stdin, handler);
        *self.protocol.lock() = Some(protocol);

        // Single-slot early-exit channel for the stability gate.
        let (exit_tx, mut exit_rx) = mpsc::channel::<i32>(1);

        let Some(sup) = self.self_weak.upgrade() else {
            return Err(SupervisorError::NotRunning(self.name.clone()));
        };
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!(agent = %sup.name, error = %e, "wait on child failed");
                    -1
                }
            };
            let protocol = sup.protocol.lock().take();
            if let Some(protocol) = protocol {
                protocol.stop().await;
            }
            // Non-blocking: the gate may have already returned.
            let _ = exit_tx.try_send(code);
            sup.handle_exit(pid, code);
            sup.exit_notify.notify_waiters();
        });

        tokio::select! {
            code = exit_rx.recv() => {
                let code = code.unwrap_or(-1);
                Err(SupervisorError::StartupCrash {
                    name: self.name.clone(),
                    code,
                })
            }
            _ = tokio::time::sleep(STABILITY_GATE) => {
                self.publish(AgentStateEvent::Status {
                    name: self.name.clone(),
                    status: AgentStatus::Running,
                    pid,
                    error: None,
                });
                Ok(())
            }
        }
    }

    /// Reaper path: the child exited while we believed it alive.
    fn handle_exit(&self, pid: u32, code: i32) {
        enum Disposition {
            Stale,
            Requested,
            Graceful,
            Crashed,
        }

        let disposition = {
            let mut state = self.state.lock();
            if state.launch_pid != pid {
                Disposition::Stale
            } else {
                match state.status {
                    // Stop() owns the final transition.
                    AgentStatus::Stopping => Disposition::Requested,
                    AgentStatus::Running => {
                        state.pid = 0;
                        state.launch_pid = 0;
                        state.started_at = None;
                        state.custom_sections.clear();
                        state.child_description = None;
                        state.child_system_prompt = None;
                        if code == 0 {
                            state.status = AgentStatus::Stopped;
                            Disposition::Graceful
                        } else {
                            state.status = AgentStatus::Crashed;
                            Disposition::Crashed
                        }
                    }
                    _ => Disposition::Stale,
                }
            }
        };

        match disposition {
            Disposition::Stale | Disposition::Requested => {}
            Disposition::Graceful => {
                self.store.record_stop(&self.name);
                info!(agent = %self.name, "agent exited cleanly");
                self.publish(AgentStateEvent::Status {
                    name: self.name.clone(),
                    status: AgentStatus::Stopped,
                    pid: 0,
                    error: None,
                });
            }
            Disposition::Crashed => {
                self.store.record_crash(&self.name);
                warn!(agent = %self.name, code, "agent crashed");
                self.publish(AgentStateEvent::Status {
                    name: self.name.clone(),
                    status: AgentStatus::Crashed,
                    pid: 0,
                    error: Some(format!("exit code {code}")),
                });
                self.maybe_auto_restart();
            }
        }
    }

    fn maybe_auto_restart(&self) {
        let decl = self.decl.read().clone();
        if !decl.auto_restart {
            return;
        }
        let max = decl.effective_max_restarts();
        let used = self.restart_count.load(Ordering::Relaxed);
        if used >= max {
            info!(agent = %self.name, max, "restart budget exhausted, not restarting");
            return;
        }
        self.restart_count.fetch_add(1, Ordering::Relaxed);
        self.store.record_restart(&self.name);

        let Some(sup) = self.self_weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(RESTART_BACKOFF).await;
            info!(agent = %sup.name, attempt = sup.restart_count.load(Ordering::Relaxed), "auto-restarting crashed agent");
            if let Err(e) = sup.start().await {
                warn!(agent = %sup.name, error = %e, "auto-restart failed");
            }
        });
    }

    /// Stop the child: SIGTERM the group, escalate to SIGKILL after the
    /// grace period. Clears the persisted resume flag.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        self.stop_inner(false).await
    }

    /// Like [`stop`](Self::stop), but keeps the resume flag so the next
    /// daemon generation starts this agent again.
    pub async fn stop_preserving_state(&self) -> Result<(), SupervisorError> {
        self.stop_inner(true).await
    }

    async fn stop_inner(&self, preserve: bool) -> Result<(), SupervisorError> {
        let pid = {
            let mut state = self.state.lock();
            if state.status != AgentStatus::Running {
                return Err(SupervisorError::NotRunning(self.name.clone()));
            }
            state.status = AgentStatus::Stopping;
            state.launch_pid
        };

        // Arm the exit waiter before signalling so a fast exit cannot slip
        // between the signal and the wait.
        {
            let mut notified = std::pin::pin!(self.exit_notify.notified());
            notified.as_mut().enable();
            signal_group(pid, Signal::SIGTERM);
            if tokio::time::timeout(TERM_GRACE, &mut notified).await.is_err() {
                warn!(agent = %self.name, pid, "no exit after SIGTERM, escalating to SIGKILL");
                let mut killed = std::pin::pin!(self.exit_notify.notified());
                killed.as_mut().enable();
                signal_group(pid, Signal::SIGKILL);
                let _ = tokio::time::timeout(KILL_GRACE, &mut killed).await;
            }
        }

        {
            let mut state = self.state.lock();
            state.status = AgentStatus::Stopped;
            state.pid = 0;
            state.launch_pid = 0;
            state.started_at = None;
            state.custom_sections.clear();
            state.child_description = None;
            state.child_system_prompt = None;
        }

        if preserve {
            self.store.record_stop_preserving(&self.name);
        } else {
            self.store.record_stop(&self.name);
        }

        info!(agent = %self.name, "agent stopped");
        self.publish(AgentStateEvent::Status {
            name: self.name.clone(),
            status: AgentStatus::Stopped,
            pid: 0,
            error: None,
        });
        Ok(())
    }

    pub async fn restart(&self) -> Result<(), SupervisorError> {
        if let Err(e) = self.stop().await {
            debug!(agent = %self.name, error = %e, "restart: stop was a no-op");
        }
        self.start().await
    }

    /// Send a command over the stdio protocol and wait for its response.
    pub async fn send_command(
        &self,
        ctx: &CancellationToken,
        name: &str,
        args: Option<Value>,
        working_dir: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResponse, SupervisorError> {
        self.send_command_with_progress(ctx, name, args, working_dir, timeout, None)
            .await
    }

    pub async fn send_command_with_progress(
        &self,
        ctx: &CancellationToken,
        name: &str,
        args: Option<Value>,
        working_dir: &str,
        timeout: Option<Duration>,
        on_progress: Option<ProgressFn>,
    ) -> Result<CommandResponse, SupervisorError> {
        let protocol = self
            .protocol
            .lock()
            .clone()
            .ok_or_else(|| SupervisorError::NotRunning(self.name.clone()))?;

        self.note_invocation_dir(working_dir);

        let resp = protocol
            .send_command(ctx, name, args, working_dir, timeout, on_progress)
            .await?;
        Ok(resp)
    }

    /// Forward a lifecycle event to the child.
    pub async fn send_lifecycle_event(
        &self,
        event: &str,
        data: Option<Value>,
    ) -> Result<(), SupervisorError> {
        let protocol = self
            .protocol
            .lock()
            .clone()
            .ok_or_else(|| SupervisorError::NotRunning(self.name.clone()))?;
        protocol.send_lifecycle_event(event, data).await?;
        Ok(())
    }

    /// Track the caller's working directory; when it changes, tell the
    /// child asynchronously. The first observation seeds silently.
    fn note_invocation_dir(&self, working_dir: &str) {
        if working_dir.is_empty() {
            return;
        }
        let abs = std::path::absolute(working_dir)
            .unwrap_or_else(|_| PathBuf::from(working_dir));

        let change = {
            let mut state = self.state.lock();
            match &state.last_invoke_dir {
                None => {
                    state.last_invoke_dir = Some(abs);
                    None
                }
                Some(old) if *old != abs => {
                    let old = old.clone();
                    state.last_invoke_dir = Some(abs.clone());
                    Some((old, abs))
                }
                Some(_) => None,
            }
        };

        if let Some((old, new)) = change {
            let protocol = self.protocol.lock().clone();
            if let Some(protocol) = protocol {
                tokio::spawn(async move {
                    let data = serde_json::json!({
                        "old": old.display().to_string(),
                        "new": new.display().to_string(),
                    });
                    if let Err(e) = protocol
                        .send_lifecycle_event("invocation_directory_changed", Some(data))
                        .await
                    {
                        debug!(error = %e, "failed to notify invocation directory change");
                    }
                });
            }
        }
    }

    /// Resolve the child's working directory per the declaration.
    fn resolve_working_dir(&self, decl: &AgentDeclaration) -> PathBuf {
        match &decl.process_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => self.config_dir.join(root),
            None => self.config_dir.clone(),
        }
    }

    fn publish(&self, event: AgentStateEvent) {
        (self.callback)(event);
    }
}

/// Join a relative command containing a path separator onto the working
/// directory; otherwise pass it through for PATH lookup.
fn resolve_command_path(command: &str, working_dir: &Path) -> PathBuf {
    let path = Path::new(command);
    if path.is_absolute() || !command.contains(std::path::MAIN_SEPARATOR) {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

/// SIGTERM/SIGKILL the child's process group.
fn signal_group(pid: u32, signal: Signal) {
    if pid == 0 {
        return;
    }
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        debug!(pid, ?signal, error = %e, "process group signal failed");
    }
}

/// Routes protocol messages back into the supervisor. Holds a weak
/// reference; the manager owns the supervisor's lifetime.
struct SupervisorProtocolHandler {
    supervisor: Weak<Supervisor>,
}

impl SupervisorProtocolHandler {
    fn with<F: FnOnce(&Arc<Supervisor>)>(&self, f: F) {
        if let Some(sup) = self.supervisor.upgrade() {
            f(&sup);
        }
    }
}

impl ProtocolHandler for SupervisorProtocolHandler {
    fn on_ready(&self, pid: u32, version: &str) {
        self.with(|sup| {
            if pid != 0 {
                let mut state = sup.state.lock();
                if state.status == AgentStatus::Running && state.pid != pid {
                    debug!(agent = %sup.name, old = state.pid, new = pid, "ready overrides pid");
                    state.pid = pid;
                }
            }
            debug!(agent = %sup.name, pid, version, "agent ready");
        });
    }

    fn on_log(&self, level: &str, message: &str, fields: Option<&Value>) {
        self.with(|sup| {
            let line = match fields {
                Some(fields) => format!("[{level}] {message} {fields}"),
                None => format!("[{level}] {message}"),
            };
            sup.logs.append(&sup.name, &line);
        });
    }

    fn on_event(&self, name: &str, data: Option<&Value>) {
        self.with(|sup| {
            sup.publish(AgentStateEvent::Event {
                name: sup.name.clone(),
                event: name.to_string(),
                data: data.cloned(),
            });
        });
    }

    fn on_error(&self, message: &str, code: Option<i64>) {
        self.with(|sup| {
            let line = match code {
                Some(code) => format!("[error] {message} (code {code})"),
                None => format!("[error] {message}"),
            };
            sup.logs.append(&sup.name, &line);
        });
    }

    fn on_system_prompt(&self, text: &str) {
        self.with(|sup| {
            sup.state.lock().child_system_prompt = Some(text.to_string());
            sup.publish(AgentStateEvent::Metadata {
                name: sup.name.clone(),
                description: sup.description(),
                color: sup.color(),
                system_prompt: Some(text.to_string()),
            });
        });
    }

    fn on_description(&self, text: &str) {
        self.with(|sup| {
            sup.state.lock().child_description = Some(text.to_string());
            sup.publish(AgentStateEvent::Metadata {
                name: sup.name.clone(),
                description: Some(text.to_string()),
                color: sup.color(),
                system_prompt: sup.system_prompt(),
            });
        });
    }

    fn on_sidebar_section(&self, section: SidebarSection) {
        self.with(|sup| {
            let sections = {
                let mut state = sup.state.lock();
                match state.custom_sections.iter_mut().find(|s| s.id == section.id) {
                    Some(existing) => *existing = section,
                    None => state.custom_sections.push(section),
                }
                state.custom_sections.clone()
            };
            sup.publish(AgentStateEvent::Sections {
                name: sup.name.clone(),
                sections,
            });
        });
    }

    fn on_command_registry(&self, commands: &[CommandDescriptor]) {
        self.with(|sup| {
            sup.state.lock().registered_commands = commands.to_vec();
            sup.publish(AgentStateEvent::Commands {
                name: sup.name.clone(),
                commands: commands.to_vec(),
            });
        });
    }

    fn on_raw_output(&self, line: &str) {
        self.with(|sup| {
            sup.logs.append(&sup.name, line);
        });
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
