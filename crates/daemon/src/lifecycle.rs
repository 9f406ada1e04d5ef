// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: paths, the exclusive PID lock, startup wiring, and
//! the shutdown sequence.

use crate::env;
use crate::listener::ListenCtx;
use crate::secrets::{FileSecretBackend, SecretBackend};
use fs2::FileExt;
use herd_config::{Topology, TopologyError};
use herd_core::AgentStateEvent;
use herd_engine::{
    AgentToolRunner, Broker, ConfigWatcher, Manager, StateCallback, TaskQueue, TaskQueueConfig,
};
use herd_storage::{AgentDataStore, LogStore, TaskStore};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Notify;
use tracing::{info, warn};

/// Daemon configuration: resolved filesystem layout.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/herd).
    pub state_dir: PathBuf,
    /// Topology declaration file.
    pub config_path: PathBuf,
    /// Control-plane Unix socket.
    pub socket_path: PathBuf,
    /// PID lockfile.
    pub lock_path: PathBuf,
    /// Daemon log file.
    pub log_path: PathBuf,
    /// Per-agent counters document.
    pub agent_data_path: PathBuf,
    /// Per-agent log files directory.
    pub logs_path: PathBuf,
    /// Task record log.
    pub tasks_path: PathBuf,
    /// Default secret backend file.
    pub secrets_path: PathBuf,
}

impl Config {
    /// Resolve the layout from the environment.
    pub fn load() -> Result<Config, LifecycleError> {
        let state_dir = env::state_dir().ok_or(LifecycleError::NoStateDir)?;
        let config_path = env::config_path().ok_or(LifecycleError::NoStateDir)?;
        Ok(Config::at(state_dir, config_path))
    }

    /// Layout rooted at an explicit state dir (tests use this).
    pub fn at(state_dir: PathBuf, config_path: PathBuf) -> Config {
        Config {
            socket_path: state_dir.join("herdd.sock"),
            lock_path: state_dir.join("herdd.pid"),
            log_path: state_dir.join("herdd.log"),
            agent_data_path: state_dir.join("agent_data.json"),
            logs_path: state_dir.join("logs"),
            tasks_path: state_dir.join("tasks.wal"),
            secrets_path: state_dir.join("secrets.json"),
            state_dir,
            config_path,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] TopologyError),

    #[error("storage error: {0}")]
    Store(#[from] herd_storage::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon-wide resources, owned by one value constructed at startup and
/// disposed at shutdown.
pub struct Server {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub manager: Arc<Manager>,
    pub queue: Arc<TaskQueue>,
    pub agent_events: Arc<Broker<AgentStateEvent>>,
    pub store: Arc<AgentDataStore>,
    pub secrets: Arc<dyn SecretBackend>,
    pub shutdown: Arc<Notify>,
    pub start_time: Instant,
    watcher: Option<ConfigWatcher>,
}

/// Result of daemon startup: the server state plus the bound listeners
/// for the caller to spawn.
pub struct StartupResult {
    pub server: Server,
    pub listener: UnixListener,
    /// TCP listener with its auth token, when enabled by environment.
    pub tcp: Option<(TcpListener, String)>,
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish_non_exhaustive()
    }
}

/// Start the daemon: lock, load, bind.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Lock failures leave the running daemon's files alone.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    if let Some(parent) = config.config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Acquire the lock first; avoid truncating before we hold it, which
    // would wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // Topology: a missing file starts an empty daemon (the watcher picks
    // the file up once it appears); a malformed file is fatal.
    let topology = if config.config_path.exists() {
        Topology::load(&config.config_path)?
    } else {
        warn!(path = %config.config_path.display(), "no config file, starting with empty topology");
        Topology::empty(
            config
                .config_path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        )
    };

    // Stores.
    let store = Arc::new(AgentDataStore::open(&config.agent_data_path));
    let logs = Arc::new(LogStore::open(&config.logs_path));
    let tasks = Arc::new(TaskStore::open(&config.tasks_path)?);
    let secrets: Arc<dyn SecretBackend> =
        Arc::new(FileSecretBackend::open(&config.secrets_path));

    // Agent state fan-out: the manager's callback publishes into the
    // broker, which the listener streams to subscribers.
    let agent_events = Arc::new(Broker::<AgentStateEvent>::new());
    let callback: StateCallback = {
        let agent_events = Arc::clone(&agent_events);
        Arc::new(move |event| agent_events.publish(event))
    };

    let manager = Manager::new(
        config.config_path.clone(),
        topology,
        Arc::clone(&store),
        Arc::clone(&logs),
        callback,
    );

    let queue = TaskQueue::start(
        tasks,
        Arc::clone(&manager),
        Arc::new(AgentToolRunner::new(Arc::clone(&manager))),
        TaskQueueConfig::default(),
    );

    // Bind last, after everything else validated.
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;
    set_socket_mode(&config.socket_path, 0o660)?;

    // TCP requires both the port and the token; a port alone is refused.
    let tcp = match (env::tcp_port(), env::tcp_token()) {
        (Some(port), Some(token)) => {
            let addr = format!("127.0.0.1:{port}");
            let tcp_listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| LifecycleError::BindFailed(PathBuf::from(&addr), e))?;
            info!(%addr, "TCP control plane enabled");
            Some((tcp_listener, token))
        }
        (Some(_), None) => {
            warn!("HERD_TCP_PORT set without HERD_TCP_TOKEN; refusing TCP listener");
            None
        }
        _ => None,
    };

    let watcher = match ConfigWatcher::spawn(Arc::clone(&manager), config.config_path.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "config watcher failed to start; reload via control plane only");
            None
        }
    };

    Ok(StartupResult {
        server: Server {
            config: config.clone(),
            lock_file,
            manager,
            queue,
            agent_events,
            store,
            secrets,
            shutdown: Arc::new(Notify::new()),
            start_time: Instant::now(),
            watcher,
        },
        listener,
        tcp,
    })
}

impl Server {
    /// Context handed to listener tasks.
    pub fn listen_ctx(&self) -> Arc<ListenCtx> {
        Arc::new(ListenCtx {
            manager: Arc::clone(&self.manager),
            queue: Arc::clone(&self.queue),
            agent_events: Arc::clone(&self.agent_events),
            store: Arc::clone(&self.store),
            secrets: Arc::clone(&self.secrets),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
        })
    }

    /// Start declared and previously-running agents. Runs after the
    /// socket is accepting so clients are never blocked on slow starts.
    pub async fn resume_agents(&self) {
        self.manager.start_on_boot().await;
    }

    /// Shutdown sequence: snapshot the running set, stop agents while
    /// preserving resume flags, release queue and brokers, flush stores,
    /// remove the socket, and release the lock.
    pub async fn shutdown(&mut self) {
        info!("shutting down daemon");

        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }

        self.manager.cleanup().await;
        self.queue.shutdown();
        self.agent_events.shutdown();
        self.store.save();

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!(error = %e, "failed to remove PID file");
            }
        }
        // Lock released when self.lock_file drops.

        info!("daemon shutdown complete");
    }
}

fn set_socket_mode(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

/// Remove partially-created files after a failed startup.
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
