// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Herd Daemon (herdd)
//!
//! Background process that supervises declared agents and serves the
//! control plane.
//!
//! Architecture:
//! - Listener tasks: socket I/O, one task per connection
//! - Supervisors: one per agent, owning its child process
//! - Task queue: bounded worker pool over the durable task store

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use herd_daemon::lifecycle::{self, Config, LifecycleError, StartupResult};
use herd_daemon::listener::{Listener, TcpListenerTask};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("herdd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("herdd {}", env!("CARGO_PKG_VERSION"));
                println!("Herd Daemon - supervises declared agent processes");
                println!();
                println!("USAGE:");
                println!("    herdd");
                println!();
                println!("The daemon reads its topology from the agents config file");
                println!("(HERD_CONFIG or ~/.config/herd/agents.yaml) and listens on a");
                println!("Unix socket under the state directory for control requests.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: herdd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Rotate the log if it has grown too large, then mark this startup
    // attempt so a supervising CLI can find it.
    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;

    let log_guard = setup_logging(&config)?;

    info!("starting herd daemon");

    let StartupResult {
        mut server,
        listener,
        tcp,
    } = match lifecycle::startup(&config).await {
        Ok(result) => result,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("herdd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            // Write the error synchronously; the non-blocking tracing
            // writer may not flush before the process exits.
            write_startup_error(&config, &e);
            error!("failed to start daemon: {}", e);
            drop(log_guard);
            eprintln!("herdd: failed to start: {e}");
            std::process::exit(1);
        }
    };

    // Spawn listener tasks.
    let ctx = server.listen_ctx();
    tokio::spawn(Listener::new(listener, Arc::clone(&ctx)).run());
    if let Some((tcp_listener, token)) = tcp {
        tokio::spawn(TcpListenerTask::new(tcp_listener, token, Arc::clone(&ctx)).run());
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "daemon ready");

    // Signal ready for a waiting parent (CLI, service manager).
    println!("READY");

    // Resume declared and previously-running agents in the background;
    // each start holds a 3-second stability gate.
    let resume_server = server.listen_ctx();
    tokio::spawn(async move {
        resume_server.manager.start_on_boot().await;
    });

    tokio::select! {
        _ = server.shutdown.notified() => {
            info!("shutdown requested via control plane");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
        }
    }

    server.shutdown().await;
    info!("daemon stopped");
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (herdd.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `herdd.log` → `herdd.log.1` → `herdd.log.2` → `herdd.log.3`,
/// deleting the oldest. Best-effort: rotation failures are ignored so
/// the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Startup marker prefix written to the log before anything else.
const STARTUP_MARKER_PREFIX: &str = "--- herdd: starting (pid: ";

fn write_startup_marker(config: &Config) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

/// Write a startup error synchronously so it is visible even when the
/// process exits before the tracing writer flushes.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or("log path has no parent")?,
        config.log_path.file_name().ok_or("log path has no file name")?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
