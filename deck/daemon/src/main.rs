//! Deck Daemon - Control Surface Driver
//!
//! Long-running process that owns the control surface: takes the instance
//! lock, connects, renders the configured pages and turns touches, knob
//! turns and button presses into system actions.
//!
//! The USB transport is not part of this repository; the daemon drives the
//! in-memory virtual device sized from the `[device]` config section.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults ($XDG_CONFIG_HOME/deck/deck.toml)
//! deck-daemon
//!
//! # Custom config and lock path
//! deck-daemon --config ./deck.toml --lock-path /tmp/deck.lock
//!
//! # Verbose logging
//! RUST_LOG=debug deck-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown (a second signal is ignored).
//!   During startup they stop the lock wait or readiness wait and tear down
//!   whatever was already acquired.
//! - `SIGHUP`: Reload configuration, keeping the running one if it is invalid
//!
//! # Exit codes
//!
//! - `0`: clean shutdown, or another instance kept the device
//! - `1`: startup failed, or shutdown had to be forced

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info, warn};

use deck_core::config::default_config_path;
use deck_core::{
    load_config_from_path, ConfigOverrides, DeckConfig, DeckError, DeckRuntime, ShellControl,
    ShutdownCoordinator, ShutdownOutcome, Startup, VirtualDeck, VirtualDiscovery,
};

/// Deck Daemon - drives a touch/knob/LED control surface
#[derive(Parser, Debug)]
#[command(name = "deck-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "DECK_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Instance lock path
    #[arg(long, value_name = "PATH")]
    lock_path: Option<PathBuf>,

    /// Render interval in milliseconds
    #[arg(long, value_name = "MS")]
    render_interval_ms: Option<u64>,

    /// Readiness probes after connecting
    #[arg(long, value_name = "N")]
    ready_attempts: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "DECK_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref path) = self.lock_path {
            overrides = overrides.with_lock_path(path.clone());
        }
        if let Some(ms) = self.render_interval_ms {
            overrides = overrides.with_render_interval_ms(ms);
        }
        if let Some(attempts) = self.ready_attempts {
            overrides = overrides.with_ready_attempts(attempts);
        }
        overrides
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(default_config_path)
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("deck_daemon={level},deck_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Load the file, env and CLI layers
async fn load(args: &Args) -> Result<DeckConfig> {
    let mut config = load_config_from_path(args.config_path())
        .await
        .context("Failed to load configuration")?;
    args.overrides()
        .apply(&mut config)
        .context("Invalid command-line override")?;
    Ok(config)
}

fn print_remediation(error: &DeckError) {
    let hints = error.remediation();
    if hints.is_empty() {
        return;
    }
    eprintln!("deck-daemon: {error}");
    eprintln!("Things to check:");
    for hint in hints {
        eprintln!("  - {hint}");
    }
}

struct Signals {
    terminate: Signal,
    interrupt: Signal,
    hangup: Signal,
}

impl Signals {
    fn install() -> Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?,
            interrupt: signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
            hangup: signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);

    info!("Deck daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    let config = load(&args).await?;
    info!(
        source = %config.source(),
        pages = config.pages.len(),
        lock = ?config.lock.path,
        "Configuration ready"
    );

    let mut signals = Signals::install()?;
    let coordinator = Arc::new(ShutdownCoordinator::new(config.shutdown_timeout));

    let deck = Arc::new(VirtualDeck::new(config.device));
    let discovery = Arc::new(VirtualDiscovery::new(deck));
    let system = Arc::new(ShellControl::new());

    let interrupted = async {
        tokio::select! {
            _ = signals.terminate.recv() => info!("Received SIGTERM during startup"),
            _ = signals.interrupt.recv() => info!("Received SIGINT during startup"),
        }
    };
    let startup = DeckRuntime::start_until(config, discovery, system, interrupted).await;

    let mut runtime = match startup {
        Ok(Startup::Running(runtime)) => runtime,
        Ok(Startup::Conceded { pid }) => {
            info!(pid, "Another deck daemon owns the device, exiting");
            return Ok(ExitCode::SUCCESS);
        }
        Ok(Startup::Interrupted(teardown)) => {
            coordinator.begin();
            let outcome = coordinator
                .run(
                    async {
                        info!("Shutting down before startup finished...");
                    },
                    teardown,
                )
                .await;
            return Ok(exit_code(outcome));
        }
        Err(e) => {
            error!(error = %e, "Failed to start");
            print_remediation(&e);
            return Ok(ExitCode::FAILURE);
        }
    };

    loop {
        tokio::select! {
            _ = signals.terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown");
                if coordinator.begin() {
                    break;
                }
            }
            _ = signals.interrupt.recv() => {
                info!("Received SIGINT, initiating shutdown");
                if coordinator.begin() {
                    break;
                }
            }
            _ = signals.hangup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                match load(&args).await {
                    Ok(config) => {
                        if let Err(e) = runtime.reload(config).await {
                            warn!(error = %e, "Rejected new configuration, keeping the running one");
                        }
                    }
                    Err(e) => warn!(error = %e, "Rejected new configuration, keeping the running one"),
                }
            }
        }
    }

    // Further signals while tearing down are no-ops
    let watcher = Arc::clone(&coordinator);
    let repeat = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = signals.terminate.recv() => {}
                _ = signals.interrupt.recv() => {}
            }
            watcher.begin();
        }
    });

    let outcome = runtime
        .shutdown(&coordinator, async {
            info!("Shutting down...");
        })
        .await;
    repeat.abort();

    Ok(exit_code(outcome))
}

fn exit_code(outcome: ShutdownOutcome) -> ExitCode {
    match outcome {
        ShutdownOutcome::Completed | ShutdownOutcome::AlreadyRunning => {
            info!("Deck daemon stopped cleanly");
            ExitCode::SUCCESS
        }
        ShutdownOutcome::Forced => {
            error!("Deck daemon stopped with a forced shutdown");
            ExitCode::FAILURE
        }
    }
}
