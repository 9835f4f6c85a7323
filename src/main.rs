//! feedswitch - Main Entry Point
//!
//! Loads the configuration (path from the first argument or
//! `FEEDSWITCH_CONFIG`), builds the graph and runs the control loop until a
//! signal, end of stream or a fatal fault.
//!
//! The media library is not linked into this binary, so the graph runs on the
//! simulated capability: a dry run that exercises configuration, graph
//! construction, switching and recovery end to end.

use feedswitch::{
    backend::SimulatedBackend,
    config::AppConfig,
    error::{Result, ResultExt},
    pipeline::{ControlHandle, NodeKind, Orchestrator, RunOutcome},
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    let _log_guard = init_logging();

    match run() {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(1)
        }
    }
}

/// Install the fmt layer, plus a daily rolling file when `FEEDSWITCH_LOG_DIR` is set.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,feedswitch=debug"));

    let (file_layer, guard) = match std::env::var_os("FEEDSWITCH_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "feedswitch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("FEEDSWITCH_CONFIG"))
        .map(PathBuf::from)
}

fn load_config() -> Result<AppConfig> {
    let mut config = match config_path() {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            AppConfig::load(&path)?
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            AppConfig::default()
        }
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// Simulated capability offering every configured factory.
fn dry_run_backend(config: &AppConfig) -> SimulatedBackend {
    NodeKind::all()
        .iter()
        .fold(SimulatedBackend::new(), |sim, kind| {
            sim.with_factory(config.elements.factory_for(*kind))
        })
}

fn run() -> Result<RunOutcome> {
    tracing::info!("Starting feedswitch {}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let topology = config.topology()?;
    tracing::info!(
        "{} live sources, output {}, overlay {}",
        topology.sources.len(),
        topology.output.uri,
        if topology.overlay.is_some() { "enabled" } else { "disabled" }
    );

    let backend = dry_run_backend(&config);
    let mut orchestrator =
        Orchestrator::new(&config, &topology, backend).context("Failed to build pipeline")?;

    let (handle, commands) = ControlHandle::new();
    let signal_handle = handle.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Signal received, shutting down");
        signal_handle.shutdown();
    }) {
        tracing::warn!("Failed to install signal handler: {}", e);
    }

    orchestrator.start().context("Failed to start pipeline")?;
    let outcome = orchestrator.run(commands);
    drop(handle);

    match &outcome {
        RunOutcome::Fatal { event, verdict } => tracing::error!(
            rule = verdict.rule,
            "Stopped on fatal fault: {}",
            event.message
        ),
        other => tracing::info!("Stopped: {:?}", other),
    }
    Ok(outcome)
}
