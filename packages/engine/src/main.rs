// packages/engine/src/main.rs
//! Sensor Guard
//!
//! Replays captured sensor readings through the listener interception layer
//! and reports what the consumer actually received.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensorguard_engine::interception::{build_transform, EventTransform, ListenerRegistry};
use sensorguard_engine::observability::{init_metrics, init_tracing};
use sensorguard_engine::replay::{load_directory, ReplaySession, ReportFormat};
use sensorguard_engine::utils::config::EngineConfig;
use sensorguard_engine::BuildInfo;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sensorguard", version, about = "Sensor listener interception engine")]
struct Cli {
    /// Configuration file (overrides SENSORGUARD_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay ACG.csv / GYRO.csv captures through the interception layer
    Replay {
        /// Capture file or directory holding captures
        #[arg(short, long)]
        input: PathBuf,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format: json or yaml
        #[arg(short, long, default_value = "json")]
        format: ReportFormat,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    // Initialize observability (tracing, metrics)
    init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    info!("Starting Sensor Guard {}", BuildInfo::current());

    match cli.command {
        Command::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        Command::Replay {
            input,
            output,
            format,
        } => replay(config, input, output, format).await,
    }
}

async fn replay(
    config: EngineConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    format: ReportFormat,
) -> Result<()> {
    let recordings = load_directory(&input)
        .with_context(|| format!("Failed to load captures from {}", input.display()))?;

    let transform = build_transform(&config.transform);
    info!("Using transform '{}'", transform.name());
    let registry = Arc::new(ListenerRegistry::from_config(&config.registry, transform));

    let session = ReplaySession::new(config.replay.clone(), registry);
    let stop = session.stop_handle();

    let mut task = tokio::task::spawn_blocking(move || session.run(&recordings));

    let report = tokio::select! {
        joined = &mut task => joined.context("Replay task failed")??,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            warn!("Received shutdown signal, stopping replay...");
            stop.store(true, Ordering::Relaxed);
            task.await.context("Replay task failed")??
        }
    };

    let rendered = report.render(format)?;
    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
