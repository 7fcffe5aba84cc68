//! CLI entry point for bench_sweep
//!
//! # Usage
//!
//! Identify both instruments:
//! ```bash
//! bench_sweep identify --config bench_sweep.toml
//! ```
//!
//! Sweep generator channel 2 against the simulated bench:
//! ```bash
//! bench_sweep sweep --channel CH2 --mock
//! ```
//!
//! Ctrl-C during a sweep requests a cooperative stop; the partial report is still printed.

use anyhow::{bail, Context, Result};
use bench_sweep::config::BenchConfig;
use bench_sweep::instrument::GeneratorChannel;
use bench_sweep::sim::SimulatedBench;
use bench_sweep::status::StatusEvent;
use bench_sweep::sweep::SweepOutcome;
use bench_sweep::{logging, Bench, HardwareConnector, InstrumentConnector, SweepEngine, SweepPlan};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "bench_sweep")]
#[command(about = "Oscilloscope and function generator bench automation", long_about = None)]
struct Cli {
    /// Configuration file (defaults to bench_sweep.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated bench instead of real instruments
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect both instruments and print their identification strings
    Identify,

    /// Run one sweep test on a generator channel
    Sweep {
        /// Generator channel under test (CH1 or CH2)
        #[arg(long, default_value = "CH1")]
        channel: GeneratorChannel,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BenchConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => BenchConfig::load().context("Failed to load configuration")?,
    };
    config.mock |= cli.mock;
    config.validate().context("Invalid configuration")?;
    logging::init_from_config(&config).context("Failed to initialize logging")?;

    let connector: Arc<dyn InstrumentConnector> = if config.mock {
        Arc::new(SimulatedBench::new())
    } else {
        Arc::new(HardwareConnector::from_config(&config))
    };
    let bench = Arc::new(Bench::new(connector));

    let result = match cli.command {
        Commands::Identify => identify(&bench).await,
        Commands::Sweep { channel } => {
            run_sweep(bench.clone(), config.sweep.clone(), channel).await
        }
    };

    bench.disconnect_oscilloscope().await;
    if let Err(err) = bench.disconnect_generator().await {
        warn!("Generator shutdown failed: {}", err);
    }
    result
}

async fn identify(bench: &Bench) -> Result<()> {
    bench
        .connect_oscilloscope(None)
        .await
        .context("Failed to connect to oscilloscope")?;
    let scope_id = bench.oscilloscope().await?.identify().await?;
    println!("Oscilloscope:       {}", scope_id);

    bench
        .connect_generator(None)
        .await
        .context("Failed to connect to function generator")?;
    let generator_id = bench.generator().await?.identify().await?;
    println!("Function generator: {}", generator_id);
    Ok(())
}

async fn run_sweep(bench: Arc<Bench>, plan: SweepPlan, channel: GeneratorChannel) -> Result<()> {
    let engine = SweepEngine::new(bench, plan);
    let (tx, mut rx) = mpsc::unbounded_channel::<StatusEvent>();

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", event);
        }
    });

    let mut handle = engine.spawn(channel, Arc::new(tx));
    let report = tokio::select! {
        joined = &mut handle => joined?,
        _ = tokio::signal::ctrl_c() => {
            engine.stop();
            handle.await?
        }
    };
    printer.await?;

    println!();
    println!("{}", report);

    if let SweepOutcome::Failed(reason) = &report.outcome {
        bail!("Sweep failed: {}", reason);
    }
    Ok(())
}
