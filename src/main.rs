// src/main.rs - Run an acquisition session against the simulated controller
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use memlog_rs::{Config, SessionController, SimulatedDevice};

#[derive(Debug, Parser)]
#[command(name = "memlog-host", version, about = "Memory log feedback acquisition")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long to acquire before pausing
    #[arg(short, long, default_value_t = 500)]
    duration_ms: u64,

    /// Write plot data (cycle, position, cycle, velocity) to this file
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    tracing::info!("Starting memlog-host {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => Config::load(path).map_err(|e| {
            tracing::error!("Failed to load config from '{}': {}", path.display(), e);
            e
        })?,
        None => Config::default(),
    };

    tracing::info!(
        "Simulated controller: {} channels, {} samples per batch",
        config.device.channels,
        config.device.samples_per_batch
    );

    let device = Arc::new(SimulatedDevice::from_config(&config.device));
    let mut session = SessionController::new(device, config.acquisition.clone())?;

    let Some(channel) = session.start()? else {
        tracing::error!("No free memory log channel");
        return Err("no free memory log channel".into());
    };

    std::thread::sleep(Duration::from_millis(args.duration_ms));

    let summary = session.pause(channel)?.unwrap_or_else(|| session.summary());

    if let Some(path) = &args.export {
        let rows = session.export_plot_data(path)?;
        tracing::info!("Exported {} rows to {}", rows, path.display());
    }

    if !session.stop(channel)? {
        tracing::warn!("Channel {} could not be closed", channel);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}
