//! GRIB2 field worker.
//!
//! Reads a GRIB2 file, runs each message through the bridge's
//! process/release cycle and prints one JSON object per extracted field.

mod config;
mod worker;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::{LogFormat, WorkerConfig};
use worker::Worker;

fn main() -> Result<()> {
    let config = WorkerConfig::parse();

    // Initialize tracing; stdout is reserved for results
    let level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }

    info!(file = %config.file.display(), field = config.field, "Starting field worker");

    let worker = Worker::from_config(&config)?;
    let results = worker.run_file(&config.file)?;

    info!(fields = results.len(), "Extraction complete");
    println!("{}", serde_json::to_string_pretty(&results)?);

    Ok(())
}
