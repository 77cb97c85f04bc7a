//! Command-line and environment configuration.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "field-worker")]
#[command(about = "Extract GRIB2 field metadata and values through the bridge pipeline")]
pub struct WorkerConfig {
    /// GRIB2 file to read
    #[arg(env = "FIELD_WORKER_FILE")]
    pub file: PathBuf,

    /// Only process this message (1-based, default: all)
    #[arg(short, long, env = "FIELD_WORKER_MESSAGE")]
    pub message: Option<usize>,

    /// Field to extract from each message (1-based)
    #[arg(short, long, env = "FIELD_WORKER_FIELD", default_value = "1")]
    pub field: i64,

    /// Parameter table JSON merged over the built-in codes
    #[arg(long, env = "FIELD_WORKER_TABLES")]
    pub tables: Option<PathBuf>,

    /// Number of leading payload values to include per field
    #[arg(long, env = "FIELD_WORKER_VALUES", default_value = "0")]
    pub values: usize,

    /// Log level
    #[arg(long, env = "FIELD_WORKER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "FIELD_WORKER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}
