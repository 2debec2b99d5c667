use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::ValueEnum;
use stdhttp_common::output::Output;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Picks the filter: explicit level first, then `RUST_LOG`, then `info`.
pub fn level_filter(log_level: Option<&str>) -> EnvFilter {
    if let Some(level) = log_level {
        match level.to_lowercase().as_str() {
            "off" | "silent" => EnvFilter::new("off"),
            "error" => EnvFilter::new("error"),
            "warn" | "warning" => EnvFilter::new("warn"),
            "info" => EnvFilter::new("info"),
            "debug" => EnvFilter::new("debug"),
            "trace" => EnvFilter::new("trace"),
            _ => {
                eprintln!("Warning: Invalid log level '{}', using 'info'", level);
                EnvFilter::new("info")
            }
        }
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber writing to `output`.
pub fn init_logging(log_level: Option<&str>, format: LogFormat, output: &Output) -> Result<()> {
    let filter = level_filter(log_level);
    let writer = Mutex::new(
        output
            .open()
            .with_context(|| format!("Failed to open log output {:?}", output))?,
    );
    let ansi = matches!(output, Output::Stdout | Output::Stderr);

    match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(true)
            .try_init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .try_init(),
    }
    .map_err(|err| anyhow::anyhow!("Failed to install logger: {err}"))
}
