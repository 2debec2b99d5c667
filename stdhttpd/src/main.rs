//! Standalone process broker daemon.

use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use stdhttp_common::config::{self, parse_duration};
use stdhttp_common::output::Output;
use stdhttpd::{run_broker, spawn_signal_handlers, BrokerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "stdhttpd", version)]
#[command(about = "stdhttp process broker daemon")]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "STDHTTP_BROKER_ADDRESS", default_value = config::DEFAULT_BROKER_ADDRESS)]
    address: String,

    /// Where audit lines go: stdout, stderr, null or a file path
    #[arg(short = 'o', long, env = "STDHTTP_BROKER_STDOUT_OUTPUT", default_value = "stdout")]
    stdout_output: Output,

    /// How long a command wait is held open
    #[arg(short = 't', long, env = "STDHTTP_BROKER_WAIT_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    wait_timeout: Duration,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!(
        "{}",
        stdhttp_build_info::formatted_banner("stdhttpd", DAEMON_VERSION)
    );

    let shutdown = CancellationToken::new();
    spawn_signal_handlers(shutdown.clone());

    let config = BrokerConfig {
        address: cli.address,
        wait_timeout: cli.wait_timeout,
        audit_output: cli.stdout_output,
    };
    if let Err(err) = run_broker(config, shutdown).await {
        error!("{:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
