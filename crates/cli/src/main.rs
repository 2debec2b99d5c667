use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stdhttp_cli::commands::{self, KillTarget, RunConfig};
use stdhttp_cli::logging::{init_logging, LogFormat};
use stdhttp_common::config::{self, parse_duration};
use stdhttp_common::output::Output;
use stdhttpd::{spawn_signal_handlers, BrokerConfig, DebugConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "stdhttp", version, about = "The HTTP pipe for standard streams", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error, off). Overrides RUST_LOG if set.
    #[arg(short = 'l', long, global = true, env = "STDHTTP_LOG_LEVEL", value_name = "LEVEL")]
    log_level: Option<String>,
    /// Log format
    #[arg(short = 'f', long, global = true, env = "STDHTTP_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
    /// Log destination: stdout, stderr, null or a file path
    #[arg(long, global = true, env = "STDHTTP_LOG_OUTPUT", default_value = "stderr")]
    log_output: Output,
    /// Shortcut for --log-level debug
    #[arg(short = 'd', long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command (or pipe stdin) attached to the broker
    Run {
        /// URL receiving stdout lines
        #[arg(short = 'O', long, env = "STDHTTP_STDOUT_URL")]
        stdout_url: Option<String>,
        /// URL receiving stderr lines
        #[arg(short = 'E', long, env = "STDHTTP_STDERR_URL")]
        stderr_url: Option<String>,
        /// Local stdout destination
        #[arg(short = 'o', long, env = "STDHTTP_STDOUT_OUTPUT", default_value = "stdout")]
        stdout_output: Output,
        /// Local stderr destination
        #[arg(short = 'e', long, env = "STDHTTP_STDERR_OUTPUT", default_value = "stderr")]
        stderr_output: Output,
        /// Relay both streams to the local debug sink
        #[arg(long)]
        debug_urls: bool,
        /// Restart the command whenever it exits
        #[arg(short = 'p', long, env = "STDHTTP_PERSISTENT")]
        persistent: bool,
        /// Broker endpoint; empty disables registration
        #[arg(short = 'b', long, env = "STDHTTP_BROKER_URL", default_value = config::DEFAULT_BROKER_URL)]
        broker_url: String,
        /// How long the broker holds a command wait open
        #[arg(short = 't', long, env = "STDHTTP_BROKER_WAIT_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
        broker_wait_timeout: Duration,
        /// Name shown by `stdhttp list`
        #[arg(short = 'n', long, env = "STDHTTP_BROKER_CLIENT_NAME", default_value = "")]
        broker_client_name: String,
        /// Command and arguments; omit to pipe stdin
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Print lines posted by `run --stdout-url/--stderr-url`
    Debug {
        #[arg(short = 'a', long, env = "STDHTTP_DEBUG_ADDRESS", default_value = config::DEFAULT_DEBUG_ADDRESS)]
        address: String,
        #[arg(short = 'o', long, env = "STDHTTP_DEBUG_STDOUT_OUTPUT", default_value = "stdout")]
        stdout_output: Output,
        #[arg(short = 'e', long, env = "STDHTTP_DEBUG_STDERR_OUTPUT", default_value = "stderr")]
        stderr_output: Output,
    },
    /// Serve the process broker
    Broker {
        #[arg(short = 'a', long, env = "STDHTTP_BROKER_ADDRESS", default_value = config::DEFAULT_BROKER_ADDRESS)]
        address: String,
        /// Where audit lines go
        #[arg(short = 'o', long, env = "STDHTTP_BROKER_STDOUT_OUTPUT", default_value = "stdout")]
        stdout_output: Output,
        #[arg(short = 't', long, env = "STDHTTP_BROKER_WAIT_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
        wait_timeout: Duration,
    },
    /// List registered processes
    List {
        #[arg(short = 'b', long, env = "STDHTTP_BROKER_URL", default_value = config::DEFAULT_BROKER_URL)]
        broker_url: String,
        #[arg(short = 'o', long, env = "STDHTTP_STDOUT_OUTPUT", default_value = "stdout")]
        stdout_output: Output,
    },
    /// Kill a process by pid, or every process matching a glob pattern
    Kill {
        #[arg(value_name = "PID|PATTERN")]
        target: String,
        #[arg(short = 'b', long, env = "STDHTTP_BROKER_URL", default_value = config::DEFAULT_BROKER_URL)]
        broker_url: String,
        #[arg(short = 'o', long, env = "STDHTTP_STDOUT_OUTPUT", default_value = "stdout")]
        stdout_output: Output,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Some("debug")
    } else {
        cli.log_level.as_deref()
    };
    if let Err(err) = init_logging(log_level, cli.log_format, &cli.log_output) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
    debug!("{}", stdhttp_build_info::formatted_banner("stdhttp", VERSION));

    let shutdown = CancellationToken::new();
    spawn_signal_handlers(shutdown.clone());

    let code = match dispatch(cli.command, shutdown).await {
        Ok(()) => 0,
        Err(err) => {
            error!("{:#}", err);
            1
        }
    };
    // A pending stdin read would otherwise keep the runtime alive.
    std::process::exit(code);
}

async fn dispatch(command: Commands, shutdown: CancellationToken) -> Result<()> {
    match command {
        Commands::Run {
            stdout_url,
            stderr_url,
            stdout_output,
            stderr_output,
            debug_urls,
            persistent,
            broker_url,
            broker_wait_timeout,
            broker_client_name,
            command,
        } => {
            let (stdout_url, stderr_url) = if debug_urls {
                (
                    Some(config::DEFAULT_DEBUG_URL.to_string()),
                    Some(config::DEFAULT_DEBUG_URL.to_string()),
                )
            } else {
                (stdout_url, stderr_url)
            };
            let run_config = RunConfig {
                command,
                stdout_url,
                stderr_url,
                stdout_output,
                stderr_output,
                persistent,
                broker_url,
                broker_wait_timeout,
                broker_client_name,
            };
            commands::run(run_config, shutdown).await
        }
        Commands::Debug {
            address,
            stdout_output,
            stderr_output,
        } => {
            let debug_config = DebugConfig {
                address,
                stdout_output,
                stderr_output,
            };
            commands::debug(debug_config, shutdown).await
        }
        Commands::Broker {
            address,
            stdout_output,
            wait_timeout,
        } => {
            let broker_config = BrokerConfig {
                address,
                wait_timeout,
                audit_output: stdout_output,
            };
            commands::broker(broker_config, shutdown).await
        }
        Commands::List {
            broker_url,
            stdout_output,
        } => commands::list(&broker_url, &stdout_output).await,
        Commands::Kill {
            target,
            broker_url,
            stdout_output,
        } => commands::kill(&broker_url, &KillTarget::parse(&target), &stdout_output).await,
    }
}
