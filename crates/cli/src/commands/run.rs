use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use stdhttp_common::models::{SOURCE_STDERR, SOURCE_STDOUT};
use stdhttp_common::output::{Output, SharedWriter};
use stdhttp_common::ProcessRecord;
use stdhttpd_client::relay::relay_lines;
use stdhttpd_client::{BrokerClient, CommandLoop, TextRelay, TracingSink};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pause between attempts when the command cannot even be started.
const START_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Command name followed by its arguments. Empty means pipe mode.
    pub command: Vec<String>,
    pub stdout_url: Option<String>,
    pub stderr_url: Option<String>,
    pub stdout_output: Output,
    pub stderr_output: Output,
    pub persistent: bool,
    /// Empty disables broker registration.
    pub broker_url: String,
    pub broker_wait_timeout: Duration,
    pub broker_client_name: String,
}

impl RunConfig {
    fn process_record(&self) -> ProcessRecord {
        let (command_name, command_args) = match self.command.split_first() {
            Some((name, args)) => (name.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        ProcessRecord {
            pid: std::process::id(),
            client_name: self.broker_client_name.clone(),
            command_name,
            command_args,
            persistent: self.persistent,
            expired: false,
        }
    }
}

fn relay_for(url: Option<&str>, source: &'static str) -> Result<Option<TextRelay>> {
    match url.filter(|url| !url.is_empty()) {
        Some(url) => Ok(Some(TextRelay::new(url, source)?)),
        None => Ok(None),
    }
}

/// Runs the command (or pipes stdin) while attached to the broker.
///
/// Returns once the command is done for good or `cancel` fires. A broker
/// kill cancels `cancel` through the command loop.
pub async fn run(config: RunConfig, cancel: CancellationToken) -> Result<()> {
    let stdout = config
        .stdout_output
        .open_shared()
        .with_context(|| format!("Error creating stdout output {:?}", config.stdout_output))?;
    let stdout_relay = relay_for(config.stdout_url.as_deref(), SOURCE_STDOUT)?;

    let command_loop = if config.broker_url.is_empty() {
        None
    } else {
        let client = BrokerClient::new(&config.broker_url, config.broker_wait_timeout)?;
        let retry_interval = client.wait_timeout();
        let command_loop = CommandLoop::new(
            Arc::new(client),
            Arc::new(TracingSink),
            config.process_record(),
            retry_interval,
        );
        let cancel = cancel.clone();
        Some(tokio::spawn(async move { command_loop.run(&cancel).await }))
    };

    let outcome = match config.command.split_first() {
        Some((name, args)) => {
            let stderr = config.stderr_output.open_shared().with_context(|| {
                format!("Error creating stderr output {:?}", config.stderr_output)
            })?;
            let stderr_relay = relay_for(config.stderr_url.as_deref(), SOURCE_STDERR)?;
            let streams = Streams {
                stdout,
                stderr,
                stdout_relay,
                stderr_relay,
            };
            run_command(name, args, config.persistent, &streams, &cancel).await
        }
        None => {
            run_pipe(&stdout, stdout_relay.as_ref(), &cancel).await;
            Ok(())
        }
    };

    // The run is over either way; stop the command loop so it unregisters.
    cancel.cancel();
    if let Some(handle) = command_loop {
        if let Err(err) = handle.await {
            warn!(error = %err, "Command loop task failed");
        }
    }
    outcome
}

struct Streams {
    stdout: SharedWriter,
    stderr: SharedWriter,
    stdout_relay: Option<TextRelay>,
    stderr_relay: Option<TextRelay>,
}

async fn run_command(
    name: &str,
    args: &[String],
    persistent: bool,
    streams: &Streams,
    cancel: &CancellationToken,
) -> Result<()> {
    info!(name, ?args, "Starting command");
    let mut attempt = 0u64;
    loop {
        if attempt > 0 {
            if !persistent {
                return Ok(());
            }
            info!(name, ?args, "Restarting command");
        }
        attempt += 1;

        if cancel.is_cancelled() {
            info!(name, ?args, "Command cancelled");
            return Ok(());
        }

        let mut child = match Command::new(name)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                error!(name, ?args, error = %err, "Failed to start command");
                if persistent {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(START_RETRY_DELAY) => {}
                    }
                }
                continue;
            }
        };
        info!(name, ?args, pid = child.id(), "Command started");

        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("child stdout was not captured"))?;
        let child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("child stderr was not captured"))?;

        let (status, stdout_copy, stderr_copy) = tokio::join!(
            async {
                tokio::select! {
                    status = child.wait() => Some(status),
                    _ = cancel.cancelled() => None,
                }
            },
            relay_lines(
                child_stdout,
                &streams.stdout,
                streams.stdout_relay.as_ref(),
                cancel
            ),
            relay_lines(
                child_stderr,
                &streams.stderr,
                streams.stderr_relay.as_ref(),
                cancel
            ),
        );
        for copy in [stdout_copy, stderr_copy] {
            if let Err(err) = copy {
                warn!(name, error = %err, "Failed to copy command output");
            }
        }

        match status {
            None => {
                if let Err(err) = child.kill().await {
                    warn!(name, error = %err, "Failed to kill command");
                }
                info!(name, ?args, "Command cancelled");
                return Ok(());
            }
            Some(Ok(status)) if status.success() => info!(name, ?args, "Command succeeded"),
            Some(Ok(status)) => error!(name, ?args, %status, "Command failed"),
            Some(Err(err)) => error!(name, ?args, error = %err, "Command failed"),
        }
    }
}

async fn run_pipe(stdout: &SharedWriter, relay: Option<&TextRelay>, cancel: &CancellationToken) {
    info!("Piping stdin");
    match relay_lines(tokio::io::stdin(), stdout, relay, cancel).await {
        Err(err) => error!(error = %err, "Pipe failed"),
        Ok(()) if cancel.is_cancelled() => info!("Pipe cancelled"),
        Ok(()) => info!("Pipe succeeded"),
    }
}
