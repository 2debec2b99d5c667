use anyhow::Result;
use stdhttpd::{run_debug, DebugConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn debug(config: DebugConfig, shutdown: CancellationToken) -> Result<()> {
    info!(
        address = %config.address,
        stdout = ?config.stdout_output,
        stderr = ?config.stderr_output,
        "Starting debug sink"
    );
    run_debug(config, shutdown).await
}
