use anyhow::Result;
use stdhttpd::{run_broker, BrokerConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn broker(config: BrokerConfig, shutdown: CancellationToken) -> Result<()> {
    info!(address = %config.address, output = ?config.audit_output, "Starting process broker");
    run_broker(config, shutdown).await
}
