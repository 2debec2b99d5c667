use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use stdhttp_common::config::{self, API_PREFIX};
use stdhttp_common::output::{Output, SharedWriter};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::debug_sink::{self, DebugSinkState};
use crate::handlers::{self, HttpState};
use crate::registry::ProcessRegistry;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub address: String,
    pub wait_timeout: Duration,
    /// Destination of the per-request audit lines.
    pub audit_output: Output,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: config::DEFAULT_BROKER_ADDRESS.to_string(),
            wait_timeout: config::DEFAULT_WAIT_TIMEOUT,
            audit_output: Output::Stdout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub address: String,
    pub stdout_output: Output,
    pub stderr_output: Output,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            address: config::DEFAULT_DEBUG_ADDRESS.to_string(),
            stdout_output: Output::Stdout,
            stderr_output: Output::Stderr,
        }
    }
}

/// Broker protocol mounted under the API prefix.
pub fn broker_app(registry: Arc<ProcessRegistry>, audit: SharedWriter) -> Router {
    let state = HttpState::new(registry, audit);
    Router::new().nest(API_PREFIX, handlers::router(state))
}

/// A bound listener paired with the router it will serve.
pub struct Server {
    name: &'static str,
    listener: TcpListener,
    router: Router,
}

impl Server {
    pub async fn bind(name: &'static str, address: &str, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind {name} to {address}"))?;
        Ok(Self {
            name,
            listener,
            router,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Serves until `shutdown` is cancelled, then drains in-flight requests.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let Self {
            name,
            listener,
            router,
        } = self;
        if let Ok(addr) = listener.local_addr() {
            info!("{name} listening on {addr}");
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .with_context(|| format!("{name} encountered an unrecoverable error"))?;

        info!("{name} stopped");
        Ok(())
    }
}

pub async fn bind_broker(config: &BrokerConfig) -> Result<Server> {
    let wait_timeout = config::normalize_broker_wait_timeout(config.wait_timeout);
    let audit = config
        .audit_output
        .open_shared()
        .with_context(|| format!("Failed to open broker output {:?}", config.audit_output))?;

    let registry = Arc::new(ProcessRegistry::new(wait_timeout));
    info!(wait_timeout = ?wait_timeout, "Process broker configured");
    Server::bind("Process broker", &config.address, broker_app(registry, audit)).await
}

pub async fn run_broker(config: BrokerConfig, shutdown: CancellationToken) -> Result<()> {
    bind_broker(&config).await?.serve(shutdown).await
}

pub async fn bind_debug(config: &DebugConfig) -> Result<Server> {
    let stdout = config
        .stdout_output
        .open_shared()
        .with_context(|| format!("Failed to open stdout output {:?}", config.stdout_output))?;
    let stderr = config
        .stderr_output
        .open_shared()
        .with_context(|| format!("Failed to open stderr output {:?}", config.stderr_output))?;

    let router = debug_sink::router(DebugSinkState::new(stdout, stderr));
    Server::bind("Debug sink", &config.address, router).await
}

pub async fn run_debug(config: DebugConfig, shutdown: CancellationToken) -> Result<()> {
    bind_debug(&config).await?.serve(shutdown).await
}

/// Cancels `token` on Ctrl+C, and on SIGTERM where available.
pub fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C; shutting down");
            ctrl_c_token.cancel();
        }
    });

    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                return;
            }
        };
        tokio::spawn(async move {
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM; shutting down");
                token.cancel();
            }
        });
    }
}
