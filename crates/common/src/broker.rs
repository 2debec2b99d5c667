use async_trait::async_trait;

use crate::error::{BrokerError, BrokerResult};
use crate::models::ProcessRecord;

/// Operations exposed by a process broker.
///
/// Implemented by the in-memory registry inside the daemon and by the HTTP
/// client that talks to it, so the protocol handler and the command loop can
/// be driven by either.
///
/// Every future returned here is cancel-safe: dropping it before completion
/// leaves no waiter behind and no command half-consumed.
#[async_trait]
pub trait ProcessBroker: Send + Sync {
    /// Registers `process`. Fails with `AlreadyExists` when the pid is live.
    async fn register(&self, process: ProcessRecord) -> BrokerResult<()>;

    /// Closes the pid's mailbox and forgets its record. Fails with `NotFound`.
    async fn kill(&self, pid: u32) -> BrokerResult<()>;

    /// Queues `command` without blocking. Fails with `NotFound` or `Busy`.
    async fn send_command(&self, pid: u32, command: String) -> BrokerResult<()>;

    /// Long-polls the pid's mailbox. Fails with `NotFound`, `Killed` or
    /// `WaitTimeout`.
    async fn wait_command(&self, pid: u32) -> BrokerResult<String>;

    /// Snapshot of every registered process with `expired` computed now.
    async fn list(&self) -> BrokerResult<Vec<ProcessRecord>>;

    /// Kill that treats an already forgotten pid as success.
    async fn unregister(&self, pid: u32) -> BrokerResult<()> {
        match self.kill(pid).await {
            Ok(()) | Err(BrokerError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
