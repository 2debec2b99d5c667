//! Broker registry service.
//!
//! One process-wide reader/writer lock guards the store. Existence probes and
//! listings take the read side; register, kill, send and the watermark refresh
//! at the start of a wait take the write side. The blocking part of a wait
//! happens on the mailbox with no lock held.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use stdhttp_common::{BrokerError, BrokerResult, ProcessBroker, ProcessRecord};

use crate::mailbox::TrySendError;
use crate::store::ProcessStore;

/// Added on top of the wait timeout when moving the expiry watermark.
const EXPIRY_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct ProcessRegistry {
    wait_timeout: Duration,
    store: RwLock<ProcessStore>,
}

impl ProcessRegistry {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            wait_timeout,
            store: RwLock::new(ProcessStore::new()),
        }
    }

    fn watermark(&self, now: Instant) -> Instant {
        now + self.wait_timeout + EXPIRY_GRACE
    }

    fn exists(&self, pid: u32) -> bool {
        self.store.read().contains(pid)
    }

    pub fn register(&self, process: ProcessRecord) -> BrokerResult<()> {
        if self.exists(process.pid) {
            return Err(BrokerError::AlreadyExists);
        }

        let mut store = self.store.write();
        let expires_at = self.watermark(Instant::now());
        if !store.insert(process, expires_at) {
            return Err(BrokerError::AlreadyExists);
        }
        Ok(())
    }

    /// Closes the mailbox and removes the record in one exclusive section.
    pub fn kill(&self, pid: u32) -> BrokerResult<()> {
        if !self.exists(pid) {
            return Err(BrokerError::NotFound);
        }

        let mut store = self.store.write();
        let entry = store.remove(pid).ok_or(BrokerError::NotFound)?;
        entry.mailbox.close();
        Ok(())
    }

    pub fn send_command(&self, pid: u32, command: String) -> BrokerResult<()> {
        if !self.exists(pid) {
            return Err(BrokerError::NotFound);
        }

        let store = self.store.write();
        let mailbox = store.mailbox(pid).ok_or(BrokerError::NotFound)?;
        mailbox.try_send(command).map_err(|err| match err {
            TrySendError::Full => BrokerError::Busy,
            // Unreachable while kill closes and removes under the same lock.
            TrySendError::Closed => BrokerError::NotFound,
        })
    }

    pub async fn wait_command(&self, pid: u32) -> BrokerResult<String> {
        if !self.exists(pid) {
            return Err(BrokerError::NotFound);
        }

        let mailbox = {
            let mut store = self.store.write();
            let expires_at = self.watermark(Instant::now());
            store.touch(pid, expires_at).ok_or(BrokerError::NotFound)?
        };

        match tokio::time::timeout(self.wait_timeout, mailbox.recv()).await {
            Ok(Some(command)) => Ok(command),
            Ok(None) => Err(BrokerError::Killed),
            Err(_) => Err(BrokerError::WaitTimeout),
        }
    }

    /// Registered processes ordered by pid.
    pub fn list(&self) -> Vec<ProcessRecord> {
        let mut processes = {
            let store = self.store.read();
            store.snapshot(Instant::now())
        };
        processes.sort_by_key(|process| process.pid);
        processes
    }
}

#[async_trait]
impl ProcessBroker for ProcessRegistry {
    async fn register(&self, process: ProcessRecord) -> BrokerResult<()> {
        ProcessRegistry::register(self, process)
    }

    async fn kill(&self, pid: u32) -> BrokerResult<()> {
        ProcessRegistry::kill(self, pid)
    }

    async fn send_command(&self, pid: u32, command: String) -> BrokerResult<()> {
        ProcessRegistry::send_command(self, pid, command)
    }

    async fn wait_command(&self, pid: u32) -> BrokerResult<String> {
        ProcessRegistry::wait_command(self, pid).await
    }

    async fn list(&self) -> BrokerResult<Vec<ProcessRecord>> {
        Ok(ProcessRegistry::list(self))
    }
}
