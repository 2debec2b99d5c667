use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use stdhttp_common::ProcessRecord;

use crate::mailbox::Mailbox;

/// Stored state for one registered process.
#[derive(Debug)]
pub struct ProcessEntry {
    pub record: ProcessRecord,
    pub mailbox: Arc<Mailbox>,
    pub expires_at: Instant,
}

/// Registry backing storage. No locking of its own; the registry service
/// decides what runs under which lock.
#[derive(Debug, Default)]
pub struct ProcessStore {
    processes: HashMap<u32, ProcessEntry>,
}

impl ProcessStore {
    pub fn new() -> Self {
        Self {
            processes: HashMap::new(),
        }
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.processes.contains_key(&pid)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Inserts a record with a fresh open mailbox. Returns `false` and leaves
    /// the existing entry alone when the pid is already present.
    pub fn insert(&mut self, record: ProcessRecord, expires_at: Instant) -> bool {
        if self.contains(record.pid) {
            return false;
        }
        let pid = record.pid;
        self.processes.insert(
            pid,
            ProcessEntry {
                record: ProcessRecord {
                    expired: false,
                    ..record
                },
                mailbox: Arc::new(Mailbox::new()),
                expires_at,
            },
        );
        true
    }

    #[cfg(test)]
    pub fn get(&self, pid: u32) -> Option<&ProcessEntry> {
        self.processes.get(&pid)
    }

    pub fn mailbox(&self, pid: u32) -> Option<Arc<Mailbox>> {
        self.processes.get(&pid).map(|entry| entry.mailbox.clone())
    }

    /// Moves the expiry watermark and hands back the mailbox.
    pub fn touch(&mut self, pid: u32, expires_at: Instant) -> Option<Arc<Mailbox>> {
        let entry = self.processes.get_mut(&pid)?;
        entry.expires_at = expires_at;
        Some(entry.mailbox.clone())
    }

    pub fn remove(&mut self, pid: u32) -> Option<ProcessEntry> {
        self.processes.remove(&pid)
    }

    /// Copies every record, flagging those whose watermark is before `now`.
    pub fn snapshot(&self, now: Instant) -> Vec<ProcessRecord> {
        self.processes
            .values()
            .map(|entry| ProcessRecord {
                expired: entry.expires_at < now,
                ..entry.record.clone()
            })
            .collect()
    }
}
