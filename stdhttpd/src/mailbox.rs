//! Single-slot command mailbox.

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug)]
enum Slot {
    Empty,
    Full(String),
    Closed,
}

/// Why [`Mailbox::try_send`] refused a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrySendError {
    /// A command is already queued and not yet delivered.
    Full,
    /// The mailbox has been closed.
    Closed,
}

/// Holds at most one undelivered command for a registered process.
///
/// Closing is one-way and idempotent. A pending command is discarded on
/// close; every receiver, current or future, then observes the close.
#[derive(Debug)]
pub struct Mailbox {
    slot: Mutex<Slot>,
    notify: Notify,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            notify: Notify::new(),
        }
    }

    /// Queues `command` if the slot is empty. Never blocks, never overwrites.
    pub fn try_send(&self, command: String) -> Result<(), TrySendError> {
        {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Empty => {}
                Slot::Full(_) => return Err(TrySendError::Full),
                Slot::Closed => return Err(TrySendError::Closed),
            }
            *slot = Slot::Full(command);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Closes the mailbox. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        {
            let mut slot = self.slot.lock();
            if matches!(*slot, Slot::Closed) {
                return false;
            }
            *slot = Slot::Closed;
        }
        self.notify.notify_waiters();
        true
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Closed)
    }

    /// Waits for the next command. Resolves to `None` once the mailbox is closed.
    ///
    /// Cancel-safe: the command is taken out of the slot in the same poll that
    /// returns it, so dropping the future never loses a command.
    pub async fn recv(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before looking at the slot so a send or close
            // landing in between still wakes us.
            notified.as_mut().enable();

            {
                let mut slot = self.slot.lock();
                match std::mem::replace(&mut *slot, Slot::Empty) {
                    Slot::Full(command) => return Some(command),
                    Slot::Closed => {
                        *slot = Slot::Closed;
                        return None;
                    }
                    Slot::Empty => {}
                }
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn delivers_queued_command_once() {
        let mailbox = Mailbox::new();
        mailbox.try_send("restart".into()).unwrap();
        assert_eq!(mailbox.recv().await.as_deref(), Some("restart"));

        let second = timeout(Duration::from_millis(50), mailbox.recv()).await;
        assert!(second.is_err(), "slot should be empty after delivery");
    }

    #[test]
    fn second_send_is_refused_not_overwritten() {
        let mailbox = Mailbox::new();
        mailbox.try_send("first".into()).unwrap();
        assert_eq!(mailbox.try_send("second".into()), Err(TrySendError::Full));
    }

    #[tokio::test]
    async fn send_wakes_blocked_receiver() {
        let mailbox = Arc::new(Mailbox::new());
        let receiver = tokio::spawn({
            let mailbox = mailbox.clone();
            async move { mailbox.recv().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        mailbox.try_send("ping".into()).unwrap();

        let received = timeout(Duration::from_secs(1), receiver)
            .await
            .expect("receiver woke up")
            .unwrap();
        assert_eq!(received.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn close_wakes_every_receiver() {
        let mailbox = Arc::new(Mailbox::new());
        let receivers: Vec<_> = (0..3)
            .map(|_| {
                let mailbox = mailbox.clone();
                tokio::spawn(async move { mailbox.recv().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(mailbox.close());

        for receiver in receivers {
            let received = timeout(Duration::from_secs(1), receiver)
                .await
                .expect("receiver woke up")
                .unwrap();
            assert_eq!(received, None);
        }
    }

    #[tokio::test]
    async fn close_is_idempotent_and_discards_pending() {
        let mailbox = Mailbox::new();
        mailbox.try_send("late".into()).unwrap();

        assert!(mailbox.close());
        assert!(!mailbox.close());
        assert!(mailbox.is_closed());
        assert_eq!(mailbox.recv().await, None);
        assert_eq!(mailbox.try_send("again".into()), Err(TrySendError::Closed));
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_swallow_command() {
        let mailbox = Mailbox::new();
        let abandoned = timeout(Duration::from_millis(20), mailbox.recv()).await;
        assert!(abandoned.is_err());

        mailbox.try_send("kept".into()).unwrap();
        assert_eq!(mailbox.recv().await.as_deref(), Some("kept"));
    }
}
