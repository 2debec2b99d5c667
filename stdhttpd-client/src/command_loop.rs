//! Long-poll loop that keeps one managed process attached to the broker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use stdhttp_common::{BrokerError, ProcessBroker, ProcessRecord};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Receives the non-empty commands delivered to a managed process.
///
/// Each delivery runs on its own task, so a slow sink never holds up the
/// next long poll.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn deliver(&self, pid: u32, command: &str) -> Result<()>;
}

/// Sink that only records delivered commands in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl CommandSink for TracingSink {
    async fn deliver(&self, pid: u32, command: &str) -> Result<()> {
        info!(pid, command, "Command received");
        Ok(())
    }
}

/// Why [`CommandLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The caller cancelled the run.
    Cancelled,
    /// The broker revoked the process; the run token was cancelled too.
    Killed,
}

#[derive(Debug)]
enum LoopState {
    Unregistered,
    Waiting,
    Delivering(String),
    Reconnecting,
    Stopped(LoopExit),
}

pub struct CommandLoop {
    broker: Arc<dyn ProcessBroker>,
    sink: Arc<dyn CommandSink>,
    process: ProcessRecord,
    retry_interval: Duration,
}

impl CommandLoop {
    /// `retry_interval` spaces out retries after failures; normally the
    /// broker's wait timeout.
    pub fn new(
        broker: Arc<dyn ProcessBroker>,
        sink: Arc<dyn CommandSink>,
        process: ProcessRecord,
        retry_interval: Duration,
    ) -> Self {
        Self {
            broker,
            sink,
            process,
            retry_interval,
        }
    }

    pub fn pid(&self) -> u32 {
        self.process.pid
    }

    /// Drives the loop until `cancel` fires or the broker kills the process.
    ///
    /// A kill cancels `cancel` so the rest of the run winds down with it. The
    /// process is unregistered on the way out in either case, after in-flight
    /// deliveries had one shutdown bound to finish.
    pub async fn run(&self, cancel: &CancellationToken) -> LoopExit {
        let mut deliveries = JoinSet::new();
        let mut state = LoopState::Unregistered;
        let exit = loop {
            state = match state {
                LoopState::Unregistered => self.register(cancel).await,
                LoopState::Waiting => self.wait(cancel).await,
                LoopState::Delivering(command) => self.deliver(command, &mut deliveries),
                LoopState::Reconnecting => self.reconnect(cancel).await,
                LoopState::Stopped(exit) => break exit,
            };
        };

        self.finish_deliveries(deliveries).await;
        self.unregister().await;
        exit
    }

    fn shutdown_bound(&self) -> Duration {
        self.retry_interval.max(Duration::from_secs(1))
    }

    async fn register(&self, cancel: &CancellationToken) -> LoopState {
        let pid = self.pid();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return LoopState::Stopped(LoopExit::Cancelled),
            outcome = self.broker.register(self.process.clone()) => outcome,
        };
        match outcome {
            Ok(()) => debug!(pid, "Registered process"),
            Err(err) => debug!(pid, error = %err, "Failed to register process"),
        }
        LoopState::Waiting
    }

    async fn wait(&self, cancel: &CancellationToken) -> LoopState {
        let pid = self.pid();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(pid, "Command loop cancelled");
                return LoopState::Stopped(LoopExit::Cancelled);
            }
            outcome = self.broker.wait_command(pid) => outcome,
        };

        match outcome {
            Ok(command) if command.is_empty() => {
                debug!(pid, "Received empty command");
                LoopState::Waiting
            }
            Ok(command) => LoopState::Delivering(command),
            Err(BrokerError::Killed) => {
                debug!(pid, "Process killed");
                cancel.cancel();
                LoopState::Stopped(LoopExit::Killed)
            }
            Err(BrokerError::NotFound) => {
                debug!(pid, "Process not found");
                LoopState::Reconnecting
            }
            Err(BrokerError::WaitTimeout) => {
                debug!(pid, "Wait timeout");
                LoopState::Waiting
            }
            Err(err) => {
                debug!(pid, error = %err, "Failed to wait command");
                self.pause(cancel).await.unwrap_or(LoopState::Waiting)
            }
        }
    }

    fn deliver(&self, command: String, deliveries: &mut JoinSet<()>) -> LoopState {
        while deliveries.try_join_next().is_some() {}

        let pid = self.pid();
        let sink = self.sink.clone();
        deliveries.spawn(async move {
            match sink.deliver(pid, &command).await {
                Ok(()) => debug!(pid, command = %command, "Delivered command"),
                Err(err) => debug!(pid, error = %err, "Failed to deliver command"),
            }
        });
        LoopState::Waiting
    }

    /// Deliveries still running after the bound are aborted.
    async fn finish_deliveries(&self, mut deliveries: JoinSet<()>) {
        let drain = async { while deliveries.join_next().await.is_some() {} };
        if tokio::time::timeout(self.shutdown_bound(), drain).await.is_err() {
            debug!(pid = self.pid(), "Abandoned pending command deliveries");
        }
    }

    async fn reconnect(&self, cancel: &CancellationToken) -> LoopState {
        let pid = self.pid();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return LoopState::Stopped(LoopExit::Cancelled),
            outcome = self.broker.register(self.process.clone()) => outcome,
        };
        match outcome {
            Ok(()) => {
                debug!(pid, "Registered process");
                LoopState::Waiting
            }
            Err(err) => {
                debug!(pid, error = %err, "Failed to register process");
                self.pause(cancel).await.unwrap_or(LoopState::Waiting)
            }
        }
    }

    /// Sleeps one retry interval. Returns the stop state if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> Option<LoopState> {
        tokio::select! {
            _ = cancel.cancelled() => Some(LoopState::Stopped(LoopExit::Cancelled)),
            _ = tokio::time::sleep(self.retry_interval) => None,
        }
    }

    /// Best effort; bounded so shutdown never hangs on an unreachable broker.
    async fn unregister(&self) {
        let pid = self.pid();
        match tokio::time::timeout(self.shutdown_bound(), self.broker.unregister(pid)).await {
            Ok(Ok(())) => debug!(pid, "Process unregistered"),
            Ok(Err(err)) => debug!(pid, error = %err, "Failed to unregister process"),
            Err(_) => debug!(pid, "Timed out unregistering process"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Instant;
    use stdhttp_common::BrokerResult;

    /// Broker double fed with scripted outcomes. Once a script runs dry the
    /// matching call falls back to a default.
    #[derive(Default)]
    struct ScriptedBroker {
        registers: Mutex<VecDeque<BrokerResult<()>>>,
        waits: Mutex<VecDeque<BrokerResult<String>>>,
        fail_all_registers: bool,
        not_found_forever: bool,
        register_calls: Mutex<Vec<Instant>>,
        wait_calls: Mutex<usize>,
        kills: Mutex<Vec<u32>>,
    }

    impl ScriptedBroker {
        fn with_waits(waits: Vec<BrokerResult<String>>) -> Self {
            Self {
                waits: Mutex::new(waits.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ProcessBroker for ScriptedBroker {
        async fn register(&self, _process: ProcessRecord) -> BrokerResult<()> {
            self.register_calls.lock().push(Instant::now());
            if self.fail_all_registers {
                return Err(BrokerError::UnexpectedStatus(503));
            }
            self.registers.lock().pop_front().unwrap_or(Ok(()))
        }

        async fn kill(&self, pid: u32) -> BrokerResult<()> {
            self.kills.lock().push(pid);
            Ok(())
        }

        async fn send_command(&self, _pid: u32, _command: String) -> BrokerResult<()> {
            Ok(())
        }

        async fn wait_command(&self, _pid: u32) -> BrokerResult<String> {
            *self.wait_calls.lock() += 1;
            if self.not_found_forever {
                return Err(BrokerError::NotFound);
            }
            let next = self.waits.lock().pop_front();
            match next {
                Some(outcome) => outcome,
                None => std::future::pending().await,
            }
        }

        async fn list(&self) -> BrokerResult<Vec<ProcessRecord>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        commands: Mutex<Vec<(u32, String)>>,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn deliver(&self, pid: u32, command: &str) -> Result<()> {
            self.commands.lock().push((pid, command.to_string()));
            Ok(())
        }
    }

    fn process() -> ProcessRecord {
        ProcessRecord {
            pid: 4242,
            client_name: "test".into(),
            command_name: "sleep".into(),
            command_args: vec!["1".into()],
            ..Default::default()
        }
    }

    fn command_loop(
        broker: &Arc<ScriptedBroker>,
        sink: &Arc<RecordingSink>,
        retry_interval: Duration,
    ) -> CommandLoop {
        CommandLoop::new(broker.clone(), sink.clone(), process(), retry_interval)
    }

    #[tokio::test]
    async fn forwards_commands_and_skips_keepalives_until_killed() {
        let broker = Arc::new(ScriptedBroker::with_waits(vec![
            Ok("restart".into()),
            Ok(String::new()),
            Err(BrokerError::WaitTimeout),
            Ok("stop".into()),
            Err(BrokerError::Killed),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();

        let exit = command_loop(&broker, &sink, Duration::from_secs(5))
            .run(&cancel)
            .await;

        assert_eq!(exit, LoopExit::Killed);
        assert!(cancel.is_cancelled(), "kill cancels the whole run");
        assert_eq!(
            *sink.commands.lock(),
            vec![(4242, "restart".to_string()), (4242, "stop".to_string())]
        );
        assert_eq!(broker.register_calls.lock().len(), 1);
        assert_eq!(*broker.kills.lock(), vec![4242]);
    }

    struct StalledSink {
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandSink for StalledSink {
        async fn deliver(&self, _pid: u32, command: &str) -> Result<()> {
            self.started.lock().push(command.to_string());
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_sink_does_not_hold_up_the_next_wait() {
        let broker = Arc::new(ScriptedBroker::with_waits(vec![
            Ok("first".into()),
            Ok("second".into()),
            Err(BrokerError::Killed),
        ]));
        let sink = Arc::new(StalledSink {
            started: Mutex::new(Vec::new()),
        });

        let started = Instant::now();
        let exit = CommandLoop::new(
            broker.clone(),
            sink.clone(),
            process(),
            Duration::from_millis(200),
        )
        .run(&CancellationToken::new())
        .await;

        assert_eq!(exit, LoopExit::Killed);
        assert_eq!(*broker.wait_calls.lock(), 3);
        assert_eq!(
            *sink.started.lock(),
            vec!["first".to_string(), "second".to_string()]
        );
        // Stalled deliveries are abandoned after the shutdown bound.
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(*broker.kills.lock(), vec![4242]);
    }

    #[tokio::test]
    async fn caller_cancellation_stops_a_blocked_wait_and_unregisters() {
        let broker = Arc::new(ScriptedBroker::default());
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();

        let runner = tokio::spawn({
            let command_loop = command_loop(&broker, &sink, Duration::from_secs(5));
            let cancel = cancel.clone();
            async move { command_loop.run(&cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("loop stops promptly")
            .unwrap();
        assert_eq!(exit, LoopExit::Cancelled);
        assert_eq!(*broker.kills.lock(), vec![4242]);
    }

    #[tokio::test]
    async fn failed_initial_registration_does_not_abort() {
        let broker = Arc::new(ScriptedBroker {
            registers: Mutex::new(vec![Err(BrokerError::AlreadyExists)].into()),
            waits: Mutex::new(vec![Ok("go".into()), Err(BrokerError::Killed)].into()),
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());

        let exit = command_loop(&broker, &sink, Duration::from_secs(5))
            .run(&CancellationToken::new())
            .await;

        assert_eq!(exit, LoopExit::Killed);
        assert_eq!(sink.commands.lock().len(), 1);
    }

    #[tokio::test]
    async fn not_found_triggers_reregistration_and_resumes_waiting() {
        let broker = Arc::new(ScriptedBroker::with_waits(vec![
            Err(BrokerError::NotFound),
            Ok("after-restart".into()),
            Err(BrokerError::Killed),
        ]));
        let sink = Arc::new(RecordingSink::default());

        let started = Instant::now();
        let exit = command_loop(&broker, &sink, Duration::from_secs(5))
            .run(&CancellationToken::new())
            .await;

        assert_eq!(exit, LoopExit::Killed);
        assert_eq!(broker.register_calls.lock().len(), 2);
        assert_eq!(sink.commands.lock()[0].1, "after-restart");
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "successful reconnect must not back off"
        );
    }

    #[tokio::test]
    async fn persistent_reconnect_failures_are_spaced_by_retry_interval() {
        let broker = Arc::new(ScriptedBroker {
            fail_all_registers: true,
            not_found_forever: true,
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        let retry_interval = Duration::from_millis(100);

        let runner = tokio::spawn({
            let command_loop = command_loop(&broker, &sink, retry_interval);
            let cancel = cancel.clone();
            async move { command_loop.run(&cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(550)).await;
        cancel.cancel();
        assert_eq!(runner.await.unwrap(), LoopExit::Cancelled);

        let calls = broker.register_calls.lock().clone();
        // Initial attempt plus one reconnect per interval, never a busy loop.
        assert!(calls.len() >= 3, "only {} attempts", calls.len());
        assert!(calls.len() <= 8, "{} attempts in 550ms", calls.len());
        for pair in calls[1..].windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(90), "retried after {gap:?}");
        }
    }

    #[tokio::test]
    async fn transport_errors_back_off_before_retrying() {
        let broker = Arc::new(ScriptedBroker::with_waits(vec![
            Err(BrokerError::UnexpectedStatus(502)),
            Err(BrokerError::Killed),
        ]));
        let sink = Arc::new(RecordingSink::default());

        let started = Instant::now();
        let exit = command_loop(&broker, &sink, Duration::from_millis(150))
            .run(&CancellationToken::new())
            .await;

        assert_eq!(exit, LoopExit::Killed);
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(*broker.wait_calls.lock(), 2);
    }

    #[tokio::test]
    async fn tracing_sink_accepts_everything() {
        assert!(TracingSink.deliver(1, "anything").await.is_ok());
    }
}
