//! Cooperative scheduling layer.
//!
//! Every controller is a periodic tick task on the tokio runtime with an
//! explicit shutdown signal; the tick body itself is synchronous and
//! deterministic. Waiting on world conditions goes through [`poll_until`],
//! a bounded poll that proceeds anyway on timeout.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle of a spawned periodic tick loop.
pub struct TickTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl TickTask {
    /// Spawn `body` on a fixed period. The body runs once per period until
    /// the task is stopped.
    pub fn spawn<F>(name: &'static str, period: Duration, mut body: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => body(),
                    _ = stopped.changed() => {
                        if *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(task = name, "Tick loop stopped");
        });
        Self {
            name,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal shutdown and wait for the loop to exit at its next yield
    /// point. Idempotent.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(task = self.name, error = %err, "Tick loop join failed");
            }
        }
    }
}

/// Outcome of a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied,
    /// The deadline passed without the condition holding. Callers proceed
    /// anyway; liveness over strict correctness.
    TimedOut,
}

/// Poll `cond` on `period` until it holds or `timeout` elapses.
pub async fn poll_until<F>(
    what: &str,
    period: Duration,
    timeout: Duration,
    mut cond: F,
) -> PollOutcome
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return PollOutcome::Satisfied;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(condition = what, "Timed out waiting; proceeding anyway");
            return PollOutcome::TimedOut;
        }
        tokio::time::sleep(period).await;
    }
}
