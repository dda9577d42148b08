//! Debounced execution of a save action.
//!
//! A save is scheduled `delay` after the most recent [`Debouncer::schedule`]
//! call; calls arriving inside the window push the deadline out and coalesce
//! into one save. Dropping the debouncer runs a pending save before the
//! background task exits.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::trace;

enum Command {
    Touch,
    Flush(oneshot::Sender<()>),
}

/// Coalesces repeated mutations into a single deferred save.
///
/// Must be created inside a Tokio runtime; the save action runs on a
/// spawned task.
pub struct Debouncer {
    tx: mpsc::UnboundedSender<Command>,
    delay: Duration,
}

impl Debouncer {
    /// Spawn the debouncing task for `action`.
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(delay, rx, action));
        Self { tx, delay }
    }

    /// Schedule a save `delay` from now, replacing any pending deadline.
    pub fn schedule(&self) {
        let _ = self.tx.send(Command::Touch);
    }

    /// Save immediately and wait for the save to finish.
    ///
    /// Clears any pending deadline.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// The debounce window.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

async fn run<F, Fut>(delay: Duration, mut rx: mpsc::UnboundedReceiver<Command>, action: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                command = rx.recv() => command,
                _ = sleep_until(at) => {
                    deadline = None;
                    trace!("Debounce window elapsed, saving");
                    action().await;
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match command {
            Some(Command::Touch) => deadline = Some(Instant::now() + delay),
            Some(Command::Flush(done)) => {
                deadline = None;
                action().await;
                let _ = done.send(());
            }
            None => {
                if deadline.is_some() {
                    action().await;
                }
                break;
            }
        }
    }
}
