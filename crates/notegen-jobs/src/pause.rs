//! Cooperative suspension points for the chunk scheduler.
//!
//! The scheduler only ever suspends in two places: before a chunk starts
//! (while the batch is paused) and in the cooldown between chunks. Both
//! waits are signal-driven and both are released by [`ShutdownSignal`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace};

use notegen_core::{Error, ProcessingState, Result};

/// One-shot shutdown flag shared by an orchestrator and its running batch.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger shutdown. Returns false if it was already triggered.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Blocks the scheduler while paused and makes every wait cancellable.
#[derive(Debug)]
pub struct PauseGate {
    state: watch::Receiver<ProcessingState>,
    shutdown: watch::Receiver<bool>,
}

impl PauseGate {
    pub fn new(state: watch::Receiver<ProcessingState>, shutdown: watch::Receiver<bool>) -> Self {
        Self { state, shutdown }
    }

    fn check_shutdown(&mut self) -> Result<()> {
        if *self.shutdown.borrow_and_update() {
            return Err(Error::Cancelled("shutdown requested".into()));
        }
        Ok(())
    }

    /// Return once the batch is running. Waits without polling while
    /// paused; fails with [`Error::Cancelled`] on shutdown.
    pub async fn wait_until_resumed(&mut self) -> Result<()> {
        let mut announced = false;
        loop {
            self.check_shutdown()?;
            let state = *self.state.borrow_and_update();
            match state {
                ProcessingState::Running => {
                    if announced {
                        debug!("Pause gate released");
                    }
                    return Ok(());
                }
                ProcessingState::Paused => {
                    if !announced {
                        debug!("Batch paused, waiting for resume");
                        announced = true;
                    }
                }
                other => {
                    return Err(Error::Cancelled(format!("batch left running state ({other})")));
                }
            }

            tokio::select! {
                changed = self.state.changed() => {
                    changed.map_err(|_| Error::Internal("state machine dropped".into()))?;
                }
                changed = self.shutdown.changed() => {
                    changed.map_err(|_| Error::Internal("shutdown signal dropped".into()))?;
                }
            }
        }
    }

    /// Sleep for `duration` unless shutdown fires first.
    pub async fn delay(&mut self, duration: Duration) -> Result<()> {
        self.check_shutdown()?;
        if duration.is_zero() {
            return Ok(());
        }
        trace!(delay_ms = duration.as_millis() as u64, "Cooling down between chunks");
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            changed = self.shutdown.changed() => {
                changed.map_err(|_| Error::Internal("shutdown signal dropped".into()))?;
                self.check_shutdown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ProcessingStateMachine;
    use tokio::time::Instant;

    fn running_gate() -> (ProcessingStateMachine, ShutdownSignal, PauseGate) {
        let machine = ProcessingStateMachine::new();
        machine.transition(ProcessingState::Running).unwrap();
        let shutdown = ShutdownSignal::new();
        let gate = PauseGate::new(machine.subscribe(), shutdown.subscribe());
        (machine, shutdown, gate)
    }

    #[tokio::test]
    async fn test_running_passes_immediately() {
        let (_machine, _shutdown, mut gate) = running_gate();
        gate.wait_until_resumed().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_waits_for_resume() {
        let (machine, _shutdown, mut gate) = running_gate();
        machine.transition(ProcessingState::Paused).unwrap();

        let machine = Arc::new(machine);
        let resumer = machine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            resumer.transition(ProcessingState::Running).unwrap();
        });

        let start = Instant::now();
        gate.wait_until_resumed().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_shutdown_releases_pause_wait() {
        let (machine, shutdown, mut gate) = running_gate();
        machine.transition(ProcessingState::Paused).unwrap();

        let trigger = shutdown.clone();
        let waiter = tokio::spawn(async move { gate.wait_until_resumed().await });
        tokio::task::yield_now().await;
        assert!(trigger.trigger());
        assert!(!trigger.trigger());

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_elapses() {
        let (_machine, _shutdown, mut gate) = running_gate();
        let start = Instant::now();
        gate.delay(Duration::from_millis(1_000)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_delay() {
        let (_machine, shutdown, mut gate) = running_gate();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger();
        });

        let start = Instant::now();
        let result = gate.delay(Duration::from_secs(60)).await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_error_state_cancels_gate() {
        let (machine, _shutdown, mut gate) = running_gate();
        machine.transition(ProcessingState::Error).unwrap();
        assert!(matches!(
            gate.wait_until_resumed().await,
            Err(Error::Cancelled(_))
        ));
    }
}
