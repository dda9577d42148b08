//! Canonical processing state with serialized transitions.

use tokio::sync::watch;
use tracing::debug;

use notegen_core::{Error, ProcessingState, Result};

/// Single source of truth for the orchestrator's [`ProcessingState`].
///
/// Transitions are checked against [`ProcessingState::can_transition_to`]
/// and applied atomically; observers (and the scheduler's pause gate) watch
/// the value through [`subscribe`](Self::subscribe).
#[derive(Debug)]
pub struct ProcessingStateMachine {
    tx: watch::Sender<ProcessingState>,
}

impl Default for ProcessingStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStateMachine {
    /// Start in [`ProcessingState::Idle`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProcessingState::Idle);
        Self { tx }
    }

    pub fn state(&self) -> ProcessingState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.tx.subscribe()
    }

    /// Move to `to` from whatever the current state is, if legal.
    /// Returns the state that was left.
    pub fn transition(&self, to: ProcessingState) -> Result<ProcessingState> {
        self.apply(|from| from.can_transition_to(to), to)
    }

    /// Move `from -> to` only if the machine is currently in `from`.
    pub fn transition_from(&self, from: ProcessingState, to: ProcessingState) -> Result<()> {
        self.apply(|current| current == from && current.can_transition_to(to), to)
            .map(|_| ())
    }

    fn apply(
        &self,
        allowed: impl FnOnce(ProcessingState) -> bool,
        to: ProcessingState,
    ) -> Result<ProcessingState> {
        let mut previous = ProcessingState::Idle;
        let mut accepted = false;
        self.tx.send_if_modified(|current| {
            previous = *current;
            accepted = allowed(previous);
            if accepted {
                *current = to;
            }
            accepted
        });

        if accepted {
            debug!(from = %previous, to = %to, "State transition");
            Ok(previous)
        } else {
            Err(Error::InvalidState(format!(
                "cannot transition from {previous} to {to}"
            )))
        }
    }
}
