//! Acquisition lifecycle state machine.
//!
//! ```text
//! Created ──▶ Initialized ──▶ Running ◀──▶ Paused
//!                  │             │           │
//!                  └──────┬──────┴───────────┘
//!                         ▼  abort()
//!                     Aborting
//!                         │
//!                         ▼
//!                     Finishing ──▶ Finished
//! ```
//!
//! `Running`, `Paused` and `Initialized` may also go straight to `Finishing`
//! when the engine consumes the natural end-of-acquisition event.

use std::fmt;

use daq_core::{AppResult, DaqError};
use tokio::sync::watch;

/// Lifecycle state of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Hardware limits queried, z origin fixed
    Created,
    /// Output pipeline and dispatcher started
    Initialized,
    /// Events flow to the engine
    Running,
    /// The engine is held before its next event
    Paused,
    /// Abort in progress
    Aborting,
    /// Output is draining into storage
    Finishing,
    /// Storage closed; no more images accepted
    Finished,
}

impl AcquisitionState {
    /// Whether the acquisition still accepts work.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AcquisitionState::Initialized | AcquisitionState::Running | AcquisitionState::Paused
        )
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionState::Created => write!(f, "created"),
            AcquisitionState::Initialized => write!(f, "initialized"),
            AcquisitionState::Running => write!(f, "running"),
            AcquisitionState::Paused => write!(f, "paused"),
            AcquisitionState::Aborting => write!(f, "aborting"),
            AcquisitionState::Finishing => write!(f, "finishing"),
            AcquisitionState::Finished => write!(f, "finished"),
        }
    }
}

/// Holder of the current state with validated transitions.
///
/// Readers take cheap snapshots or subscribe for changes.
#[derive(Debug)]
pub struct StateController {
    tx: watch::Sender<AcquisitionState>,
}

impl Default for StateController {
    fn default() -> Self {
        Self::new()
    }
}

impl StateController {
    /// Controller in [`AcquisitionState::Created`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AcquisitionState::Created);
        Self { tx }
    }

    /// Current state.
    pub fn get(&self) -> AcquisitionState {
        *self.tx.borrow()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<AcquisitionState> {
        self.tx.subscribe()
    }

    /// Apply `next` to the current state atomically.
    ///
    /// `next` returns the target state, or `None` if `action` is not allowed
    /// from the current one. Returns the state before the transition.
    pub fn transition<F>(&self, action: &'static str, next: F) -> AppResult<AcquisitionState>
    where
        F: FnOnce(AcquisitionState) -> Option<AcquisitionState>,
    {
        let mut outcome = Err(DaqError::InvalidTransition {
            action,
            state: String::new(),
        });
        self.tx.send_if_modified(|state| {
            let current = *state;
            match next(current) {
                Some(target) => {
                    outcome = Ok(current);
                    *state = target;
                    target != current
                }
                None => {
                    outcome = Err(DaqError::InvalidTransition {
                        action,
                        state: current.to_string(),
                    });
                    false
                }
            }
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AcquisitionState::*;

    #[test]
    fn valid_transition_returns_previous_state() {
        let states = StateController::new();
        let prev = states
            .transition("initialize", |s| (s == Created).then_some(Initialized))
            .unwrap();
        assert_eq!(prev, Created);
        assert_eq!(states.get(), Initialized);
    }

    #[test]
    fn invalid_transition_names_current_state() {
        let states = StateController::new();
        let err = states
            .transition("pause", |s| (s == Running).then_some(Paused))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot pause: acquisition is created");
        assert_eq!(states.get(), Created);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let states = StateController::new();
        let mut rx = states.subscribe();
        states.transition("initialize", |_| Some(Initialized)).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Initialized);
    }
}
