//! Pause gate shared by the event queue and the lifecycle controller.

use daq_core::Cancelled;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Boolean gate the consumer must pass before taking an event.
///
/// Toggling wakes every waiter; a paused consumer suspends without polling.
#[derive(Debug)]
pub struct PauseGate {
    paused: watch::Sender<bool>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    /// Unpaused gate.
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self { paused }
    }

    /// Current value of the flag.
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Flip the flag, returning the new value.
    pub fn toggle(&self) -> bool {
        let mut now = false;
        self.paused.send_modify(|p| {
            *p = !*p;
            now = *p;
        });
        now
    }

    /// Force the flag to `paused`.
    pub fn set_paused(&self, paused: bool) {
        self.paused.send_if_modified(|p| {
            if *p == paused {
                return false;
            }
            *p = paused;
            true
        });
    }

    /// Wait until the gate is open.
    pub async fn wait_until_resumed(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let mut rx = self.paused.subscribe();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            res = rx.wait_for(|paused| !*paused) => res.map(|_| ()).map_err(|_| Cancelled),
        }
    }
}
