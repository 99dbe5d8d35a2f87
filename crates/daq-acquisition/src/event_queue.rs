//! Bounded, pause-gated FIFO of acquisition events.
//!
//! Producers (the explore dispatcher, fixed-area plans) suspend while the queue
//! is full; the single consumer suspends while the gate is paused and while the
//! queue is empty. Every suspension takes a [`CancellationToken`] so abort can
//! unblock it.
//!
//! Wakeups use [`Notify`] with the "enable, then re-check" pattern so a
//! notification sent between the check and the await is never lost.

use std::collections::VecDeque;

use daq_core::Cancelled;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::AcquisitionEvent;
use crate::pause::PauseGate;

/// The acquisition's event queue.
#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<AcquisitionEvent>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
    pause: PauseGate,
    last_event: Mutex<Option<AcquisitionEvent>>,
}

impl EventQueue {
    /// Empty, unpaused queue holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            pause: PauseGate::new(),
            last_event: Mutex::new(None),
        }
    }

    /// Append `event`, waiting for space.
    ///
    /// On cancellation the event is dropped. A token that is already cancelled
    /// fails even when there is room.
    pub async fn submit(
        &self,
        event: AcquisitionEvent,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        loop {
            let space = self.not_full.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut events = self.events.lock();
                if events.len() < self.capacity {
                    events.push_back(event);
                    drop(events);
                    self.not_empty.notify_waiters();
                    return Ok(());
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = &mut space => {}
            }
        }
    }

    /// Take the next event.
    ///
    /// Waits for the pause gate to open, then for an event. The event taken is
    /// remembered as [`last_event`](Self::last_event).
    pub async fn next_event(&self, cancel: &CancellationToken) -> Result<AcquisitionEvent, Cancelled> {
        self.pause.wait_until_resumed(cancel).await?;
        loop {
            let arrival = self.not_empty.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let next = self.events.lock().pop_front();
            if let Some(event) = next {
                self.not_full.notify_waiters();
                *self.last_event.lock() = Some(event.clone());
                return Ok(event);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = &mut arrival => {}
            }
        }
    }

    /// Drop every queued event, returning how many were dropped.
    ///
    /// Producers must be stopped first or they may refill the queue.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut events = self.events.lock();
            let n = events.len();
            events.clear();
            n
        };
        self.not_full.notify_waiters();
        if dropped > 0 {
            debug!(dropped, "Cleared event queue");
        }
        dropped
    }

    /// Append a terminal sentinel without waiting.
    ///
    /// Sentinels may exceed the capacity so that abort never blocks on a queue
    /// nobody is draining.
    pub fn push_terminal(&self, event: AcquisitionEvent) {
        debug_assert!(event.is_terminal());
        self.events.lock().push_back(event);
        self.not_empty.notify_waiters();
    }

    /// Flip the pause flag, returning the new value. Wakes all waiters.
    pub fn toggle_pause(&self) -> bool {
        self.pause.toggle()
    }

    /// The gate the consumer passes before taking an event.
    pub fn pause_gate(&self) -> &PauseGate {
        &self.pause
    }

    /// Whether the consumer is currently held back.
    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Maximum number of queued events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently dispatched event.
    pub fn last_event(&self) -> Option<AcquisitionEvent> {
        self.last_event.lock().clone()
    }

    /// Copy of the queued events, front first.
    pub fn snapshot(&self) -> Vec<AcquisitionEvent> {
        self.events.lock().iter().cloned().collect()
    }
}
