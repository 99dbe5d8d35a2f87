//! Explore dispatcher: a single worker task that runs tile requests one at a
//! time, in submission order.
//!
//! Requests return as soon as they are queued for the worker; the UI never
//! waits for expansion. [`ExploreDispatcher::shutdown`] cancels the worker
//! mid-request and refuses anything submitted afterwards.

use std::sync::Arc;
use std::time::Duration;

use daq_core::limits::DISPATCHER_POLL_INTERVAL;
use daq_core::{AppResult, DaqError};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::event::TileEvent;
use crate::scheduler::TileScheduler;

enum DispatchTask {
    TileAtCurrentPosition,
    Region {
        row1: i64,
        col1: i64,
        row2: i64,
        col2: i64,
    },
    Plan(Vec<TileEvent>),
    Flush(oneshot::Sender<()>),
}

/// Serialized executor of tile requests.
pub struct ExploreDispatcher {
    tx: Mutex<Option<mpsc::UnboundedSender<DispatchTask>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExploreDispatcher {
    /// Spawn the worker on the current runtime.
    pub fn start(scheduler: Arc<TileScheduler>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(
            run_worker(scheduler, rx, cancel.clone()).instrument(info_span!("explore_dispatcher")),
        );
        Self {
            tx: Mutex::new(Some(tx)),
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn send(&self, task: DispatchTask) -> AppResult<()> {
        let tx = self.tx.lock();
        let tx = tx.as_ref().ok_or(DaqError::DispatcherClosed)?;
        tx.send(task).map_err(|_| DaqError::DispatcherClosed)
    }

    /// Queue a tile at the current stage and focus position.
    pub fn request_tile_at_current_position(&self) -> AppResult<()> {
        self.send(DispatchTask::TileAtCurrentPosition)
    }

    /// Queue every tile of a grid rectangle.
    pub fn request_tile_region(&self, row1: i64, col1: i64, row2: i64, col2: i64) -> AppResult<()> {
        self.send(DispatchTask::Region {
            row1,
            col1,
            row2,
            col2,
        })
    }

    /// Queue a precomputed plan followed by the terminal sentinels.
    pub fn submit_plan(&self, events: Vec<TileEvent>) -> AppResult<()> {
        self.send(DispatchTask::Plan(events))
    }

    /// Wait until every request submitted before this call has run.
    pub async fn flush(&self) -> AppResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(DispatchTask::Flush(done_tx))?;
        done_rx.await.map_err(|_| DaqError::DispatcherClosed)
    }

    /// Whether requests are still accepted.
    pub fn is_open(&self) -> bool {
        self.tx.lock().is_some()
    }

    /// Stop the worker and wait up to `timeout` for it to exit.
    ///
    /// Pending requests are discarded. Idempotent.
    pub async fn shutdown(&self, timeout: Duration) -> AppResult<()> {
        self.tx.lock().take();
        self.cancel.cancel();

        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        let started = Instant::now();
        while !worker.is_finished() {
            if started.elapsed() >= timeout {
                warn!(
                    waited_ms = timeout.as_millis() as u64,
                    "Dispatcher did not stop in time; aborting worker"
                );
                worker.abort();
                return Err(DaqError::ShutdownTimeout {
                    what: "explore dispatcher",
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(DISPATCHER_POLL_INTERVAL).await;
        }
        debug!("Dispatcher stopped");
        Ok(())
    }
}

impl Drop for ExploreDispatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_worker(
    scheduler: Arc<TileScheduler>,
    mut rx: mpsc::UnboundedReceiver<DispatchTask>,
    cancel: CancellationToken,
) {
    debug!("Dispatcher worker started");
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let outcome = match task {
            DispatchTask::Flush(done) => {
                let _ = done.send(());
                continue;
            }
            DispatchTask::TileAtCurrentPosition => scheduler
                .schedule_tile_at_current_position(&cancel)
                .await
                .map_err(|e| ("tile at current position", e)),
            DispatchTask::Region {
                row1,
                col1,
                row2,
                col2,
            } => scheduler
                .schedule_region(row1, col1, row2, col2, &cancel)
                .await
                .map_err(|e| ("tile region", e)),
            DispatchTask::Plan(events) => scheduler
                .schedule_plan(events, &cancel)
                .await
                .map_err(|e| ("fixed-area plan", e)),
        };

        match outcome {
            Ok(_) => {}
            Err((_, e)) if e.is_cancelled() => {
                debug!("Dispatcher request cancelled");
                break;
            }
            Err((request, e @ DaqError::PositionResolution(_))) => {
                error!(request, error = %e, "Couldn't add tile");
            }
            Err((request, e @ (DaqError::Hardware { .. } | DaqError::Driver(_)))) => {
                error!(request, error = %e, "Couldn't read device positions");
            }
            Err((request, e)) => {
                error!(request, error = %e, "Dispatcher request failed");
            }
        }
    }
    info!("Dispatcher worker exited");
}
