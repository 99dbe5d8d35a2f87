//! Simulated session: mock devices, in-memory storage and the reference
//! engine, driven by the gestures listed in the configuration.
//!
//! Explore sessions replay their requests, wait until every scheduled tile
//! has been acquired and then abort, which is how a user ends an explore
//! acquisition. Fixed-area sessions run their plan to completion. Either
//! kind aborts early when the shutdown token fires.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use daq_acquisition::{Acquisition, AcquisitionEngine, AcquisitionState, Devices};
use daq_core::{DaqError, FocusDrive, XyStage};
use daq_driver_mock::{ErrorConfig, MockCamera, MockFocusDrive, MockXyStage, StageLimits};
use daq_storage::{MemoryTileStorage, TileGrid};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::{SimulatorConfig, TileRequest};

const IDLE_POLL: Duration = Duration::from_millis(20);

/// Outcome of a simulated session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    /// Unique acquisition name handed out by storage
    pub name: String,
    /// Acquisition mode
    pub mode: &'static str,
    /// Images the engine produced
    pub images: u64,
    /// Events whose hardware actions failed
    pub failures: u64,
    /// Images held by storage
    pub stored: usize,
    /// Distinct tile positions
    pub positions: usize,
    /// Lowest slice index
    pub min_slice: i32,
    /// Highest slice index
    pub max_slice: i32,
    /// Final lifecycle state
    pub state: String,
    /// Whether the shutdown token ended the session
    pub interrupted: bool,
}

/// Mock hardware and storage built from a [`SimulatorConfig`].
pub struct Simulation {
    config: SimulatorConfig,
    stage: Arc<MockXyStage>,
    focus: Arc<MockFocusDrive>,
    camera: Arc<MockCamera>,
    storage: Arc<MemoryTileStorage>,
}

impl Simulation {
    /// Validate `config` and build its devices.
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        let mode = config.stage.mock_mode;

        let xy = &config.stage.xy;
        let mut stage = MockXyStage::builder()
            .position(xy.initial_x, xy.initial_y)
            .mode(mode);
        if let Some(travel) = xy.travel_um {
            stage = stage.limits(StageLimits::hard_stop(travel));
        }
        let stage = Arc::new(stage.build());
        let focus = Arc::new(MockFocusDrive::with_config(config.stage.focus.clone()).with_mode(mode));
        let camera = Arc::new(
            MockCamera::with_config(config.stage.camera.clone())
                .attached_to(stage.clone(), focus.clone())
                .with_mode(mode)
                .with_error_config(ErrorConfig::random_failures_seeded(
                    config.stage.camera_failure_rate,
                    config.stage.seed,
                )),
        );

        let cam = &config.stage.camera;
        let overlap = config.acquisition.tile_overlap_percent / 100.0;
        let grid = TileGrid::from_camera(
            cam.width,
            cam.height,
            cam.pixel_size_um,
            (f64::from(cam.width) * overlap) as u32,
            (f64::from(cam.height) * overlap) as u32,
        )
        .with_origin(xy.initial_x, xy.initial_y);
        let storage = Arc::new(
            MemoryTileStorage::new(config.acquisition.name.clone(), grid)
                .in_dir(config.acquisition.dir.clone()),
        );

        Ok(Self {
            config,
            stage,
            focus,
            camera,
            storage,
        })
    }

    /// Storage the session writes into.
    pub fn storage(&self) -> &Arc<MemoryTileStorage> {
        &self.storage
    }

    fn devices(&self) -> Devices {
        Devices {
            xy_stage: self.stage.clone(),
            focus: self.focus.clone(),
            camera: self.camera.clone(),
        }
    }

    /// Run the session until it completes or `shutdown` fires.
    #[instrument(skip_all, fields(acquisition = %self.config.acquisition.name), err)]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<SimulationReport> {
        let settings = self.config.settings();
        let explore = settings.mode.is_explore();
        let acq = Arc::new(
            Acquisition::create(settings, self.devices(), self.storage.clone())
                .await?
                .with_timeouts(self.config.shutdown_timeouts()),
        );
        acq.initialize().await?;
        acq.start().await?;

        let engine = {
            let acq = acq.clone();
            let engine = AcquisitionEngine::new(self.devices());
            tokio::spawn(async move { engine.run(&acq, &CancellationToken::new()).await })
        };

        let interrupted = if explore {
            self.explore_session(&acq, &shutdown).await?
        } else {
            let mut state = acq.subscribe_state();
            tokio::select! {
                _ = shutdown.cancelled() => true,
                _ = state.wait_for(|s| *s == AcquisitionState::Finished) => false,
            }
        };
        if interrupted || explore {
            acq.abort().await?;
        }

        let report = engine.await.context("engine task panicked")??;
        acq.wait_until_closed(self.config.shutdown_timeouts().sink).await?;

        let report = SimulationReport {
            name: acq.name(),
            mode: acq.settings().mode.name(),
            images: report.images,
            failures: report.failures,
            stored: self.storage.image_count(),
            positions: self.storage.positions().len(),
            min_slice: acq.min_slice_index(),
            max_slice: acq.max_slice_index(),
            state: acq.state().to_string(),
            interrupted,
        };
        info!(images = report.images, positions = report.positions, "Session complete");
        Ok(report)
    }

    /// Replay the configured gestures. Returns whether `shutdown` fired.
    async fn explore_session(&self, acq: &Acquisition, shutdown: &CancellationToken) -> Result<bool> {
        for request in &self.config.session.requests {
            if shutdown.is_cancelled() {
                return Ok(true);
            }
            match *request {
                TileRequest::ZLimits { top, bottom } => acq.set_z_limits(top, bottom)?,
                TileRequest::Region {
                    row1,
                    col1,
                    row2,
                    col2,
                } => acq.request_tile_region(row1, col1, row2, col2)?,
                TileRequest::Here { x, y, z } => {
                    // The engine moves the same stage; let it settle first.
                    if !self.wait_idle(acq, shutdown).await {
                        return Ok(true);
                    }
                    self.stage
                        .move_xy(x, y)
                        .await
                        .map_err(|e| DaqError::hardware(self.stage.device_name(), e))?;
                    self.focus
                        .move_abs(z)
                        .await
                        .map_err(|e| DaqError::hardware(self.focus.device_name(), e))?;
                    acq.request_tile_at_current_position()?;
                    acq.flush_requests().await?;
                }
            }
        }
        acq.flush_requests().await?;
        Ok(!self.wait_idle(acq, shutdown).await)
    }

    /// Wait until nothing is queued or pending. Returns `false` if `shutdown`
    /// fired first. Gives up with a warning after the configured idle wait.
    async fn wait_idle(&self, acq: &Acquisition, shutdown: &CancellationToken) -> bool {
        let limit = Duration::from_millis(self.config.timeouts.idle_ms);
        let idle = async {
            while acq.pending_tile_count() > 0 || !acq.queued_events().is_empty() {
                tokio::time::sleep(IDLE_POLL).await;
            }
        };
        tokio::select! {
            _ = shutdown.cancelled() => false,
            waited = tokio::time::timeout(limit, idle) => {
                if waited.is_err() {
                    warn!(
                        pending = acq.pending_tile_count(),
                        waited_ms = self.config.timeouts.idle_ms,
                        "Tiles still pending; continuing"
                    );
                }
                true
            }
        }
    }
}
