//! Shared rig for acquisition integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use daq_acquisition::{
    Acquisition, AcquisitionEngine, AcquisitionEvent, AcquisitionSettings, Devices, EngineReport,
    ShutdownTimeouts, TileEvent,
};
use daq_core::{AppResult, ChannelSetting, ChannelSpec};
use daq_driver_mock::{MockCamera, MockFocusDrive, MockXyStage};
use daq_storage::{MemoryTileStorage, TileGrid};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Camera sensor edge in pixels; pixels are 1 µm so tiles are 16 µm apart.
pub const SENSOR: u32 = 16;

/// Mock hardware plus in-memory storage.
pub struct Rig {
    pub stage: Arc<MockXyStage>,
    pub focus: Arc<MockFocusDrive>,
    pub camera: Arc<MockCamera>,
    pub storage: Arc<MemoryTileStorage>,
}

impl Rig {
    /// Focus at z = 0 with limits ±100 µm, stage at the origin.
    pub fn new() -> Self {
        let stage = Arc::new(MockXyStage::new());
        let focus = Arc::new(MockFocusDrive::new(0.0).with_limits(-100.0, 100.0));
        let camera = Arc::new(
            MockCamera::with_config(daq_driver_mock::MockCameraConfig {
                width: SENSOR,
                height: SENSOR,
                pixel_size_um: 1.0,
            })
            .attached_to(stage.clone(), focus.clone()),
        );
        let storage = Arc::new(MemoryTileStorage::new(
            "explore",
            TileGrid::from_camera(SENSOR, SENSOR, 1.0, 0, 0),
        ));
        Self {
            stage,
            focus,
            camera,
            storage,
        }
    }

    pub fn devices(&self) -> Devices {
        Devices {
            xy_stage: self.stage.clone(),
            focus: self.focus.clone(),
            camera: self.camera.clone(),
        }
    }

    /// Created acquisition with short shutdown waits.
    pub async fn create(&self, settings: AcquisitionSettings) -> AppResult<Acquisition> {
        Ok(
            Acquisition::create(settings, self.devices(), self.storage.clone())
                .await?
                .with_timeouts(ShutdownTimeouts {
                    dispatcher: Duration::from_secs(1),
                    sink: Duration::from_secs(5),
                }),
        )
    }

    /// Created, initialized and running acquisition.
    pub async fn launch(&self, settings: AcquisitionSettings) -> Arc<Acquisition> {
        let acq = self.create(settings).await.unwrap();
        acq.initialize().await.unwrap();
        acq.start().await.unwrap();
        Arc::new(acq)
    }

    /// Run the reference engine on its own task.
    pub fn spawn_engine(&self, acq: &Arc<Acquisition>) -> JoinHandle<AppResult<EngineReport>> {
        let engine = AcquisitionEngine::new(self.devices());
        let acq = acq.clone();
        tokio::spawn(async move { engine.run(&acq, &CancellationToken::new()).await })
    }
}

/// Explore settings with 1 µm slices.
pub fn explore(channels: Vec<ChannelSetting>) -> AcquisitionSettings {
    AcquisitionSettings::explore("explore", 1.0).with_channels(ChannelSpec::new(channels))
}

/// Tile events among `events`, in order.
pub fn tiles(events: &[AcquisitionEvent]) -> Vec<TileEvent> {
    events.iter().filter_map(|e| e.as_tile().cloned()).collect()
}

/// Poll `condition` every few milliseconds for up to two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
