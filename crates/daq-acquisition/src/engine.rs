//! Reference engine: the single consumer of an acquisition's events.
//!
//! Moves the stage and focus to each tile event, snaps, tags the frame and
//! hands it back to the acquisition. Stops on `EngineTaskFinished`.

use daq_core::data::tags;
use daq_core::{AppResult, DaqError, TaggedImage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::acquisition::{Acquisition, Devices};
use crate::event::{AcquisitionEvent, TileEvent};

/// Counters returned when the engine loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Images handed to the acquisition
    pub images: u64,
    /// Events whose hardware actions failed
    pub failures: u64,
}

/// Hardware-driving consumer.
pub struct AcquisitionEngine {
    devices: Devices,
}

impl AcquisitionEngine {
    /// Engine driving `devices`.
    pub fn new(devices: Devices) -> Self {
        Self { devices }
    }

    /// Consume events until `EngineTaskFinished` or cancellation.
    #[instrument(skip_all, fields(acquisition = %acq.id()), err)]
    pub async fn run(&self, acq: &Acquisition, cancel: &CancellationToken) -> AppResult<EngineReport> {
        let mut report = EngineReport::default();
        loop {
            let event = acq.next_event(cancel).await?;
            match &event {
                AcquisitionEvent::Acquire(tile) => {
                    match self.acquire(tile).await {
                        Ok(image) => {
                            acq.add_image(image, cancel).await?;
                            report.images += 1;
                        }
                        Err(e) => {
                            report.failures += 1;
                            error!(error = %e, event = %event, "Tile acquisition failed");
                        }
                    }
                    acq.report_event_acquired(&event);
                }
                AcquisitionEvent::AcquisitionFinished { .. } => {
                    debug!("End of acquisition reached");
                    acq.finish_output().await?;
                }
                AcquisitionEvent::EngineTaskFinished => break,
            }
        }
        info!(images = report.images, failures = report.failures, "Engine task finished");
        Ok(report)
    }

    async fn acquire(&self, tile: &TileEvent) -> AppResult<TaggedImage> {
        let stage = &self.devices.xy_stage;
        stage
            .move_xy(tile.xy_position.x, tile.xy_position.y)
            .await
            .map_err(|e| DaqError::hardware(stage.device_name(), e))?;
        let focus = &self.devices.focus;
        focus
            .move_abs(tile.z_position)
            .await
            .map_err(|e| DaqError::hardware(focus.device_name(), e))?;
        let camera = &self.devices.camera;
        let frame = camera
            .snap()
            .await
            .map_err(|e| DaqError::hardware(camera.device_name(), e))?;
        frame.validate()?;

        Ok(TaggedImage::new(frame)
            .with_tag(tags::CHANNEL_INDEX, tile.channel_index)
            .with_tag(tags::SLICE_INDEX, tile.slice_index)
            .with_tag(tags::FRAME_INDEX, tile.frame_index)
            .with_tag(tags::POSITION_INDEX, tile.position_index)
            .with_tag(tags::Z_UM, tile.z_position)
            .with_tag(tags::X_UM, tile.xy_position.x)
            .with_tag(tags::Y_UM, tile.xy_position.y)
            .with_tag(tags::GRID_ROW, tile.xy_position.grid_row)
            .with_tag(tags::GRID_COL, tile.xy_position.grid_col))
    }
}
