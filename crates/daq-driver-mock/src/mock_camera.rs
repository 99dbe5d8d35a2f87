//! Mock camera that images a synthetic specimen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use daq_core::capabilities::Camera;
use daq_core::Frame;
use serde::Deserialize;

use crate::common::{ErrorConfig, MockMode, TimingConfig};
use crate::mock_focus::MockFocusDrive;
use crate::mock_stage::MockXyStage;
use crate::pattern::{render_specimen, FieldOfView};

/// Configuration for [`MockCamera`]
#[derive(Debug, Clone, Deserialize)]
pub struct MockCameraConfig {
    /// Sensor width in pixels
    #[serde(default = "default_width")]
    pub width: u32,
    /// Sensor height in pixels
    #[serde(default = "default_height")]
    pub height: u32,
    /// Pixel size at the specimen in µm
    #[serde(default = "default_pixel_size")]
    pub pixel_size_um: f64,
}

fn default_width() -> u32 {
    256
}

fn default_height() -> u32 {
    256
}

fn default_pixel_size() -> f64 {
    0.5
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            pixel_size_um: default_pixel_size(),
        }
    }
}

/// Simulated camera.
///
/// When attached to a stage and focus drive it renders what lies under the
/// objective; otherwise it images the specimen at the origin.
pub struct MockCamera {
    name: String,
    width: u32,
    height: u32,
    pixel_size_um: f64,
    stage: Option<Arc<MockXyStage>>,
    focus: Option<Arc<MockFocusDrive>>,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
    frame_count: AtomicU64,
}

impl MockCamera {
    /// Camera with a `width` x `height` sensor.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_config(MockCameraConfig {
            width,
            height,
            ..MockCameraConfig::default()
        })
    }

    /// Camera from configuration.
    pub fn with_config(config: MockCameraConfig) -> Self {
        Self {
            name: "Camera".to_string(),
            width: config.width,
            height: config.height,
            pixel_size_um: config.pixel_size_um,
            stage: None,
            focus: None,
            mode: MockMode::Instant,
            timing: TimingConfig::camera(),
            error_config: ErrorConfig::none(),
            frame_count: AtomicU64::new(0),
        }
    }

    /// Image whatever the given stage and focus drive point at.
    pub fn attached_to(mut self, stage: Arc<MockXyStage>, focus: Arc<MockFocusDrive>) -> Self {
        self.stage = Some(stage);
        self.focus = Some(focus);
        self
    }

    /// Set the operational mode.
    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set error injection.
    pub fn with_error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Pixel size at the specimen in µm.
    pub fn pixel_size_um(&self) -> f64 {
        self.pixel_size_um
    }

    /// Frames produced so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Handle for injecting failures at runtime.
    pub fn errors(&self) -> &ErrorConfig {
        &self.error_config
    }

    fn field_of_view(&self) -> FieldOfView {
        let (x, y) = self.stage.as_ref().map_or((0.0, 0.0), |s| s.current());
        let z = self.focus.as_ref().map_or(0.0, |f| f.current());
        FieldOfView {
            x,
            y,
            z,
            pixel_size_um: self.pixel_size_um,
        }
    }
}

#[async_trait]
impl Camera for MockCamera {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn image_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn snap(&self) -> Result<Frame> {
        self.error_config.check_operation(&self.name, "snap")?;
        TimingConfig::wait(self.mode, self.timing.frame_readout_ms).await;
        let frame_num = self.frame_count.fetch_add(1, Ordering::Relaxed);
        let pixels = render_specimen(self.width, self.height, self.field_of_view(), frame_num);
        Ok(Frame::from_u16(self.width, self.height, &pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snap_produces_sensor_sized_frames() {
        let camera = MockCamera::new(32, 16);
        let frame = camera.snap().await.unwrap();
        assert_eq!((frame.width, frame.height, frame.bit_depth), (32, 16, 16));
        assert_eq!(frame.data.len(), 32 * 16 * 2);
        assert_eq!(camera.frame_count(), 1);
    }

    #[tokio::test]
    async fn follows_attached_stage() {
        let stage = Arc::new(MockXyStage::new());
        let focus = Arc::new(MockFocusDrive::new(0.0));
        let camera = MockCamera::new(8, 8).attached_to(stage.clone(), focus);

        let at_blob = camera.snap().await.unwrap().mean();
        stage.set_position(20.0, 20.0);
        let between_blobs = camera.snap().await.unwrap().mean();
        assert!(at_blob > between_blobs);
    }

    #[tokio::test]
    async fn injected_snap_failure() {
        let camera = MockCamera::new(4, 4);
        camera.errors().fail("snap");
        assert!(camera.snap().await.is_err());
    }
}
