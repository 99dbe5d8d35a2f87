//! Simulator configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. A TOML file (`config/explore.toml` by default)
//! 2. Environment variables prefixed with `EXPLORE_DAQ_`, nested keys
//!    separated by `__` (e.g. `EXPLORE_DAQ_APPLICATION__LOG_LEVEL=debug`)
//!
//! # Example
//! ```no_run
//! use explore_daq::config::SimulatorConfig;
//!
//! let config = SimulatorConfig::load()?;
//! config.validate()?;
//! println!("Acquisition: {}", config.acquisition.name);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use daq_acquisition::{AcquisitionMode, AcquisitionSettings, ShutdownTimeouts};
use daq_core::{AppResult, ChannelSetting, ChannelSpec, DaqError};
use daq_driver_mock::{MockCameraConfig, MockFocusConfig, MockMode, MockXyStageConfig};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::logging::OutputFormat;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/explore.toml";

/// Top-level simulator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Acquisition to run
    pub acquisition: AcquisitionConfig,
    /// Channels, in acquisition order
    #[serde(default)]
    pub channels: Vec<ChannelSetting>,
    /// Simulated hardware
    #[serde(default)]
    pub stage: StageConfig,
    /// Shutdown waits
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Scripted user gestures
    #[serde(default)]
    pub session: SessionConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
}

/// Acquisition settings as they appear in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    /// Requested acquisition name
    pub name: String,
    /// Directory checked for name collisions
    #[serde(default)]
    pub dir: PathBuf,
    /// Distance between slices in µm
    pub z_step: f64,
    /// Tile overlap in percent of the image size
    #[serde(default)]
    pub tile_overlap_percent: f64,
    /// Explore or fixed-area
    #[serde(default)]
    pub mode: AcquisitionMode,
}

/// Simulated devices.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageConfig {
    /// Instant or realistic timing
    #[serde(default)]
    pub mock_mode: MockMode,
    /// XY stage
    #[serde(default)]
    pub xy: MockXyStageConfig,
    /// Focus drive
    #[serde(default)]
    pub focus: MockFocusConfig,
    /// Camera
    #[serde(default)]
    pub camera: MockCameraConfig,
    /// Probability (0.0 to 1.0) that a camera snap fails
    #[serde(default)]
    pub camera_failure_rate: f64,
    /// Seed for injected failures; unseeded runs differ each time
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Bounded waits, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Dispatcher shutdown
    #[serde(default = "default_dispatcher_ms")]
    pub dispatcher_ms: u64,
    /// Sink drain
    #[serde(default = "default_sink_ms")]
    pub sink_ms: u64,
    /// How long the session may wait for pending tiles before aborting
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dispatcher_ms: default_dispatcher_ms(),
            sink_ms: default_sink_ms(),
            idle_ms: default_idle_ms(),
        }
    }
}

fn default_dispatcher_ms() -> u64 {
    2_000
}

fn default_sink_ms() -> u64 {
    30_000
}

fn default_idle_ms() -> u64 {
    60_000
}

/// Gestures replayed against an explore acquisition, in order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Requests to issue
    #[serde(default)]
    pub requests: Vec<TileRequest>,
}

/// One scripted gesture.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TileRequest {
    /// Move the stage and focus, then request the tile under the objective
    Here {
        /// Stage X in µm
        x: f64,
        /// Stage Y in µm
        y: f64,
        /// Focus position in µm
        z: f64,
    },
    /// Set the focus range used by region requests
    ZLimits {
        /// One end of the range
        top: f64,
        /// The other end
        bottom: f64,
    },
    /// Request every tile between two grid corners
    Region {
        /// First corner row
        row1: i64,
        /// First corner column
        col1: i64,
        /// Second corner row
        row2: i64,
        /// Second corner column
        col2: i64,
    },
}

impl SimulatorConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("EXPLORE_DAQ_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if !names.insert(channel.name.as_str()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate channel name: {}",
                    channel.name
                )));
            }
        }

        let camera = &self.stage.camera;
        if camera.width == 0 || camera.height == 0 {
            return Err(DaqError::Configuration(format!(
                "Camera sensor must be non-empty, got {}x{}",
                camera.width, camera.height
            )));
        }
        if !(camera.pixel_size_um.is_finite() && camera.pixel_size_um > 0.0) {
            return Err(DaqError::Configuration(format!(
                "Invalid pixel_size_um {}",
                camera.pixel_size_um
            )));
        }

        let rate = self.stage.camera_failure_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(DaqError::Configuration(format!(
                "camera_failure_rate must be within 0.0..=1.0, got {rate}"
            )));
        }

        if self.timeouts.dispatcher_ms == 0 || self.timeouts.sink_ms == 0 {
            return Err(DaqError::Configuration(
                "Shutdown timeouts must be positive".into(),
            ));
        }

        if !self.session.requests.is_empty() && !self.acquisition.mode.is_explore() {
            return Err(DaqError::Configuration(
                "Session requests need an explore acquisition".into(),
            ));
        }

        self.settings().validate()
    }

    /// Acquisition settings with the configured channels.
    pub fn settings(&self) -> AcquisitionSettings {
        let acq = &self.acquisition;
        AcquisitionSettings {
            name: acq.name.clone(),
            dir: acq.dir.clone(),
            z_step: acq.z_step,
            tile_overlap_percent: acq.tile_overlap_percent,
            channels: ChannelSpec::new(self.channels.clone()),
            mode: acq.mode.clone(),
        }
    }

    /// Shutdown waits for the acquisition.
    pub fn shutdown_timeouts(&self) -> ShutdownTimeouts {
        ShutdownTimeouts {
            dispatcher: Duration::from_millis(self.timeouts.dispatcher_ms),
            sink: Duration::from_millis(self.timeouts.sink_ms),
        }
    }
}
