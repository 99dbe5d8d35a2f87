//! Acquisition settings and per-mode profiles.

use std::path::PathBuf;

use daq_core::limits::{EXPLORE_EVENT_QUEUE_CAP, FIXED_AREA_EVENT_QUEUE_CAP};
use daq_core::{AppResult, ChannelSpec, DaqError, GridCell};
use serde::{Deserialize, Serialize};

/// Settings shared by every acquisition mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Requested acquisition name; storage may suffix it to make it unique
    pub name: String,
    /// Directory storage writes into
    #[serde(default)]
    pub dir: PathBuf,
    /// Distance between focal slices
    pub z_step: f64,
    /// Tile overlap as a percentage of the image size
    #[serde(default)]
    pub tile_overlap_percent: f64,
    /// Channels to acquire
    #[serde(default)]
    pub channels: ChannelSpec,
    /// Explore or fixed-area
    #[serde(default)]
    pub mode: AcquisitionMode,
}

/// How events are produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Tiles are requested interactively and scheduled on demand.
    #[default]
    Explore,
    /// Every event is computed up front from a fixed plan.
    FixedArea(FixedAreaSettings),
}

/// Plan of a fixed-area acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedAreaSettings {
    /// Grid cells to visit, in order
    pub positions: Vec<GridCell>,
    /// First focus position of the stack
    pub z_start: f64,
    /// Last focus position of the stack
    pub z_end: f64,
    /// Number of time points
    #[serde(default = "default_frames")]
    pub num_frames: u32,
}

fn default_frames() -> u32 {
    1
}

/// Queue sizing and initial dataset shape derived from the mode.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionProfile {
    /// Event queue capacity
    pub event_queue_capacity: usize,
    /// Frames announced in the summary metadata
    pub initial_num_frames: u32,
    /// Slices announced in the summary metadata
    pub initial_num_slices: usize,
    /// Positions known before the first event
    pub initial_positions: Vec<GridCell>,
}

impl AcquisitionMode {
    /// Whether tiles are requested interactively.
    pub fn is_explore(&self) -> bool {
        matches!(self, AcquisitionMode::Explore)
    }

    /// Short name used in logs and metadata.
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionMode::Explore => "explore",
            AcquisitionMode::FixedArea(_) => "fixed_area",
        }
    }

    /// Queue sizing and initial dataset shape for this mode.
    pub fn profile(&self, z_step: f64) -> AcquisitionProfile {
        match self {
            AcquisitionMode::Explore => AcquisitionProfile {
                event_queue_capacity: EXPLORE_EVENT_QUEUE_CAP,
                initial_num_frames: 1,
                initial_num_slices: 1,
                initial_positions: Vec::new(),
            },
            AcquisitionMode::FixedArea(plan) => AcquisitionProfile {
                event_queue_capacity: FIXED_AREA_EVENT_QUEUE_CAP,
                initial_num_frames: plan.num_frames,
                initial_num_slices: ((plan.z_end - plan.z_start).abs() / z_step).round() as usize
                    + 1,
                initial_positions: plan.positions.clone(),
            },
        }
    }
}

impl AcquisitionSettings {
    /// Explore settings with no channels and no overlap.
    pub fn explore(name: impl Into<String>, z_step: f64) -> Self {
        Self {
            name: name.into(),
            dir: PathBuf::new(),
            z_step,
            tile_overlap_percent: 0.0,
            channels: ChannelSpec::empty(),
            mode: AcquisitionMode::Explore,
        }
    }

    /// Fixed-area settings following `plan`.
    pub fn fixed_area(name: impl Into<String>, z_step: f64, plan: FixedAreaSettings) -> Self {
        Self {
            mode: AcquisitionMode::FixedArea(plan),
            ..Self::explore(name, z_step)
        }
    }

    /// Replace the channel set.
    pub fn with_channels(mut self, channels: ChannelSpec) -> Self {
        self.channels = channels;
        self
    }

    /// Set the tile overlap percentage.
    pub fn with_overlap(mut self, percent: f64) -> Self {
        self.tile_overlap_percent = percent;
        self
    }

    /// Set the storage directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Profile of the configured mode.
    pub fn profile(&self) -> AcquisitionProfile {
        self.mode.profile(self.z_step)
    }

    /// Reject settings no acquisition can run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(DaqError::Configuration(
                "acquisition name must not be empty".into(),
            ));
        }
        if !self.z_step.is_finite() || self.z_step <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "z_step must be positive, got {}",
                self.z_step
            )));
        }
        if !(0.0..100.0).contains(&self.tile_overlap_percent) {
            return Err(DaqError::Configuration(format!(
                "tile_overlap_percent must be in [0, 100), got {}",
                self.tile_overlap_percent
            )));
        }
        if let AcquisitionMode::FixedArea(plan) = &self.mode {
            if plan.positions.is_empty() {
                return Err(DaqError::Configuration(
                    "fixed-area acquisition needs at least one position".into(),
                ));
            }
            if plan.num_frames == 0 {
                return Err(DaqError::Configuration(
                    "fixed-area acquisition needs at least one frame".into(),
                ));
            }
            if !plan.z_start.is_finite() || !plan.z_end.is_finite() {
                return Err(DaqError::Configuration(
                    "fixed-area z range must be finite".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explore_profile_uses_large_queue() {
        let profile = AcquisitionSettings::explore("tissue", 1.0).profile();
        assert_eq!(profile.event_queue_capacity, EXPLORE_EVENT_QUEUE_CAP);
        assert!(profile.initial_positions.is_empty());
    }

    #[test]
    fn fixed_area_profile_counts_slices() {
        let plan = FixedAreaSettings {
            positions: vec![GridCell::new(0, 0), GridCell::new(0, 1)],
            z_start: 10.0,
            z_end: 0.0,
            num_frames: 3,
        };
        let profile = AcquisitionSettings::fixed_area("grid", 2.5, plan).profile();
        assert_eq!(profile.event_queue_capacity, FIXED_AREA_EVENT_QUEUE_CAP);
        assert_eq!(profile.initial_num_slices, 5);
        assert_eq!(profile.initial_num_frames, 3);
        assert_eq!(profile.initial_positions.len(), 2);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(AcquisitionSettings::explore("", 1.0).validate().is_err());
        assert!(AcquisitionSettings::explore("a", 0.0).validate().is_err());
        assert!(AcquisitionSettings::explore("a", 1.0)
            .with_overlap(100.0)
            .validate()
            .is_err());
        assert!(AcquisitionSettings::explore("a", 1.0)
            .with_overlap(10.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn mode_deserializes_from_tag() {
        let settings: AcquisitionSettings = serde_json::from_str(
            r#"{
                "name": "grid",
                "z_step": 1.0,
                "mode": {"type": "fixed_area", "positions": [{"row": 0, "col": 1}], "z_start": 0.0, "z_end": 2.0}
            }"#,
        )
        .unwrap();
        match settings.mode {
            AcquisitionMode::FixedArea(plan) => {
                assert_eq!(plan.num_frames, 1);
                assert_eq!(plan.positions, vec![GridCell::new(0, 1)]);
            }
            AcquisitionMode::Explore => panic!("expected fixed-area mode"),
        }

        let settings: AcquisitionSettings =
            serde_json::from_str(r#"{"name": "x", "z_step": 0.5}"#).unwrap();
        assert!(settings.mode.is_explore());
    }

    #[test]
    fn channels_load_from_toml() {
        let settings: AcquisitionSettings = toml::from_str(
            r#"
            name = "tissue"
            z_step = 2.0
            tile_overlap_percent = 15.0

            [[channels]]
            name = "DAPI"
            offset = -1.0

            [[channels]]
            name = "FITC"
            active = false

            [[channels]]
            name = "TRITC"
            unique_event = false
            "#,
        )
        .unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.channels.schedulable_count(), 2);
        assert_eq!(settings.channels.active_channel_names(), vec!["DAPI", "TRITC"]);
        assert_eq!(settings.channels.offset(0), -1.0);
        assert!(!settings.channels.is_unique_event(1));
    }
}
