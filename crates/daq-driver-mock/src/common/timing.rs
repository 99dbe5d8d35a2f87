//! Timing configuration for realistic mode.

use std::time::Duration;

use super::mode::MockMode;

/// Hardware-like delays of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Frame readout time in milliseconds (camera)
    pub frame_readout_ms: u64,
    /// Settling time after a move in milliseconds (stage, focus)
    pub settling_time_ms: u64,
    /// Round-trip delay of a position query in milliseconds
    pub communication_delay_ms: u64,
}

impl TimingConfig {
    /// Camera at roughly 30 fps
    pub fn camera() -> Self {
        Self {
            frame_readout_ms: 33,
            settling_time_ms: 0,
            communication_delay_ms: 2,
        }
    }

    /// Motorized XY stage
    pub fn xy_stage() -> Self {
        Self {
            frame_readout_ms: 0,
            settling_time_ms: 50,
            communication_delay_ms: 5,
        }
    }

    /// Piezo or motorized focus drive
    pub fn focus() -> Self {
        Self {
            frame_readout_ms: 0,
            settling_time_ms: 10,
            communication_delay_ms: 2,
        }
    }

    /// Sleep for `ms` milliseconds unless `mode` is instant.
    pub(crate) async fn wait(mode: MockMode, ms: u64) {
        if mode == MockMode::Realistic && ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing_is_zero() {
        let config = TimingConfig::default();
        assert_eq!(config.frame_readout_ms, 0);
        assert_eq!(config.settling_time_ms, 0);
        assert_eq!(config.communication_delay_ms, 0);
    }

    #[test]
    fn device_presets() {
        assert_eq!(TimingConfig::camera().frame_readout_ms, 33);
        assert_eq!(TimingConfig::xy_stage().settling_time_ms, 50);
        assert_eq!(TimingConfig::focus().settling_time_ms, 10);
    }
}
