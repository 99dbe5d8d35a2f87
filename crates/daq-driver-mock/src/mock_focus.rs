//! Mock focus drive with soft position limits.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use daq_core::capabilities::FocusDrive;
use daq_core::PositionLimits;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::common::{ErrorConfig, MockMode, TimingConfig};

/// Configuration for [`MockFocusDrive`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MockFocusConfig {
    /// Initial focus position in µm
    #[serde(default)]
    pub initial_position: f64,
    /// Lower soft limit in µm
    #[serde(default)]
    pub lower_limit: Option<f64>,
    /// Upper soft limit in µm
    #[serde(default)]
    pub upper_limit: Option<f64>,
}

/// Simulated z drive.
///
/// Exposes soft limits through [`FocusDrive::position_limits`] when
/// configured, and rejects moves outside them.
pub struct MockFocusDrive {
    name: String,
    position: Mutex<f64>,
    limits: Option<PositionLimits>,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
}

impl MockFocusDrive {
    /// Drive at `position` with no limits.
    pub fn new(position: f64) -> Self {
        Self {
            name: "Z".to_string(),
            position: Mutex::new(position),
            limits: None,
            mode: MockMode::Instant,
            timing: TimingConfig::focus(),
            error_config: ErrorConfig::none(),
        }
    }

    /// Drive from configuration. Limits apply only if both ends are given.
    pub fn with_config(config: MockFocusConfig) -> Self {
        let drive = Self::new(config.initial_position);
        match (config.lower_limit, config.upper_limit) {
            (Some(lower), Some(upper)) => drive.with_limits(lower, upper),
            _ => drive,
        }
    }

    /// Set soft limits.
    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.limits = Some(PositionLimits::new(lower, upper));
        self
    }

    /// Set the device name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
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

    /// Teleport without settling or error injection (test setup).
    pub fn set_position(&self, z: f64) {
        *self.position.lock() = z;
    }

    /// Current position without delay or error injection.
    pub fn current(&self) -> f64 {
        *self.position.lock()
    }

    /// Handle for injecting failures at runtime.
    pub fn errors(&self) -> &ErrorConfig {
        &self.error_config
    }
}

#[async_trait]
impl FocusDrive for MockFocusDrive {
    fn device_name(&self) -> &str {
        &self.name
    }

    async fn position(&self) -> Result<f64> {
        self.error_config.check_operation(&self.name, "position")?;
        TimingConfig::wait(self.mode, self.timing.communication_delay_ms).await;
        Ok(*self.position.lock())
    }

    async fn move_abs(&self, position: f64) -> Result<()> {
        self.error_config.check_operation(&self.name, "move")?;
        if let Some(limits) = &self.limits {
            if !limits.contains(position) {
                return Err(anyhow!(
                    "Focus position {:.2} µm outside limits [{:.2}, {:.2}]",
                    position,
                    limits.lower,
                    limits.upper
                ));
            }
        }
        TimingConfig::wait(self.mode, self.timing.settling_time_ms).await;
        *self.position.lock() = position;
        Ok(())
    }

    async fn position_limits(&self) -> Result<Option<PositionLimits>> {
        self.error_config.check_operation(&self.name, "limits")?;
        Ok(self.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_configured_limits() {
        let focus = MockFocusDrive::new(5.0).with_limits(50.0, -50.0);
        let limits = focus.position_limits().await.unwrap().unwrap();
        assert_eq!((limits.lower, limits.upper), (-50.0, 50.0));
        assert!(focus.move_abs(60.0).await.is_err());
        focus.move_abs(-10.0).await.unwrap();
        assert_eq!(focus.position().await.unwrap(), -10.0);
    }

    #[tokio::test]
    async fn no_limits_by_default() {
        let focus = MockFocusDrive::with_config(MockFocusConfig {
            initial_position: 1.0,
            lower_limit: Some(0.0),
            upper_limit: None,
        });
        assert_eq!(focus.position_limits().await.unwrap(), None);
    }
}
