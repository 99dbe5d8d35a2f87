//! Mock XY stage.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use daq_core::capabilities::XyStage;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::common::{ErrorConfig, MockMode, TimingConfig};

/// Configuration for [`MockXyStage`]
#[derive(Debug, Clone, Deserialize)]
pub struct MockXyStageConfig {
    /// Initial X in µm
    #[serde(default)]
    pub initial_x: f64,
    /// Initial Y in µm
    #[serde(default)]
    pub initial_y: f64,
    /// Travel range per axis in µm, centered on zero
    #[serde(default)]
    pub travel_um: Option<f64>,
}

impl Default for MockXyStageConfig {
    fn default() -> Self {
        Self {
            initial_x: 0.0,
            initial_y: 0.0,
            travel_um: None,
        }
    }
}

/// Limit behavior when a move exceeds the travel range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitBehavior {
    /// Reject the move
    HardStop,
    /// Move to the boundary without error
    Clamp,
}

/// Rectangular travel range of the stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageLimits {
    /// Smallest X
    pub min_x: f64,
    /// Largest X
    pub max_x: f64,
    /// Smallest Y
    pub min_y: f64,
    /// Largest Y
    pub max_y: f64,
    /// What happens at the boundary
    pub behavior: LimitBehavior,
}

impl StageLimits {
    /// Square travel range of `travel` µm centered on zero, rejecting moves
    /// outside it.
    pub fn hard_stop(travel: f64) -> Self {
        let half = travel.abs() / 2.0;
        Self {
            min_x: -half,
            max_x: half,
            min_y: -half,
            max_y: half,
            behavior: LimitBehavior::HardStop,
        }
    }

    /// Same range, clamping instead of rejecting.
    pub fn clamp(travel: f64) -> Self {
        Self {
            behavior: LimitBehavior::Clamp,
            ..Self::hard_stop(travel)
        }
    }

    fn enforce(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match self.behavior {
            LimitBehavior::Clamp => Ok((
                x.clamp(self.min_x, self.max_x),
                y.clamp(self.min_y, self.max_y),
            )),
            LimitBehavior::HardStop => {
                if x < self.min_x || x > self.max_x || y < self.min_y || y > self.max_y {
                    Err(anyhow!(
                        "Position ({:.1}, {:.1}) µm outside travel range [{:.1}, {:.1}] x [{:.1}, {:.1}]",
                        x,
                        y,
                        self.min_x,
                        self.max_x,
                        self.min_y,
                        self.max_y
                    ))
                } else {
                    Ok((x, y))
                }
            }
        }
    }
}

/// Simulated motorized XY stage.
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockXyStage::builder()
///     .position(100.0, -50.0)
///     .limits(StageLimits::clamp(25_000.0))
///     .build();
///
/// stage.move_xy(10.0, 20.0).await?;
/// assert_eq!(stage.xy_position().await?, (10.0, 20.0));
/// ```
pub struct MockXyStage {
    name: String,
    position: Mutex<(f64, f64)>,
    limits: Option<StageLimits>,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
    moves: Mutex<u64>,
}

impl MockXyStage {
    /// Stage at the origin with instant moves.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Stage from configuration.
    pub fn with_config(config: MockXyStageConfig) -> Self {
        let mut builder = Self::builder().position(config.initial_x, config.initial_y);
        if let Some(travel) = config.travel_um {
            builder = builder.limits(StageLimits::hard_stop(travel));
        }
        builder.build()
    }

    /// Builder for configuring a stage
    pub fn builder() -> MockXyStageBuilder {
        MockXyStageBuilder::default()
    }

    /// Teleport without settling or error injection (test setup).
    pub fn set_position(&self, x: f64, y: f64) {
        *self.position.lock() = (x, y);
    }

    /// Current position without delay or error injection.
    pub fn current(&self) -> (f64, f64) {
        *self.position.lock()
    }

    /// Number of completed moves.
    pub fn move_count(&self) -> u64 {
        *self.moves.lock()
    }

    /// Handle for injecting failures at runtime.
    pub fn errors(&self) -> &ErrorConfig {
        &self.error_config
    }
}

impl Default for MockXyStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl XyStage for MockXyStage {
    fn device_name(&self) -> &str {
        &self.name
    }

    async fn xy_position(&self) -> Result<(f64, f64)> {
        self.error_config.check_operation(&self.name, "position")?;
        TimingConfig::wait(self.mode, self.timing.communication_delay_ms).await;
        Ok(*self.position.lock())
    }

    async fn move_xy(&self, x: f64, y: f64) -> Result<()> {
        self.error_config.check_operation(&self.name, "move")?;
        let (x, y) = match &self.limits {
            Some(limits) => limits.enforce(x, y)?,
            None => (x, y),
        };
        TimingConfig::wait(self.mode, self.timing.settling_time_ms).await;
        *self.position.lock() = (x, y);
        *self.moves.lock() += 1;
        tracing::trace!(stage = %self.name, x, y, "Stage moved");
        Ok(())
    }
}

/// Builder for [`MockXyStage`]
#[derive(Default)]
pub struct MockXyStageBuilder {
    name: Option<String>,
    position: (f64, f64),
    limits: Option<StageLimits>,
    mode: MockMode,
    timing: Option<TimingConfig>,
    error_config: ErrorConfig,
}

impl MockXyStageBuilder {
    /// Device name (default `XY`)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Initial position
    pub fn position(mut self, x: f64, y: f64) -> Self {
        self.position = (x, y);
        self
    }

    /// Travel range
    pub fn limits(mut self, limits: StageLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Operational mode
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Delays used in realistic mode
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Error injection
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Build the stage
    pub fn build(self) -> MockXyStage {
        MockXyStage {
            name: self.name.unwrap_or_else(|| "XY".to_string()),
            position: Mutex::new(self.position),
            limits: self.limits,
            mode: self.mode,
            timing: self.timing.unwrap_or_else(TimingConfig::xy_stage),
            error_config: self.error_config,
            moves: Mutex::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn moves_and_reports_position() {
        let stage = MockXyStage::new();
        stage.move_xy(12.5, -3.0).await.unwrap();
        assert_eq!(stage.xy_position().await.unwrap(), (12.5, -3.0));
        assert_eq!(stage.move_count(), 1);
    }

    #[tokio::test]
    async fn hard_stop_rejects_out_of_range() {
        let stage = MockXyStage::builder()
            .limits(StageLimits::hard_stop(100.0))
            .build();
        assert!(stage.move_xy(60.0, 0.0).await.is_err());
        assert_eq!(stage.current(), (0.0, 0.0));
    }

    #[tokio::test]
    async fn clamp_moves_to_boundary() {
        let stage = MockXyStage::builder()
            .limits(StageLimits::clamp(100.0))
            .build();
        stage.move_xy(60.0, -70.0).await.unwrap();
        assert_eq!(stage.current(), (50.0, -50.0));
    }

    #[tokio::test]
    async fn injected_position_failure() {
        let stage = MockXyStage::new();
        stage.errors().fail("position");
        assert!(stage.xy_position().await.is_err());
    }
}
