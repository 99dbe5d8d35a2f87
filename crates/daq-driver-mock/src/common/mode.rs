//! Operational modes for mock devices.

use serde::Deserialize;

/// How a mock device spends time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Hardware-like settling and readout delays - for the simulator
    Realistic,
}
