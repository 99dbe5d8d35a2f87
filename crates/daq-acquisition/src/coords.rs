//! Focus-axis coordinate mapping.
//!
//! Slice `0` sits at the z origin (the focus position when the acquisition
//! was created) and slice `i` at `origin + i * step`. Display slices shift
//! that index so the lowest slice seen so far is display slice `0`.

use std::ops::RangeInclusive;

use daq_core::{AppResult, DaqError};
use serde::{Deserialize, Serialize};

/// Rounds half-way cases towards positive infinity.
fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

/// Mapping between slice indices and physical focus positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZAxis {
    origin: f64,
    step: f64,
}

impl ZAxis {
    /// Axis with slice 0 at `origin`. `step` must be positive.
    pub fn new(origin: f64, step: f64) -> Self {
        Self { origin, step }
    }

    /// Focus position of slice 0.
    pub fn origin(&self) -> f64 {
        self.origin
    }

    /// Distance between adjacent slices.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Nearest slice index to focus position `z`.
    pub fn slice_index_for_z(&self, z: f64) -> i32 {
        round_half_up((z - self.origin) / self.step)
    }

    /// Focus position of `slice`.
    pub fn z_for_slice(&self, slice: i32) -> f64 {
        self.origin + self.step * f64::from(slice)
    }

    /// Focus position of a display slice, given the current lowest slice.
    pub fn z_for_display_slice(&self, display_slice: i32, min_slice: i32) -> f64 {
        self.z_for_slice(display_slice.saturating_add(min_slice))
    }

    /// Display slice of focus position `z`, given the current lowest slice.
    pub fn display_slice_for_z(&self, z: f64, min_slice: i32) -> i32 {
        self.slice_index_for_z(z).saturating_sub(min_slice)
    }
}

/// User-chosen focus range for region requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZLimits {
    /// Smaller of the two focus positions
    pub top: f64,
    /// Larger of the two focus positions
    pub bottom: f64,
}

impl ZLimits {
    /// Limits spanning `a` and `b` in either order. Both must be finite.
    pub fn new(a: f64, b: f64) -> AppResult<Self> {
        if !(a.is_finite() && b.is_finite()) {
            return Err(DaqError::Configuration(format!(
                "z limits must be finite, got {a} and {b}"
            )));
        }
        Ok(Self {
            top: a.min(b),
            bottom: a.max(b),
        })
    }

    /// Degenerate range at one focus position.
    pub fn at(z: f64) -> Self {
        Self { top: z, bottom: z }
    }

    /// Slices covered by the range on `axis`.
    pub fn slice_range(&self, axis: &ZAxis) -> RangeInclusive<i32> {
        axis.slice_index_for_z(self.top)..=axis.slice_index_for_z(self.bottom)
    }
}
