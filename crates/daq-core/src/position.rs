//! Stage positions and tile grid coordinates.

use serde::{Deserialize, Serialize};

/// A tile of the explore grid: grid indices plus the stage coordinates of its
/// center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyPosition {
    /// Grid row (may be negative; the grid grows in every direction)
    pub grid_row: i64,
    /// Grid column
    pub grid_col: i64,
    /// Stage X of the tile center
    pub x: f64,
    /// Stage Y of the tile center
    pub y: f64,
}

impl XyPosition {
    /// Create a position.
    pub fn new(grid_row: i64, grid_col: i64, x: f64, y: f64) -> Self {
        Self {
            grid_row,
            grid_col,
            x,
            y,
        }
    }
}

/// Grid cell address used when requesting a region of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    /// Grid row
    pub row: i64,
    /// Grid column
    pub col: i64,
}

impl GridCell {
    /// Create a cell address.
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }
}

/// Soft travel limits of a positioner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionLimits {
    /// Lowest allowed position
    pub lower: f64,
    /// Highest allowed position
    pub upper: f64,
}

impl PositionLimits {
    /// Create limits, normalizing the order of the bounds.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    /// Whether `position` lies within the limits (inclusive).
    pub fn contains(&self, position: f64) -> bool {
        position >= self.lower && position <= self.upper
    }
}
