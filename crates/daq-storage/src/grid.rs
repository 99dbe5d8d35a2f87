//! Stage coordinates to tile grid mapping.

use daq_core::GridCell;
use serde::{Deserialize, Serialize};

/// Regular grid of tiles laid over the stage.
///
/// Tile `(0, 0)` is centered on the origin; rows grow with stage Y and
/// columns with stage X. Tile pitch is the image size minus the overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    /// Distance between tile centers along X in µm
    pub pitch_x_um: f64,
    /// Distance between tile centers along Y in µm
    pub pitch_y_um: f64,
    /// Stage X of tile (0, 0)
    pub origin_x: f64,
    /// Stage Y of tile (0, 0)
    pub origin_y: f64,
}

impl TileGrid {
    /// Grid for a camera of `width` x `height` pixels of `pixel_size_um`,
    /// overlapping neighbours by `overlap_x` / `overlap_y` pixels.
    pub fn from_camera(
        width: u32,
        height: u32,
        pixel_size_um: f64,
        overlap_x: u32,
        overlap_y: u32,
    ) -> Self {
        Self {
            pitch_x_um: f64::from(width.saturating_sub(overlap_x).max(1)) * pixel_size_um,
            pitch_y_um: f64::from(height.saturating_sub(overlap_y).max(1)) * pixel_size_um,
            origin_x: 0.0,
            origin_y: 0.0,
        }
    }

    /// Move tile (0, 0) to stage position (`x`, `y`).
    pub fn with_origin(mut self, x: f64, y: f64) -> Self {
        self.origin_x = x;
        self.origin_y = y;
        self
    }

    /// Tile containing stage position (`x`, `y`).
    pub fn cell_at(&self, x: f64, y: f64) -> GridCell {
        GridCell::new(
            ((y - self.origin_y) / self.pitch_y_um).round() as i64,
            ((x - self.origin_x) / self.pitch_x_um).round() as i64,
        )
    }

    /// Stage position of the center of `cell`.
    pub fn center_of(&self, cell: GridCell) -> (f64, f64) {
        (
            self.origin_x + cell.col as f64 * self.pitch_x_um,
            self.origin_y + cell.row as f64 * self.pitch_y_um,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_subtracts_overlap() {
        let grid = TileGrid::from_camera(100, 50, 2.0, 10, 0);
        assert_eq!(grid.pitch_x_um, 180.0);
        assert_eq!(grid.pitch_y_um, 100.0);
    }

    #[test]
    fn cell_and_center_agree() {
        let grid = TileGrid::from_camera(100, 100, 1.0, 0, 0).with_origin(5.0, -5.0);
        assert_eq!(grid.cell_at(5.0, -5.0), GridCell::new(0, 0));
        assert_eq!(grid.cell_at(150.0, 60.0), GridCell::new(1, 1));
        assert_eq!(grid.cell_at(-100.0, -160.0), GridCell::new(-2, -1));
        assert_eq!(grid.center_of(GridCell::new(-2, -1)), (-95.0, -205.0));
    }
}
