//! Registry of the acquisition's positions.

use std::collections::HashMap;

use daq_core::{GridCell, XyPosition};
use parking_lot::RwLock;

use crate::grid::TileGrid;

#[derive(Debug, Default)]
struct Positions {
    list: Vec<XyPosition>,
    by_cell: HashMap<GridCell, usize>,
}

/// Append-only list of positions, indexed by grid cell.
///
/// Indices are assigned in order of first use and never change.
#[derive(Debug)]
pub struct PositionRegistry {
    grid: TileGrid,
    positions: RwLock<Positions>,
}

impl PositionRegistry {
    /// Empty registry over `grid`.
    pub fn new(grid: TileGrid) -> Self {
        Self {
            grid,
            positions: RwLock::new(Positions::default()),
        }
    }

    /// Grid the registry lays tiles on.
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Index of `cell`, registering it on first use.
    pub fn index_for(&self, cell: GridCell) -> usize {
        if let Some(&index) = self.positions.read().by_cell.get(&cell) {
            return index;
        }
        let mut positions = self.positions.write();
        if let Some(&index) = positions.by_cell.get(&cell) {
            return index;
        }
        let (x, y) = self.grid.center_of(cell);
        let index = positions.list.len();
        positions.list.push(XyPosition::new(cell.row, cell.col, x, y));
        positions.by_cell.insert(cell, index);
        tracing::debug!(index, row = cell.row, col = cell.col, "Registered position");
        index
    }

    /// Position at `index`, if registered.
    pub fn get(&self, index: usize) -> Option<XyPosition> {
        self.positions.read().list.get(index).copied()
    }

    /// Number of registered positions.
    pub fn len(&self) -> usize {
        self.positions.read().list.len()
    }

    /// Whether no position is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All positions in index order.
    pub fn list(&self) -> Vec<XyPosition> {
        self.positions.read().list.clone()
    }
}
