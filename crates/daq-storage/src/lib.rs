//! Storage collaborator for explore acquisitions.
//!
//! [`MemoryTileStorage`] keeps positions, summary metadata and images in
//! memory. It maps stage coordinates onto a [`TileGrid`] and hands out
//! position indices in order of first use.

pub mod grid;
pub mod memory;
pub mod position_registry;

pub use grid::TileGrid;
pub use memory::{ImageKey, MemoryTileStorage};
pub use position_registry::PositionRegistry;
