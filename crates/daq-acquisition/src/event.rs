//! Acquisition events: the unit of work handed to the hardware engine.

use std::fmt;

use daq_core::position::XyPosition;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dedup::PendingTileKey;

/// Identity of one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcquisitionId(Uuid);

impl AcquisitionId {
    /// Fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AcquisitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AcquisitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instruction to acquire one image of one channel at one slice of one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileEvent {
    /// Acquisition the event belongs to
    pub acquisition: AcquisitionId,
    /// Time point
    pub frame_index: u32,
    /// Index into the active channels
    pub channel_index: usize,
    /// Slice index relative to the z origin (may be negative)
    pub slice_index: i32,
    /// Position index assigned by storage
    pub position_index: usize,
    /// Target focus position, channel offset included
    pub z_position: f64,
    /// Target tile
    pub xy_position: XyPosition,
}

impl TileEvent {
    /// Dedup key of the tile this event acquires.
    pub fn pending_key(&self) -> PendingTileKey {
        PendingTileKey::new(
            self.xy_position.grid_row,
            self.xy_position.grid_col,
            self.slice_index,
            self.channel_index,
        )
    }
}

/// Item of the event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    /// Acquire one image
    Acquire(TileEvent),
    /// The acquisition has no more work; the engine closes the output.
    AcquisitionFinished {
        /// Acquisition that finished
        acquisition: AcquisitionId,
    },
    /// The engine task should exit.
    EngineTaskFinished,
}

impl AcquisitionEvent {
    /// Whether this is one of the two terminal sentinels.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AcquisitionEvent::Acquire(_))
    }

    /// The tile event, if this is one.
    pub fn as_tile(&self) -> Option<&TileEvent> {
        match self {
            AcquisitionEvent::Acquire(tile) => Some(tile),
            _ => None,
        }
    }
}

impl fmt::Display for AcquisitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionEvent::Acquire(t) => write!(
                f,
                "acquire p{} ({}, {}) s{} c{} f{}",
                t.position_index,
                t.xy_position.grid_row,
                t.xy_position.grid_col,
                t.slice_index,
                t.channel_index,
                t.frame_index
            ),
            AcquisitionEvent::AcquisitionFinished { .. } => write!(f, "acquisition finished"),
            AcquisitionEvent::EngineTaskFinished => write!(f, "engine task finished"),
        }
    }
}
