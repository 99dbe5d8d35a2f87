//! Collaborator capabilities consumed by the acquisition scheduler.
//!
//! The scheduler never drives hardware or writes files itself. It talks to two
//! external collaborators through small, focused traits:
//!
//! - The **device layer**: [`XyStage`], [`FocusDrive`], [`Camera`]
//! - The **storage collaborator**: [`TileStorage`]
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! async fn tile_under_objective<S, T>(stage: &S, storage: &T) -> Result<usize>
//! where
//!     S: XyStage,
//!     T: TileStorage,
//! {
//!     let (x, y) = stage.xy_position().await?;
//!     storage.position_index_from_stage_coords(x, y).await
//! }
//! ```

use crate::data::{Frame, TaggedImage};
use crate::position::{GridCell, PositionLimits, XyPosition};
use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Device Layer
// =============================================================================

/// Capability: XY stage
///
/// # Contract
/// - Positions are in stage-native units (typically µm)
/// - `move_xy` returns once the stage has settled
#[async_trait]
pub trait XyStage: Send + Sync {
    /// Device identifier
    fn device_name(&self) -> &str;

    /// Current (x, y) position
    async fn xy_position(&self) -> Result<(f64, f64)>;

    /// Move to an absolute (x, y) position
    async fn move_xy(&self, x: f64, y: f64) -> Result<()>;
}

/// Capability: Focus (z) drive
///
/// # Contract
/// - `position_limits` is queried once when an acquisition is constructed;
///   `Ok(None)` means the device exposes no soft limits
#[async_trait]
pub trait FocusDrive: Send + Sync {
    /// Device identifier
    fn device_name(&self) -> &str;

    /// Current focus position
    async fn position(&self) -> Result<f64>;

    /// Move to an absolute focus position
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Soft limits of the drive's position property, if it has any
    async fn position_limits(&self) -> Result<Option<PositionLimits>>;
}

/// Capability: Camera
#[async_trait]
pub trait Camera: Send + Sync {
    /// Device identifier
    fn device_name(&self) -> &str;

    /// Sensor size in pixels (width, height)
    fn image_size(&self) -> (u32, u32);

    /// Expose and read out one frame
    async fn snap(&self) -> Result<Frame>;
}

// =============================================================================
// Storage Collaborator
// =============================================================================

/// Capability: tiled image storage
///
/// Owns the position list of the acquisition. Resolving a grid cell that has
/// no position yet creates its metadata; repeated resolution of the same cell
/// returns the same index.
#[async_trait]
pub trait TileStorage: Send + Sync {
    /// Position index of the tile containing stage coordinates (x, y)
    async fn position_index_from_stage_coords(&self, x: f64, y: f64) -> Result<usize>;

    /// Position indices for explicit grid cells, in the order given
    async fn position_indices(&self, cells: &[GridCell]) -> Result<Vec<usize>>;

    /// Grid and stage coordinates of a position index
    async fn xy_position(&self, position_index: usize) -> Result<XyPosition>;

    /// Unique acquisition name chosen by storage (e.g. `name_3`)
    fn unique_acq_name(&self) -> String;

    /// Record the summary metadata for the acquisition
    async fn put_summary_metadata(&self, summary: serde_json::Value) -> Result<()>;

    /// Persist one image
    async fn store_image(&self, image: TaggedImage) -> Result<()>;

    /// Flush and close; no images are stored after this call
    async fn finish(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFocus;

    #[async_trait]
    impl FocusDrive for FixedFocus {
        fn device_name(&self) -> &str {
            "Z"
        }

        async fn position(&self) -> Result<f64> {
            Ok(12.5)
        }

        async fn move_abs(&self, _position: f64) -> Result<()> {
            Ok(())
        }

        async fn position_limits(&self) -> Result<Option<PositionLimits>> {
            Ok(Some(PositionLimits::new(100.0, -100.0)))
        }
    }

    #[tokio::test]
    async fn focus_drive_is_object_safe() {
        let focus: Box<dyn FocusDrive> = Box::new(FixedFocus);
        assert_eq!(focus.position().await.unwrap(), 12.5);
        let limits = focus.position_limits().await.unwrap().unwrap();
        assert_eq!(limits.lower, -100.0);
        assert!(limits.contains(0.0));
        assert!(!limits.contains(100.5));
    }
}
