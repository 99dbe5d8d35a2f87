//! Shared hard limits to prevent unbounded queue growth.
//!
//! This module centralizes:
//! - Queue capacities for the event and image pipelines
//! - Bounded wait and poll durations used during shutdown
//! - Frame payload limits
//!
//! Using centralized constants keeps the backpressure policy in one place.

use crate::error::DaqError;
use std::time::Duration;

// =============================================================================
// Queue Capacities
// =============================================================================

/// Event queue capacity for explore acquisitions.
///
/// Large so that a burst of newly revealed tiles can sit in the queue and be
/// drawn as "waiting to acquire" without throttling the user.
pub const EXPLORE_EVENT_QUEUE_CAP: usize = 2000;

/// Event queue capacity for fixed-area acquisitions.
///
/// The event source is pre-computed, so a short queue only has to keep the
/// engine fed.
pub const FIXED_AREA_EVENT_QUEUE_CAP: usize = 10;

/// Maximum number of images held in the output queue waiting to be saved.
pub const OUTPUT_QUEUE_SIZE: usize = 40;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Poll interval while waiting for the explore dispatcher to quiesce.
pub const DISPATCHER_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Upper bound on the wait for the explore dispatcher during abort.
pub const DISPATCHER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on the wait for the image sink to drain and exit.
pub const SINK_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Size Limits
// =============================================================================

/// Maximum allowed frame payload in bytes (default: 100MB).
pub const MAX_FRAME_BYTES: usize = 100 * 1024 * 1024;
/// Maximum supported width/height for frames.
pub const MAX_FRAME_DIMENSION: u32 = 65_536;

/// Validated frame sizing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    /// Pixel count.
    pub pixels: usize,
    /// Payload size in bytes.
    pub bytes: usize,
}

/// Validate frame dimensions and calculate pixel/byte sizes safely.
pub fn validate_frame_size(
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Result<FrameSize, DaqError> {
    if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(DaqError::FrameDimensionsTooLarge {
            width,
            height,
            max_dimension: MAX_FRAME_DIMENSION,
        });
    }

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or(DaqError::SizeOverflow {
            context: "frame pixel count",
        })?;

    let bytes = pixels
        .checked_mul(bytes_per_pixel)
        .ok_or(DaqError::SizeOverflow {
            context: "frame byte size",
        })?;

    if bytes > MAX_FRAME_BYTES {
        return Err(DaqError::FrameTooLarge {
            bytes,
            max_bytes: MAX_FRAME_BYTES,
        });
    }

    Ok(FrameSize { pixels, bytes })
}
