//! Image records flowing from the engine into storage.

use crate::error::DaqError;
use crate::limits::validate_frame_size;
use serde_json::{Map, Value};

/// Represents a single camera frame.
///
/// # Storage
/// Data is stored as a raw byte vector (`Vec<u8>`).
/// - 8-bit images: 1 byte per pixel.
/// - 12/16-bit images: 2 bytes per pixel, Little Endian.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bits per pixel (e.g., 8, 12, 16)
    pub bit_depth: u32,

    /// Raw pixel data
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a new frame from 16-bit pixel data.
    pub fn from_u16(width: u32, height: u32, pixels: &[u16]) -> Self {
        let data = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
        Self {
            width,
            height,
            bit_depth: 16,
            data,
        }
    }

    /// Create a new frame from 8-bit pixel data.
    pub fn from_u8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bit_depth: 8,
            data,
        }
    }

    /// Bytes used per pixel for this bit depth.
    pub fn bytes_per_pixel(&self) -> usize {
        if self.bit_depth <= 8 {
            1
        } else {
            2
        }
    }

    /// Check that the payload matches the declared geometry.
    pub fn validate(&self) -> Result<(), DaqError> {
        let size = validate_frame_size(self.width, self.height, self.bytes_per_pixel())?;
        if size.bytes != self.data.len() {
            return Err(DaqError::Storage(format!(
                "frame payload is {} bytes, expected {} for {}x{}@{}bit",
                self.data.len(),
                size.bytes,
                self.width,
                self.height,
                self.bit_depth
            )));
        }
        Ok(())
    }

    /// Get pixel value at (x, y) as u32 (handling bit depth conversion).
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let idx = (y * self.width + x) as usize;

        match self.bit_depth {
            8 => self.data.get(idx).map(|&v| v as u32),
            12 | 16 => {
                let start = idx * 2;
                let bytes = self.data.get(start..start + 2)?;
                Some(u16::from_le_bytes([bytes[0], bytes[1]]) as u32)
            }
            _ => None,
        }
    }

    /// Calculate mean pixel value.
    pub fn mean(&self) -> f64 {
        let (sum, count) = match self.bit_depth {
            8 => (
                self.data.iter().map(|&v| v as u64).sum::<u64>(),
                self.data.len(),
            ),
            12 | 16 => {
                let sum = self
                    .data
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]) as u64)
                    .sum::<u64>();
                (sum, self.data.len() / 2)
            }
            _ => (0, 0),
        };
        if count == 0 {
            0.0
        } else {
            sum as f64 / count as f64
        }
    }
}

/// Tag keys written by the engine and read back by storage and the viewer.
pub mod tags {
    /// Channel index of the image.
    pub const CHANNEL_INDEX: &str = "ChannelIndex";
    /// Slice (z) index of the image.
    pub const SLICE_INDEX: &str = "SliceIndex";
    /// Frame (time) index of the image.
    pub const FRAME_INDEX: &str = "FrameIndex";
    /// Position index of the image.
    pub const POSITION_INDEX: &str = "PositionIndex";
    /// Focus position at which the image was taken.
    pub const Z_UM: &str = "ZPositionUm";
    /// Stage X at which the image was taken.
    pub const X_UM: &str = "XPositionUm";
    /// Stage Y at which the image was taken.
    pub const Y_UM: &str = "YPositionUm";
    /// Grid row of the tile.
    pub const GRID_ROW: &str = "GridRowIndex";
    /// Grid column of the tile.
    pub const GRID_COL: &str = "GridColumnIndex";
}

/// An output image record: pixels plus tag metadata.
///
/// Produced by the engine, owned by the output queue until the sink hands it
/// to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedImage {
    /// Pixel payload.
    pub frame: Frame,
    /// Per-image metadata.
    pub tags: Map<String, Value>,
}

impl TaggedImage {
    /// Wrap a frame with an empty tag map.
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            tags: Map::new(),
        }
    }

    /// Builder-style tag insertion.
    pub fn with_tag(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    fn index_tag(&self, key: &str) -> Option<i64> {
        self.tags.get(key).and_then(Value::as_i64)
    }

    /// Channel index tag, if present.
    pub fn channel_index(&self) -> Option<i64> {
        self.index_tag(tags::CHANNEL_INDEX)
    }

    /// Slice index tag, if present.
    pub fn slice_index(&self) -> Option<i64> {
        self.index_tag(tags::SLICE_INDEX)
    }

    /// Frame index tag, if present.
    pub fn frame_index(&self) -> Option<i64> {
        self.index_tag(tags::FRAME_INDEX)
    }

    /// Position index tag, if present.
    pub fn position_index(&self) -> Option<i64> {
        self.index_tag(tags::POSITION_INDEX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_frame_reads_back_pixels() {
        let frame = Frame::from_u16(2, 2, &[1, 2, 3, 400]);
        assert_eq!(frame.get(1, 1), Some(400));
        assert_eq!(frame.get(2, 0), None);
        assert!((frame.mean() - 101.5).abs() < 1e-9);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_payload() {
        let frame = Frame::from_u8(4, 4, vec![0; 3]);
        assert!(frame.validate().is_err());
    }

    #[test]
    fn tags_round_through_accessors() {
        let image = TaggedImage::new(Frame::from_u8(1, 1, vec![7]))
            .with_tag(tags::CHANNEL_INDEX, 1)
            .with_tag(tags::SLICE_INDEX, -2);
        assert_eq!(image.channel_index(), Some(1));
        assert_eq!(image.slice_index(), Some(-2));
        assert_eq!(image.position_index(), None);
    }
}
