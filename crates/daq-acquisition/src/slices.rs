//! Lowest and highest slice indices ever scheduled.

use std::sync::atomic::{AtomicI32, Ordering};

/// Slice range that only ever widens.
///
/// Starts at `0..=0` (the z origin), so `min <= max` always holds.
#[derive(Debug, Default)]
pub struct SliceBounds {
    min: AtomicI32,
    max: AtomicI32,
}

impl SliceBounds {
    /// Bounds covering slice 0 only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Widen to include `lowest..=highest`.
    pub fn widen(&self, lowest: i32, highest: i32) {
        self.min.fetch_min(lowest.min(highest), Ordering::AcqRel);
        self.max.fetch_max(lowest.max(highest), Ordering::AcqRel);
    }

    /// Lowest slice index.
    pub fn min(&self) -> i32 {
        self.min.load(Ordering::Acquire)
    }

    /// Highest slice index.
    pub fn max(&self) -> i32 {
        self.max.load(Ordering::Acquire)
    }

    /// Number of slices spanned, both ends included.
    pub fn num_slices(&self) -> usize {
        (i64::from(self.max()) - i64::from(self.min()) + 1) as usize
    }
}
