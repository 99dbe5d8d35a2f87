//! Tile deduplication table.
//!
//! Records which (tile, slice, channel) combinations are queued but not yet
//! acquired, so a repeated explore gesture does not schedule the same image
//! twice. Buckets are keyed by slice index and created on first use.

use std::collections::HashSet;

use dashmap::DashMap;

/// Identity of a pending tile acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingTileKey {
    /// Grid row
    pub row: i64,
    /// Grid column
    pub col: i64,
    /// Slice index
    pub slice_index: i32,
    /// Active channel index
    pub channel_index: usize,
}

impl PendingTileKey {
    /// Build a key.
    pub fn new(row: i64, col: i64, slice_index: i32, channel_index: usize) -> Self {
        Self {
            row,
            col,
            slice_index,
            channel_index,
        }
    }
}

/// Outcome of [`PendingTiles::try_reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The key was absent and is now recorded; the caller must schedule it.
    Reserved,
    /// The key is already pending; the caller skips it.
    Duplicate,
}

/// Concurrent map from slice index to the keys pending at that slice.
#[derive(Debug, Default)]
pub struct PendingTiles {
    slices: DashMap<i32, HashSet<PendingTileKey>>,
}

impl PendingTiles {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically record `key` under `slice` if it is not already there.
    pub fn try_reserve(&self, slice: i32, key: PendingTileKey) -> Reservation {
        if self.slices.entry(slice).or_default().insert(key) {
            Reservation::Reserved
        } else {
            Reservation::Duplicate
        }
    }

    /// Forget `key`. Returns whether it was pending; unknown keys are ignored.
    pub fn release(&self, slice: i32, key: &PendingTileKey) -> bool {
        self.slices
            .get_mut(&slice)
            .map_or(false, |mut keys| keys.remove(key))
    }

    /// Drop every pending key.
    pub fn clear(&self) {
        self.slices.clear();
    }

    /// Keys pending at `slice`, sorted.
    pub fn pending_at_slice(&self, slice: i32) -> Vec<PendingTileKey> {
        let mut keys: Vec<_> = self
            .slices
            .get(&slice)
            .map(|keys| keys.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    /// Whether `key` is pending at `slice`.
    pub fn contains(&self, slice: i32, key: &PendingTileKey) -> bool {
        self.slices
            .get(&slice)
            .map_or(false, |keys| keys.contains(key))
    }

    /// Total number of pending keys.
    pub fn len(&self) -> usize {
        self.slices.iter().map(|bucket| bucket.value().len()).sum()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.slices.iter().all(|bucket| bucket.value().is_empty())
    }

    /// Number of slices with at least one pending key.
    pub fn slice_count(&self) -> usize {
        self.slices
            .iter()
            .filter(|bucket| !bucket.value().is_empty())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn second_reservation_is_duplicate() {
        let table = PendingTiles::new();
        let key = PendingTileKey::new(1, 2, 3, 0);
        assert_eq!(table.try_reserve(3, key), Reservation::Reserved);
        assert_eq!(table.try_reserve(3, key), Reservation::Duplicate);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn release_unknown_key_is_noop() {
        let table = PendingTiles::new();
        assert!(!table.release(7, &PendingTileKey::new(0, 0, 7, 0)));
        assert!(table.is_empty());
        assert_eq!(table.slice_count(), 0);
    }

    #[test]
    fn release_allows_rescheduling() {
        let table = PendingTiles::new();
        let key = PendingTileKey::new(0, 0, -1, 1);
        table.try_reserve(-1, key);
        assert!(table.release(-1, &key));
        assert!(table.is_empty());
        assert_eq!(table.try_reserve(-1, key), Reservation::Reserved);
    }

    #[test]
    fn clear_empties_every_bucket() {
        let table = PendingTiles::new();
        for slice in 0..3 {
            table.try_reserve(slice, PendingTileKey::new(0, 0, slice, 0));
        }
        assert_eq!(table.slice_count(), 3);
        table.clear();
        assert!(table.is_empty());
        assert!(table.pending_at_slice(1).is_empty());
    }

    #[test]
    fn concurrent_reservations_admit_exactly_one() {
        let table = Arc::new(PendingTiles::new());
        let key = PendingTileKey::new(4, 4, 0, 0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || table.try_reserve(0, key))
            })
            .collect();
        let reserved = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| *r == Reservation::Reserved)
            .count();
        assert_eq!(reserved, 1);
        assert_eq!(table.pending_at_slice(0), vec![key]);
    }
}
