//! In-memory implementation of [`TileStorage`].

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use daq_core::capabilities::TileStorage;
use daq_core::{GridCell, TaggedImage, XyPosition};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info};

use crate::grid::TileGrid;
use crate::position_registry::PositionRegistry;

/// Address of a stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey {
    /// Position index
    pub position: i64,
    /// Time point
    pub frame: i64,
    /// Slice index
    pub slice: i64,
    /// Channel index
    pub channel: i64,
}

impl ImageKey {
    fn of(image: &TaggedImage) -> Result<Self> {
        let missing = |tag| anyhow!("image is missing the {} tag", tag);
        Ok(Self {
            position: image.position_index().ok_or_else(|| missing("position"))?,
            frame: image.frame_index().unwrap_or(0),
            slice: image.slice_index().ok_or_else(|| missing("slice"))?,
            channel: image.channel_index().unwrap_or(0),
        })
    }
}

/// Names handed out so far, shared by every storage created from the same
/// registry so two acquisitions never get the same name.
#[derive(Debug, Clone, Default)]
pub(crate) struct NameRegistry {
    used: Arc<Mutex<HashSet<String>>>,
}

impl NameRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `prefix`, or `prefix_N` with the smallest free `N`.
    ///
    /// Names that exist as entries of `dir` count as taken.
    pub fn reserve(&self, dir: Option<&Path>, prefix: &str) -> String {
        let taken = |name: &str, used: &HashSet<String>| {
            used.contains(name) || dir.map_or(false, |d| d.join(name).exists())
        };
        let mut used = self.used.lock();
        let mut name = prefix.to_string();
        let mut n = 1;
        while taken(&name, &used) {
            name = format!("{prefix}_{n}");
            n += 1;
        }
        used.insert(name.clone());
        name
    }
}

/// Tile storage that keeps everything in memory.
///
/// Position indices are assigned on first lookup of a grid cell. After
/// [`finish`](TileStorage::finish) further images are rejected.
#[derive(Debug)]
pub struct MemoryTileStorage {
    prefix: String,
    dir: Option<PathBuf>,
    names: NameRegistry,
    name: Mutex<Option<String>>,
    positions: PositionRegistry,
    summary: RwLock<Option<Value>>,
    images: RwLock<BTreeMap<ImageKey, TaggedImage>>,
    finished: AtomicBool,
    fail_lookups: AtomicBool,
    reject_summary: AtomicBool,
}

impl MemoryTileStorage {
    /// Storage named after `prefix`, laying tiles on `grid`.
    pub fn new(prefix: impl Into<String>, grid: TileGrid) -> Self {
        Self {
            prefix: prefix.into(),
            dir: None,
            names: NameRegistry::new(),
            name: Mutex::new(None),
            positions: PositionRegistry::new(grid),
            summary: RwLock::new(None),
            images: RwLock::new(BTreeMap::new()),
            finished: AtomicBool::new(false),
            fail_lookups: AtomicBool::new(false),
            reject_summary: AtomicBool::new(false),
        }
    }

    /// Consider existing entries of `dir` when choosing the unique name.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    #[cfg(test)]
    fn with_names(mut self, names: NameRegistry) -> Self {
        self.names = names;
        self
    }

    /// Make position lookups fail (for exercising error paths).
    pub fn fail_position_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::Release);
    }

    /// Make summary metadata writes fail.
    pub fn reject_summary_metadata(&self, reject: bool) {
        self.reject_summary.store(reject, Ordering::Release);
    }

    fn check_lookups(&self) -> Result<()> {
        if self.fail_lookups.load(Ordering::Acquire) {
            bail!("position metadata unavailable");
        }
        Ok(())
    }

    /// Position registry.
    pub fn positions(&self) -> &PositionRegistry {
        &self.positions
    }

    /// Summary metadata, once recorded.
    pub fn summary(&self) -> Option<Value> {
        self.summary.read().clone()
    }

    /// Number of stored images.
    pub fn image_count(&self) -> usize {
        self.images.read().len()
    }

    /// Stored image at `key`.
    pub fn image(&self, key: &ImageKey) -> Option<TaggedImage> {
        self.images.read().get(key).cloned()
    }

    /// Keys of every stored image, sorted.
    pub fn keys(&self) -> Vec<ImageKey> {
        self.images.read().keys().copied().collect()
    }

    /// Whether [`finish`](TileStorage::finish) was called.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TileStorage for MemoryTileStorage {
    async fn position_index_from_stage_coords(&self, x: f64, y: f64) -> Result<usize> {
        self.check_lookups()?;
        let cell = self.positions.grid().cell_at(x, y);
        Ok(self.positions.index_for(cell))
    }

    async fn position_indices(&self, cells: &[GridCell]) -> Result<Vec<usize>> {
        self.check_lookups()?;
        Ok(cells.iter().map(|&cell| self.positions.index_for(cell)).collect())
    }

    async fn xy_position(&self, position_index: usize) -> Result<XyPosition> {
        self.check_lookups()?;
        self.positions
            .get(position_index)
            .ok_or_else(|| anyhow!("no position with index {}", position_index))
    }

    fn unique_acq_name(&self) -> String {
        let mut name = self.name.lock();
        name.get_or_insert_with(|| self.names.reserve(self.dir.as_deref(), &self.prefix))
            .clone()
    }

    async fn put_summary_metadata(&self, summary: Value) -> Result<()> {
        if self.reject_summary.load(Ordering::Acquire) {
            bail!("summary metadata rejected");
        }
        *self.summary.write() = Some(summary);
        Ok(())
    }

    async fn store_image(&self, image: TaggedImage) -> Result<()> {
        if self.is_finished() {
            bail!("storage is finished");
        }
        let key = ImageKey::of(&image)?;
        if self.images.write().insert(key, image).is_some() {
            debug!(?key, "Replaced stored image");
        }
        Ok(())
    }

    async fn finish(&self) -> Result<()> {
        if !self.finished.swap(true, Ordering::AcqRel) {
            info!(images = self.image_count(), positions = self.positions.len(), "Storage finished");
        }
        Ok(())
    }
}
