//! Expansion of explore gestures and fixed-area plans into tile events.
//!
//! Every fallible lookup (device positions, storage position indices) happens
//! before the first reservation, so a failed request leaves the dedup table
//! and the event queue untouched.

use std::sync::Arc;

use daq_core::capabilities::{FocusDrive, TileStorage, XyStage};
use daq_core::{AppResult, Cancelled, ChannelSpec, DaqError, GridCell, XyPosition};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::coords::{ZAxis, ZLimits};
use crate::dedup::{PendingTileKey, PendingTiles, Reservation};
use crate::event::{AcquisitionEvent, AcquisitionId, TileEvent};
use crate::event_queue::EventQueue;
use crate::settings::FixedAreaSettings;
use crate::slices::SliceBounds;

/// Shared scheduling state of one acquisition.
pub struct TileScheduler {
    acquisition: AcquisitionId,
    queue: Arc<EventQueue>,
    pending: PendingTiles,
    bounds: SliceBounds,
    z_axis: ZAxis,
    z_limits: RwLock<ZLimits>,
    channels: ChannelSpec,
    xy_stage: Arc<dyn XyStage>,
    focus: Arc<dyn FocusDrive>,
    storage: Arc<dyn TileStorage>,
}

impl TileScheduler {
    /// Scheduler with z limits collapsed onto the z origin.
    pub fn new(
        acquisition: AcquisitionId,
        queue: Arc<EventQueue>,
        z_axis: ZAxis,
        channels: ChannelSpec,
        xy_stage: Arc<dyn XyStage>,
        focus: Arc<dyn FocusDrive>,
        storage: Arc<dyn TileStorage>,
    ) -> Self {
        Self {
            acquisition,
            queue,
            pending: PendingTiles::new(),
            bounds: SliceBounds::new(),
            z_limits: RwLock::new(ZLimits::at(z_axis.origin())),
            z_axis,
            channels,
            xy_stage,
            focus,
            storage,
        }
    }

    /// Event queue the scheduler feeds.
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Pending tile table.
    pub fn pending(&self) -> &PendingTiles {
        &self.pending
    }

    /// Scheduled slice range.
    pub fn bounds(&self) -> &SliceBounds {
        &self.bounds
    }

    /// Slice/z mapping.
    pub fn z_axis(&self) -> &ZAxis {
        &self.z_axis
    }

    /// Current z limits.
    pub fn z_limits(&self) -> ZLimits {
        *self.z_limits.read()
    }

    /// Channels scheduled per tile.
    pub fn channels(&self) -> &ChannelSpec {
        &self.channels
    }

    /// Replace the z limits and widen the slice bounds to cover them.
    ///
    /// Non-finite limits are rejected and the previous ones kept.
    pub fn set_z_limits(&self, a: f64, b: f64) -> AppResult<()> {
        let limits = ZLimits::new(a, b)?;
        *self.z_limits.write() = limits;
        let range = limits.slice_range(&self.z_axis);
        self.bounds.widen(*range.start(), *range.end());
        debug!(top = limits.top, bottom = limits.bottom, "Z limits updated");
        Ok(())
    }

    /// Forget the pending key of an acquired tile.
    pub fn report_acquired(&self, tile: &TileEvent) {
        if !self.pending.release(tile.slice_index, &tile.pending_key()) {
            trace!(slice = tile.slice_index, "Acquired tile was not pending");
        }
    }

    /// Schedule the tile under the objective at the current focal slice.
    pub async fn schedule_tile_at_current_position(
        &self,
        cancel: &CancellationToken,
    ) -> AppResult<usize> {
        let z = self
            .focus
            .position()
            .await
            .map_err(|e| DaqError::hardware(self.focus.device_name(), e))?;
        let (x, y) = self
            .xy_stage
            .xy_position()
            .await
            .map_err(|e| DaqError::hardware(self.xy_stage.device_name(), e))?;

        let slice = self.z_axis.slice_index_for_z(z);
        let position_index = self
            .storage
            .position_index_from_stage_coords(x, y)
            .await
            .map_err(|e| DaqError::PositionResolution(e.to_string()))?;
        let xy = self.resolve_xy(position_index).await?;

        self.bounds.widen(slice, slice);
        let mut scheduled = 0;
        for channel in 0..self.channels.schedulable_count() {
            if self.schedule_reserved(0, position_index, xy, slice, channel, cancel).await? {
                scheduled += 1;
            }
        }
        debug!(position = position_index, slice, scheduled, "Tile at current position");
        Ok(scheduled)
    }

    /// Schedule every tile of the rectangle spanned by two grid corners, over
    /// the slices of the current z limits.
    pub async fn schedule_region(
        &self,
        row1: i64,
        col1: i64,
        row2: i64,
        col2: i64,
        cancel: &CancellationToken,
    ) -> AppResult<usize> {
        let cells = region_cells(row1, col1, row2, col2);
        let tiles = self.resolve_cells(&cells).await?;

        let mut scheduled = 0;
        for (position_index, xy) in tiles {
            let slices = self.z_limits().slice_range(&self.z_axis);
            self.bounds.widen(*slices.start(), *slices.end());
            for slice in slices {
                for channel in 0..self.channels.schedulable_count() {
                    if cancel.is_cancelled() {
                        return Err(Cancelled.into());
                    }
                    if self.schedule_reserved(0, position_index, xy, slice, channel, cancel).await? {
                        scheduled += 1;
                    }
                }
            }
        }
        debug!(tiles = cells.len(), scheduled, "Region scheduled");
        Ok(scheduled)
    }

    /// Build the full event list of a fixed-area acquisition.
    ///
    /// Order is frame, then position, then slice, then channel.
    pub async fn build_plan(&self, plan: &FixedAreaSettings) -> AppResult<Vec<TileEvent>> {
        let tiles = self.resolve_cells(&plan.positions).await?;
        let limits = ZLimits::new(plan.z_start, plan.z_end)?;
        let slices = limits.slice_range(&self.z_axis);

        let mut events = Vec::new();
        for frame_index in 0..plan.num_frames {
            for &(position_index, xy) in &tiles {
                for slice in slices.clone() {
                    for channel in 0..self.channels.schedulable_count() {
                        if self.channels.is_unique_event(channel) {
                            events.push(self.tile_event(frame_index, position_index, xy, slice, channel));
                        }
                    }
                }
            }
        }
        Ok(events)
    }

    /// Enqueue a precomputed plan, then the terminal sentinels.
    pub async fn schedule_plan(
        &self,
        events: Vec<TileEvent>,
        cancel: &CancellationToken,
    ) -> AppResult<usize> {
        let mut scheduled = 0;
        for tile in events {
            self.bounds.widen(tile.slice_index, tile.slice_index);
            self.queue.submit(AcquisitionEvent::Acquire(tile), cancel).await?;
            scheduled += 1;
        }
        self.queue
            .submit(
                AcquisitionEvent::AcquisitionFinished {
                    acquisition: self.acquisition,
                },
                cancel,
            )
            .await?;
        self.queue
            .submit(AcquisitionEvent::EngineTaskFinished, cancel)
            .await?;
        Ok(scheduled)
    }

    async fn resolve_xy(&self, position_index: usize) -> AppResult<XyPosition> {
        self.storage
            .xy_position(position_index)
            .await
            .map_err(|e| DaqError::PositionResolution(e.to_string()))
    }

    async fn resolve_cells(&self, cells: &[GridCell]) -> AppResult<Vec<(usize, XyPosition)>> {
        let indices = self
            .storage
            .position_indices(cells)
            .await
            .map_err(|e| DaqError::PositionResolution(e.to_string()))?;
        if indices.len() != cells.len() {
            return Err(DaqError::PositionResolution(format!(
                "storage resolved {} of {} cells",
                indices.len(),
                cells.len()
            )));
        }
        let mut tiles = Vec::with_capacity(indices.len());
        for index in indices {
            tiles.push((index, self.resolve_xy(index).await?));
        }
        Ok(tiles)
    }

    fn tile_event(
        &self,
        frame_index: u32,
        position_index: usize,
        xy: XyPosition,
        slice: i32,
        channel: usize,
    ) -> TileEvent {
        TileEvent {
            acquisition: self.acquisition,
            frame_index,
            channel_index: channel,
            slice_index: slice,
            position_index,
            z_position: self.z_axis.z_for_slice(slice) + self.channels.offset(channel),
            xy_position: xy,
        }
    }

    /// Reserve and enqueue one channel of one tile slice.
    ///
    /// Returns `false` for channels that share another channel's exposure and
    /// for tiles already pending. A reservation whose submit is cancelled is
    /// released again.
    async fn schedule_reserved(
        &self,
        frame_index: u32,
        position_index: usize,
        xy: XyPosition,
        slice: i32,
        channel: usize,
        cancel: &CancellationToken,
    ) -> AppResult<bool> {
        if !self.channels.is_unique_event(channel) {
            return Ok(false);
        }
        let key = PendingTileKey::new(xy.grid_row, xy.grid_col, slice, channel);
        if self.pending.try_reserve(slice, key) == Reservation::Duplicate {
            trace!(slice, channel, row = xy.grid_row, col = xy.grid_col, "Tile already pending");
            return Ok(false);
        }
        let event = self.tile_event(frame_index, position_index, xy, slice, channel);
        if let Err(cancelled) = self.queue.submit(AcquisitionEvent::Acquire(event), cancel).await {
            self.pending.release(slice, &key);
            return Err(cancelled.into());
        }
        Ok(true)
    }
}

/// Cells of the rectangle spanned by two corners, column by column with the
/// row varying fastest.
pub fn region_cells(row1: i64, col1: i64, row2: i64, col2: i64) -> Vec<GridCell> {
    let (top, bottom) = (row1.min(row2), row1.max(row2));
    let (left, right) = (col1.min(col2), col1.max(col2));
    (left..=right)
        .flat_map(|col| (top..=bottom).map(move |row| GridCell::new(row, col)))
        .collect()
}
