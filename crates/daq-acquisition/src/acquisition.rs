//! Acquisition lifecycle controller.
//!
//! An [`Acquisition`] owns the event queue, the explore dispatcher and the
//! output sink of one session and sequences them through
//! [`AcquisitionState`]. The engine pulls events with
//! [`next_event`](Acquisition::next_event) and pushes images back with
//! [`add_image`](Acquisition::add_image); the UI adds tiles, pauses and aborts.
//!
//! # Usage
//!
//! ```rust,ignore
//! let acq = Acquisition::launch(settings, devices.clone(), storage).await?;
//! acq.request_tile_at_current_position()?;
//!
//! let engine = AcquisitionEngine::new(devices);
//! engine.run(&acq, &CancellationToken::new()).await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use daq_core::capabilities::{Camera, FocusDrive, TileStorage, XyStage};
use daq_core::limits::{DISPATCHER_SHUTDOWN_TIMEOUT, OUTPUT_QUEUE_SIZE, SINK_DRAIN_TIMEOUT};
use daq_core::{AppResult, Cancelled, DaqError, PositionLimits, Rgb, TaggedImage};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::coords::{ZAxis, ZLimits};
use crate::dedup::PendingTileKey;
use crate::dispatcher::ExploreDispatcher;
use crate::event::{AcquisitionEvent, AcquisitionId};
use crate::event_queue::EventQueue;
use crate::scheduler::TileScheduler;
use crate::settings::{AcquisitionMode, AcquisitionProfile, AcquisitionSettings};
use crate::sink::{ImageSink, SinkReport};
use crate::state::{AcquisitionState, StateController};

/// Devices an acquisition reads positions from and the engine drives.
#[derive(Clone)]
pub struct Devices {
    /// XY stage
    pub xy_stage: Arc<dyn XyStage>,
    /// Focus drive
    pub focus: Arc<dyn FocusDrive>,
    /// Camera
    pub camera: Arc<dyn Camera>,
}

/// Bounded waits used while shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeouts {
    /// Wait for the dispatcher worker to stop
    pub dispatcher: Duration,
    /// Wait for the sink to drain into storage
    pub sink: Duration,
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self {
            dispatcher: DISPATCHER_SHUTDOWN_TIMEOUT,
            sink: SINK_DRAIN_TIMEOUT,
        }
    }
}

/// Overlap between neighbouring tiles, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overlap {
    /// Horizontal overlap
    pub x: u32,
    /// Vertical overlap
    pub y: u32,
}

/// State shared with the sink's completion callback.
struct Completion {
    state: StateController,
    last_image: Mutex<Option<Arc<TaggedImage>>>,
}

impl Completion {
    fn mark_finished(&self) {
        let mut last = self.last_image.lock();
        let prev = self
            .state
            .transition("finish", |_| Some(AcquisitionState::Finished));
        *last = None;
        if let Ok(prev) = prev {
            if prev != AcquisitionState::Finished {
                info!("Acquisition finished");
            }
        }
    }
}

/// One acquisition session.
pub struct Acquisition {
    id: AcquisitionId,
    settings: AcquisitionSettings,
    profile: AcquisitionProfile,
    devices: Devices,
    storage: Arc<dyn TileStorage>,
    scheduler: Arc<TileScheduler>,
    completion: Arc<Completion>,
    focus_limits: Option<PositionLimits>,
    dispatcher: OnceLock<ExploreDispatcher>,
    sink: OnceLock<ImageSink>,
    output_closed: AtomicBool,
    name: RwLock<String>,
    overlap: RwLock<Overlap>,
    start_time: RwLock<Option<DateTime<Utc>>>,
    timeouts: ShutdownTimeouts,
}

impl Acquisition {
    /// Query the focus drive and fix the z origin at its current position.
    ///
    /// Failing to read the focus limits or position is fatal.
    #[instrument(skip_all, fields(name = %settings.name, mode = settings.mode.name()), err)]
    pub async fn create(
        settings: AcquisitionSettings,
        devices: Devices,
        storage: Arc<dyn TileStorage>,
    ) -> AppResult<Self> {
        settings.validate()?;
        let focus_name = devices.focus.device_name().to_string();
        let focus_limits = devices
            .focus
            .position_limits()
            .await
            .map_err(|e| DaqError::hardware(&focus_name, e))?;
        let z_origin = devices
            .focus
            .position()
            .await
            .map_err(|e| DaqError::hardware(&focus_name, e))?;

        let id = AcquisitionId::new();
        let profile = settings.profile();
        let queue = Arc::new(EventQueue::new(profile.event_queue_capacity));
        let scheduler = Arc::new(TileScheduler::new(
            id,
            queue,
            ZAxis::new(z_origin, settings.z_step),
            settings.channels.clone(),
            devices.xy_stage.clone(),
            devices.focus.clone(),
            storage.clone(),
        ));
        debug!(%id, z_origin, has_limits = focus_limits.is_some(), "Acquisition created");

        Ok(Self {
            id,
            name: RwLock::new(settings.name.clone()),
            settings,
            profile,
            devices,
            storage,
            scheduler,
            completion: Arc::new(Completion {
                state: StateController::new(),
                last_image: Mutex::new(None),
            }),
            focus_limits,
            dispatcher: OnceLock::new(),
            sink: OnceLock::new(),
            output_closed: AtomicBool::new(false),
            overlap: RwLock::new(Overlap::default()),
            start_time: RwLock::new(None),
            timeouts: ShutdownTimeouts::default(),
        })
    }

    /// Create, initialize and start in one step.
    pub async fn launch(
        settings: AcquisitionSettings,
        devices: Devices,
        storage: Arc<dyn TileStorage>,
    ) -> AppResult<Self> {
        let acq = Self::create(settings, devices, storage).await?;
        acq.initialize().await?;
        acq.start().await?;
        Ok(acq)
    }

    /// Override the bounded waits used by [`abort`](Self::abort).
    pub fn with_timeouts(mut self, timeouts: ShutdownTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Start the output pipeline and the dispatcher.
    ///
    /// Records summary metadata with storage and takes the unique name it
    /// hands out. If storage rejects the summary the acquisition stays
    /// `Created`. Nothing is dispatched before this returns.
    #[instrument(skip(self), fields(acquisition = %self.id), err)]
    pub async fn initialize(&self) -> AppResult<()> {
        let state = self.state();
        if state != AcquisitionState::Created {
            return Err(DaqError::InvalidTransition {
                action: "initialize",
                state: state.to_string(),
            });
        }

        let (width, height) = self.devices.camera.image_size();
        let percent = self.settings.tile_overlap_percent / 100.0;
        let overlap = Overlap {
            x: (f64::from(width) * percent) as u32,
            y: (f64::from(height) * percent) as u32,
        };
        let name = self.storage.unique_acq_name();

        let summary = self.summary_metadata(&name, overlap, width, height);
        self.storage
            .put_summary_metadata(summary)
            .await
            .map_err(|e| DaqError::Storage(e.to_string()))?;

        self.state_controller().transition("initialize", |s| {
            (s == AcquisitionState::Created).then_some(AcquisitionState::Initialized)
        })?;
        *self.overlap.write() = overlap;
        *self.name.write() = name.clone();

        let completion = self.completion.clone();
        let sink = ImageSink::start(OUTPUT_QUEUE_SIZE, self.storage.clone(), move || {
            completion.mark_finished()
        });
        let _ = self.sink.set(sink);
        let _ = self
            .dispatcher
            .set(ExploreDispatcher::start(self.scheduler.clone()));

        info!(name = %name, overlap_x = overlap.x, overlap_y = overlap.y, "Acquisition initialized");
        Ok(())
    }

    /// Begin delivering events. Fixed-area acquisitions enqueue their plan.
    #[instrument(skip(self), fields(acquisition = %self.id), err)]
    pub async fn start(&self) -> AppResult<()> {
        self.state_controller().transition("start", |s| {
            (s == AcquisitionState::Initialized).then_some(AcquisitionState::Running)
        })?;
        *self.start_time.write() = Some(Utc::now());

        if let AcquisitionMode::FixedArea(plan) = &self.settings.mode {
            let events = self.scheduler.build_plan(plan).await?;
            info!(events = events.len(), "Fixed-area plan built");
            self.dispatcher()?.submit_plan(events)?;
        }
        info!("Acquisition started");
        Ok(())
    }

    fn state_controller(&self) -> &StateController {
        &self.completion.state
    }

    fn dispatcher(&self) -> AppResult<&ExploreDispatcher> {
        self.dispatcher
            .get()
            .ok_or_else(|| DaqError::InvalidTransition {
                action: "dispatch",
                state: self.state().to_string(),
            })
    }

    fn summary_metadata(
        &self,
        name: &str,
        overlap: Overlap,
        width: u32,
        height: u32,
    ) -> serde_json::Value {
        let channels = &self.settings.channels;
        json!({
            "Prefix": name,
            "Directory": self.settings.dir.display().to_string(),
            "AcquisitionId": self.id.to_string(),
            "Mode": self.settings.mode.name(),
            "Width": width,
            "Height": height,
            "GridPixelOverlapX": overlap.x,
            "GridPixelOverlapY": overlap.y,
            "z-step_um": self.settings.z_step,
            "ZOrigin": self.scheduler.z_axis().origin(),
            "Frames": self.profile.initial_num_frames,
            "Slices": self.profile.initial_num_slices,
            "Channels": channels.schedulable_count(),
            "ChNames": channels.active_channel_names(),
            "ChColors": channels
                .active_channel_colors()
                .iter()
                .map(|c| [c.r, c.g, c.b])
                .collect::<Vec<_>>(),
            "InitialPositionList": self
                .profile
                .initial_positions
                .iter()
                .map(|cell| json!({"GridRowIndex": cell.row, "GridColumnIndex": cell.col}))
                .collect::<Vec<_>>(),
            "StartTime": Utc::now().to_rfc3339(),
        })
    }

    // =========================================================================
    // Engine-facing
    // =========================================================================

    /// Next event for the engine, waiting while paused or empty.
    pub async fn next_event(&self, cancel: &CancellationToken) -> Result<AcquisitionEvent, Cancelled> {
        self.scheduler.queue().next_event(cancel).await
    }

    /// Engine callback after an event's image was acquired.
    pub fn report_event_acquired(&self, event: &AcquisitionEvent) {
        if let Some(tile) = event.as_tile() {
            self.scheduler.report_acquired(tile);
        }
    }

    /// Hand an image to the output pipeline, waiting for space.
    ///
    /// After the acquisition finished the image is dropped with a warning.
    /// On cancellation the image is dropped and `Cancelled` returned.
    pub async fn add_image(&self, image: TaggedImage, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let Some(sink) = self.sink.get() else {
            warn!("Image arrived before output pipeline started; dropped");
            return Ok(());
        };
        let image = Arc::new(image);
        {
            let mut last = self.completion.last_image.lock();
            if self.is_finished() {
                warn!("Image arrived after acquisition finished; dropped");
                return Ok(());
            }
            *last = Some(image.clone());
        }

        if let Err(cancelled) = sink.put(image, cancel).await {
            warn!("Acquisition engine cancelled while adding image; image dropped");
            return Err(cancelled);
        }
        Ok(())
    }

    /// Close the output after the engine consumed `AcquisitionFinished`.
    ///
    /// The sink drains, finishes storage and then marks the acquisition
    /// finished. Calling again is a no-op.
    #[instrument(skip(self), fields(acquisition = %self.id), err)]
    pub async fn finish_output(&self) -> AppResult<()> {
        self.state_controller().transition("finish output", |s| match s {
            AcquisitionState::Initialized
            | AcquisitionState::Running
            | AcquisitionState::Paused
            | AcquisitionState::Aborting
            | AcquisitionState::Finishing => Some(AcquisitionState::Finishing),
            AcquisitionState::Finished => Some(AcquisitionState::Finished),
            AcquisitionState::Created => None,
        })?;
        if self.output_closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(sink) = self.sink.get() {
            sink.end_of_acquisition().await;
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle control
    // =========================================================================

    /// Flip pause. Returns whether the acquisition is now paused.
    #[instrument(skip(self), fields(acquisition = %self.id), err)]
    pub fn toggle_pause(&self) -> AppResult<bool> {
        let prev = self.state_controller().transition("toggle pause", |s| match s {
            AcquisitionState::Running => Some(AcquisitionState::Paused),
            AcquisitionState::Paused => Some(AcquisitionState::Running),
            _ => None,
        })?;
        let paused = prev == AcquisitionState::Running;
        self.scheduler.queue().pause_gate().set_paused(paused);
        info!(paused, "Pause toggled");
        Ok(paused)
    }

    /// Abort: stop producers, drop queued work, let the engine and sink wind
    /// down, and wait for the sink to exit.
    ///
    /// A no-op once the acquisition is aborting, finishing or finished.
    #[instrument(skip(self), fields(acquisition = %self.id), err)]
    pub async fn abort(&self) -> AppResult<()> {
        let prev = match self.state_controller().transition("abort", |s| match s {
            AcquisitionState::Created => Some(AcquisitionState::Finished),
            s if s.is_active() => Some(AcquisitionState::Aborting),
            _ => None,
        }) {
            Ok(prev) => prev,
            Err(_) => {
                debug!(state = %self.state(), "Abort ignored");
                return Ok(());
            }
        };
        if prev == AcquisitionState::Created {
            info!("Aborted before initialization");
            return Ok(());
        }
        info!(from = %prev, "Aborting acquisition");

        let queue = self.scheduler.queue();
        queue.pause_gate().set_paused(false);

        if let Some(dispatcher) = self.dispatcher.get() {
            if let Err(e) = dispatcher.shutdown(self.timeouts.dispatcher).await {
                warn!(error = %e, "Continuing abort with dispatcher still running");
            }
        }

        let dropped = queue.clear();
        self.scheduler.pending().clear();
        queue.push_terminal(AcquisitionEvent::AcquisitionFinished { acquisition: self.id });
        queue.push_terminal(AcquisitionEvent::EngineTaskFinished);
        let _ = self.state_controller().transition("abort", |s| {
            (s == AcquisitionState::Aborting).then_some(AcquisitionState::Finishing)
        });
        debug!(dropped, "Terminal events queued");

        self.wait_until_closed(self.timeouts.sink).await?;
        info!("Acquisition aborted");
        Ok(())
    }

    /// Mark the acquisition finished and drop the last image. Idempotent.
    pub fn mark_finished(&self) {
        self.completion.mark_finished();
    }

    /// Wait up to `timeout` for the sink to drain and exit.
    pub async fn wait_until_closed(&self, timeout: Duration) -> AppResult<SinkReport> {
        match self.sink.get() {
            Some(sink) => sink.wait_to_die(timeout).await,
            None => Ok(SinkReport::default()),
        }
    }

    // =========================================================================
    // Explore requests
    // =========================================================================

    fn explore_dispatcher(&self, action: &'static str) -> AppResult<&ExploreDispatcher> {
        if !self.settings.mode.is_explore() {
            return Err(DaqError::Configuration(format!(
                "cannot {action} in {} mode",
                self.settings.mode.name()
            )));
        }
        let state = self.state();
        if !state.is_active() {
            return Err(DaqError::InvalidTransition {
                action,
                state: state.to_string(),
            });
        }
        self.dispatcher()
    }

    /// Schedule the tile under the objective at the current focal slice.
    ///
    /// Returns once the request is queued for the dispatcher.
    pub fn request_tile_at_current_position(&self) -> AppResult<()> {
        self.explore_dispatcher("request tile")?
            .request_tile_at_current_position()
    }

    /// Schedule every tile between two grid corners over the current z limits.
    pub fn request_tile_region(&self, row1: i64, col1: i64, row2: i64, col2: i64) -> AppResult<()> {
        self.explore_dispatcher("request tiles")?
            .request_tile_region(row1, col1, row2, col2)
    }

    /// Wait until every previously queued request has been expanded.
    pub async fn flush_requests(&self) -> AppResult<()> {
        self.dispatcher()?.flush().await
    }

    /// Set the focus range used by region requests. Order does not matter.
    pub fn set_z_limits(&self, a: f64, b: f64) -> AppResult<()> {
        self.scheduler.set_z_limits(a, b)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Identity of this acquisition.
    pub fn id(&self) -> AcquisitionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AcquisitionState {
        self.state_controller().get()
    }

    /// Receiver notified on every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<AcquisitionState> {
        self.state_controller().subscribe()
    }

    /// Whether the engine is held before its next event.
    pub fn is_paused(&self) -> bool {
        self.scheduler.queue().is_paused()
    }

    /// Whether storage has been closed.
    pub fn is_finished(&self) -> bool {
        self.state() == AcquisitionState::Finished
    }

    /// Settings the acquisition was created with.
    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    /// Name assigned by storage (the requested name before initialization).
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Lowest slice index scheduled so far.
    pub fn min_slice_index(&self) -> i32 {
        self.scheduler.bounds().min()
    }

    /// Highest slice index scheduled so far.
    pub fn max_slice_index(&self) -> i32 {
        self.scheduler.bounds().max()
    }

    /// Number of slices between the lowest and highest scheduled.
    pub fn num_slices(&self) -> usize {
        self.scheduler.bounds().num_slices()
    }

    /// Focus position of display slice `display_slice`.
    pub fn z_for_display_slice(&self, display_slice: i32) -> f64 {
        self.scheduler
            .z_axis()
            .z_for_display_slice(display_slice, self.min_slice_index())
    }

    /// Display slice of focus position `z`.
    pub fn display_slice_for_z(&self, z: f64) -> i32 {
        self.scheduler
            .z_axis()
            .display_slice_for_z(z, self.min_slice_index())
    }

    /// Distance between slices.
    pub fn z_step(&self) -> f64 {
        self.settings.z_step
    }

    /// Focus position of slice 0.
    pub fn z_origin(&self) -> f64 {
        self.scheduler.z_axis().origin()
    }

    /// Upper end (smaller value) of the z limits.
    pub fn z_top(&self) -> f64 {
        self.scheduler.z_limits().top
    }

    /// Lower end (larger value) of the z limits.
    pub fn z_bottom(&self) -> f64 {
        self.scheduler.z_limits().bottom
    }

    /// Current z limits.
    pub fn z_limits(&self) -> ZLimits {
        self.scheduler.z_limits()
    }

    /// Soft limits of the focus drive, if it has any.
    pub fn focus_limits(&self) -> Option<PositionLimits> {
        self.focus_limits
    }

    /// Names of the active channels.
    pub fn channel_names(&self) -> Vec<String> {
        self.settings.channels.active_channel_names()
    }

    /// Colors of the active channels.
    pub fn channel_colors(&self) -> Vec<Rgb> {
        self.settings.channels.active_channel_colors()
    }

    /// Number of active channels.
    pub fn num_channels(&self) -> usize {
        self.settings.channels.num_active_channels()
    }

    /// Tile overlap in pixels, computed at initialization.
    pub fn overlap(&self) -> Overlap {
        *self.overlap.read()
    }

    /// When the acquisition started running.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        *self.start_time.read()
    }

    /// Most recent image, until the acquisition finishes.
    pub fn last_image(&self) -> Option<Arc<TaggedImage>> {
        self.completion.last_image.lock().clone()
    }

    /// Most recently dispatched event.
    pub fn last_event(&self) -> Option<AcquisitionEvent> {
        self.scheduler.queue().last_event()
    }

    /// Events waiting for the engine.
    pub fn queued_events(&self) -> Vec<AcquisitionEvent> {
        self.scheduler.queue().snapshot()
    }

    /// Tiles queued but not yet acquired at `slice`.
    pub fn pending_tiles_at_slice(&self, slice: i32) -> Vec<PendingTileKey> {
        self.scheduler.pending().pending_at_slice(slice)
    }

    /// Total tiles queued but not yet acquired.
    pub fn pending_tile_count(&self) -> usize {
        self.scheduler.pending().len()
    }

    /// Slices with at least one pending tile.
    pub fn pending_slice_count(&self) -> usize {
        self.scheduler.pending().slice_count()
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        if self.state().is_active() {
            warn!(acquisition = %self.id, state = %self.state(), "Acquisition dropped while active");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::data::tags;
    use daq_core::Frame;
    use daq_driver_mock::{MockCamera, MockFocusDrive, MockXyStage};
    use daq_storage::{MemoryTileStorage, TileGrid};
    use tracing_test::traced_test;

    fn devices() -> Devices {
        let stage = Arc::new(MockXyStage::new());
        let focus = Arc::new(MockFocusDrive::new(2.5).with_limits(-10.0, 10.0));
        let camera = Arc::new(MockCamera::new(8, 8).attached_to(stage.clone(), focus.clone()));
        Devices {
            xy_stage: stage,
            focus,
            camera,
        }
    }

    fn storage() -> Arc<MemoryTileStorage> {
        Arc::new(MemoryTileStorage::new("acq", TileGrid::from_camera(8, 8, 1.0, 0, 0)))
    }

    fn image() -> TaggedImage {
        TaggedImage::new(Frame::from_u8(1, 1, vec![9]))
            .with_tag(tags::POSITION_INDEX, 0)
            .with_tag(tags::SLICE_INDEX, 0)
    }

    #[tokio::test]
    async fn z_origin_is_the_focus_position_at_creation() {
        let acq = Acquisition::create(AcquisitionSettings::explore("z", 0.5), devices(), storage())
            .await
            .unwrap();
        assert_eq!(acq.state(), AcquisitionState::Created);
        assert_eq!(acq.z_origin(), 2.5);
        assert_eq!((acq.z_top(), acq.z_bottom()), (2.5, 2.5));
        assert_eq!(acq.focus_limits(), Some(PositionLimits::new(-10.0, 10.0)));

        acq.set_z_limits(4.0, 1.0).unwrap();
        assert_eq!((acq.z_top(), acq.z_bottom()), (1.0, 4.0));
        assert_eq!((acq.min_slice_index(), acq.max_slice_index()), (-3, 3));
        assert_eq!(acq.z_for_display_slice(0), 1.0);
        assert_eq!(acq.display_slice_for_z(4.0), 6);
    }

    #[tokio::test]
    async fn non_finite_z_limits_keep_the_previous_range() {
        let acq = Acquisition::create(AcquisitionSettings::explore("z", 0.5), devices(), storage())
            .await
            .unwrap();
        acq.set_z_limits(2.0, 3.0).unwrap();
        assert!(matches!(
            acq.set_z_limits(f64::NEG_INFINITY, 3.0),
            Err(DaqError::Configuration(_))
        ));
        assert!(acq.set_z_limits(2.0, f64::NAN).is_err());
        assert_eq!((acq.z_top(), acq.z_bottom()), (2.0, 3.0));
        assert_eq!((acq.min_slice_index(), acq.max_slice_index()), (-1, 1));
    }

    #[tokio::test]
    #[traced_test]
    async fn image_after_finish_is_dropped_with_warning() {
        let acq = Acquisition::launch(AcquisitionSettings::explore("late", 1.0), devices(), storage())
            .await
            .unwrap();
        acq.mark_finished();
        acq.add_image(image(), &CancellationToken::new()).await.unwrap();
        assert!(acq.last_image().is_none());
        assert!(logs_contain("Image arrived after acquisition finished"));
    }

    #[tokio::test]
    #[traced_test]
    async fn cancelled_add_image_reports_cancellation() {
        let acq = Acquisition::launch(AcquisitionSettings::explore("cancel", 1.0), devices(), storage())
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(acq.add_image(image(), &cancel).await, Err(Cancelled));
        assert!(logs_contain("image dropped"));
        acq.mark_finished();
    }

    #[tokio::test]
    async fn finish_output_requires_initialization() {
        let acq = Acquisition::create(AcquisitionSettings::explore("early", 1.0), devices(), storage())
            .await
            .unwrap();
        assert!(matches!(
            acq.finish_output().await,
            Err(DaqError::InvalidTransition { action: "finish output", .. })
        ));
    }

    #[tokio::test]
    async fn finish_output_closes_the_sink_once() {
        let storage = storage();
        let acq = Acquisition::launch(AcquisitionSettings::explore("done", 1.0), devices(), storage.clone())
            .await
            .unwrap();
        acq.add_image(image(), &CancellationToken::new()).await.unwrap();
        acq.finish_output().await.unwrap();
        acq.finish_output().await.unwrap();

        let report = acq.wait_until_closed(Duration::from_secs(1)).await.unwrap();
        assert_eq!(report.stored, 1);
        assert!(acq.is_finished());
        assert!(storage.is_finished());
        assert!(acq.finish_output().await.is_ok());
    }

    #[tokio::test]
    async fn abort_without_consumer_times_out_waiting_for_the_sink() {
        let acq = Acquisition::launch(AcquisitionSettings::explore("stuck", 1.0), devices(), storage())
            .await
            .unwrap()
            .with_timeouts(ShutdownTimeouts {
                dispatcher: Duration::from_millis(100),
                sink: Duration::from_millis(50),
            });
        let err = acq.abort().await.unwrap_err();
        assert!(matches!(err, DaqError::ShutdownTimeout { what: "image sink", .. }));
        assert_eq!(acq.state(), AcquisitionState::Finishing);
        assert_eq!(acq.queued_events().len(), 2);
    }

    /// Storage that refuses summary metadata.
    struct ReadOnlyStorage(MemoryTileStorage);

    #[async_trait::async_trait]
    impl TileStorage for ReadOnlyStorage {
        async fn position_index_from_stage_coords(&self, x: f64, y: f64) -> anyhow::Result<usize> {
            self.0.position_index_from_stage_coords(x, y).await
        }

        async fn position_indices(&self, cells: &[daq_core::GridCell]) -> anyhow::Result<Vec<usize>> {
            self.0.position_indices(cells).await
        }

        async fn xy_position(&self, position_index: usize) -> anyhow::Result<daq_core::XyPosition> {
            self.0.xy_position(position_index).await
        }

        fn unique_acq_name(&self) -> String {
            self.0.unique_acq_name()
        }

        async fn put_summary_metadata(&self, _summary: serde_json::Value) -> anyhow::Result<()> {
            anyhow::bail!("read-only storage")
        }

        async fn store_image(&self, _image: TaggedImage) -> anyhow::Result<()> {
            anyhow::bail!("read-only storage")
        }

        async fn finish(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn summary_rejection_fails_initialization() {
        let storage = Arc::new(ReadOnlyStorage(MemoryTileStorage::new(
            "ro",
            TileGrid::from_camera(8, 8, 1.0, 0, 0),
        )));
        let acq = Acquisition::create(AcquisitionSettings::explore("ro", 1.0), devices(), storage)
            .await
            .unwrap();
        let err = acq.initialize().await.unwrap_err();
        assert!(matches!(err, DaqError::Storage(_)));
        assert_eq!(acq.state(), AcquisitionState::Created);
        assert!(acq.sink.get().is_none());
        assert!(acq.dispatcher.get().is_none());
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected_before_touching_devices() {
        let devices = devices();
        let result = Acquisition::create(AcquisitionSettings::explore("", 1.0), devices, storage()).await;
        assert!(matches!(result, Err(DaqError::Configuration(_))));
    }
}
