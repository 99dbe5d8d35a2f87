//! `daq-acquisition`
//!
//! Event scheduling and dynamic tile dispatch for microscope acquisitions.
//!
//! ```text
//! UI ──▶ ExploreDispatcher ──▶ PendingTiles ──▶ EventQueue ──▶ engine
//!                                                                │
//!            storage ◀── ImageSink ◀── Acquisition::add_image ◀──┘
//! ```
//!
//! ## Key Types
//!
//! - [`Acquisition`]: Lifecycle controller owning queue, dispatcher and sink
//! - [`EventQueue`]: Bounded, pause-gated event FIFO
//! - [`PendingTiles`]: Concurrent dedup table of queued tiles
//! - [`ExploreDispatcher`]: Serialized executor of explore requests
//! - [`AcquisitionEngine`]: Reference consumer driving the device layer

pub mod acquisition;
pub mod coords;
pub mod dedup;
pub mod dispatcher;
pub mod engine;
pub mod event;
pub mod event_queue;
pub mod pause;
pub mod scheduler;
pub mod settings;
pub mod sink;
pub mod slices;
pub mod state;

pub use acquisition::{Acquisition, Devices, Overlap, ShutdownTimeouts};
pub use coords::{ZAxis, ZLimits};
pub use dedup::{PendingTileKey, PendingTiles, Reservation};
pub use dispatcher::ExploreDispatcher;
pub use engine::{AcquisitionEngine, EngineReport};
pub use event::{AcquisitionEvent, AcquisitionId, TileEvent};
pub use event_queue::EventQueue;
pub use pause::PauseGate;
pub use settings::{AcquisitionMode, AcquisitionProfile, AcquisitionSettings, FixedAreaSettings};
pub use sink::{ImageSink, SinkReport};
pub use slices::SliceBounds;
pub use state::{AcquisitionState, StateController};
