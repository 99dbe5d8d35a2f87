//! `daq-core`
//!
//! Core types and collaborator traits for the explore acquisition scheduler.
//!
//! This crate provides the vocabulary shared by the scheduler, the storage
//! implementation and the device mocks: error types, queue limits, channel
//! configuration, image records, stage positions and the capability traits
//! through which the scheduler reaches the device layer and storage.
//!
//! ## Key Types
//!
//! - [`DaqError`]: Error type with the scheduler's failure taxonomy
//! - [`Cancelled`]: Typed result of a cancelled blocking operation
//! - [`ChannelSpec`]: Active channels and their scheduling flags
//! - [`TaggedImage`]: Pixels plus tags, produced by the engine
//! - [`XyPosition`]: Grid row/column plus stage coordinates of a tile

pub mod capabilities;
pub mod channels;
pub mod data;
pub mod error;
pub mod limits;
pub mod position;

pub use capabilities::{Camera, FocusDrive, TileStorage, XyStage};
pub use channels::{ChannelSetting, ChannelSpec, Rgb};
pub use data::{Frame, TaggedImage};
pub use error::{AppResult, Cancelled, DaqError, DriverError, DriverErrorKind};
pub use position::{GridCell, PositionLimits, XyPosition};
