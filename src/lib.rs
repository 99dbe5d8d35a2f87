//! # Explore DAQ
//!
//! Simulator host for the explore-mode acquisition scheduler. The scheduling
//! itself lives in the workspace crates; this crate wires them to mock
//! hardware behind a command-line front end.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-based loading and validation of [`config::SimulatorConfig`]
//!   from TOML and `EXPLORE_DAQ_` environment variables.
//! - **`logging`**: `tracing-subscriber` setup with pretty, compact and JSON output.
//! - **`simulate`**: Runs an acquisition against mock devices and in-memory
//!   storage, replaying scripted tile requests.
//!
//! The workspace crates are re-exported for convenience:
//!
//! - [`daq_core`]: errors, channels, images, positions and collaborator traits
//! - [`daq_acquisition`]: event queue, dedup table, dispatcher, sink and lifecycle
//! - [`daq_storage`]: in-memory tile storage
//! - [`daq_driver_mock`]: simulated stage, focus drive and camera

pub mod config;
pub mod logging;
pub mod simulate;

pub use daq_acquisition;
pub use daq_core;
pub use daq_driver_mock;
pub use daq_storage;
