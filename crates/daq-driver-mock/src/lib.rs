//! Mock devices for explore acquisitions.
//!
//! Simulated hardware for tests and the simulator. All delays use
//! `tokio::time::sleep`, never a blocking sleep.
//!
//! # Available Mock Drivers
//!
//! - [`MockXyStage`] - Motorized XY stage with optional travel limits
//! - [`MockFocusDrive`] - Z drive exposing soft position limits
//! - [`MockCamera`] - Camera imaging a synthetic specimen under the stage
//!
//! # Performance Characteristics (realistic mode)
//!
//! - MockXyStage: 50ms settling per move
//! - MockFocusDrive: 10ms settling per move
//! - MockCamera: 33ms frame readout (~30fps simulation)
//!
//! # Example
//!
//! ```rust,ignore
//! let stage = Arc::new(MockXyStage::new());
//! let focus = Arc::new(MockFocusDrive::new(0.0).with_limits(-100.0, 100.0));
//! let camera = Arc::new(MockCamera::new(256, 256).attached_to(stage.clone(), focus.clone()));
//! ```

pub mod common;
mod mock_camera;
mod mock_focus;
mod mock_stage;
mod pattern;

pub use common::{ErrorConfig, MockMode, TimingConfig};

pub use mock_camera::{MockCamera, MockCameraConfig};
pub use mock_focus::{MockFocusConfig, MockFocusDrive};
pub use mock_stage::{LimitBehavior, MockXyStage, MockXyStageBuilder, MockXyStageConfig, StageLimits};

pub use pattern::{render_specimen, FieldOfView};
