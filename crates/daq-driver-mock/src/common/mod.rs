//! Common infrastructure for mock devices.
//!
//! - **mode**: Operational modes (Instant, Realistic)
//! - **timing**: Hardware-like delays per device kind
//! - **errors**: Forced and random failure injection
//! - **rng**: Seeded random number generator

pub mod errors;
pub mod mode;
pub mod rng;
pub mod timing;

pub use errors::ErrorConfig;
pub use mode::MockMode;
pub use rng::MockRng;
pub use timing::TimingConfig;
