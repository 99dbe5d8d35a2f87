//! Error injection for mock devices.
//!
//! Failures surface as daq-core [`DriverError`]s so callers see the same
//! error shape a real driver would produce.

use super::rng::MockRng;
use daq_core::error::{DriverError, DriverErrorKind};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Error injection configuration for mock devices.
///
/// Clones share state, so a test can keep a handle and flip failures on a
/// device that is already in use.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Probability (0.0 to 1.0) that any operation fails
    failure_rate: f64,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// Operations that fail until restored
    forced: Arc<Mutex<HashSet<&'static str>>>,
}

impl ErrorConfig {
    /// No injected errors
    pub fn none() -> Self {
        Self::random_failures_seeded(0.0, None)
    }

    /// Uniform random failures with an optional seed
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        Self {
            failure_rate: rate,
            rng: Arc::new(MockRng::new(seed)),
            forced: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Make every call of `operation` fail until [`restore`](Self::restore).
    pub fn fail(&self, operation: &'static str) {
        self.forced.lock().insert(operation);
    }

    /// Undo [`fail`](Self::fail).
    pub fn restore(&self, operation: &'static str) {
        self.forced.lock().remove(operation);
    }

    /// Fail `operation` if a forced or random failure applies.
    pub fn check_operation(
        &self,
        driver_type: &str,
        operation: &'static str,
    ) -> Result<(), DriverError> {
        if self.forced.lock().contains(operation) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Injected failure on '{}'", operation),
            ));
        }
        if self.rng.should_fail(self.failure_rate) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Random failure on operation '{}'", operation),
            ));
        }
        Ok(())
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
