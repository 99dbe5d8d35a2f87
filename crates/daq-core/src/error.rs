//! Error types for the acquisition scheduler.
//!
//! This module defines the primary error type, `DaqError`, shared by every crate
//! in the workspace. Using the `thiserror` crate, it gives a single vocabulary for
//! the failure classes an acquisition session can run into.
//!
//! ## Error Hierarchy
//!
//! - **`Hardware`**: A device-layer query failed (stage or focus position,
//!   property limits). Fatal while an acquisition is being constructed, but only
//!   aborts the current gesture when it happens mid-session.
//! - **`PositionResolution`**: The storage collaborator could not map stage or
//!   grid coordinates to a position index. The whole triggering request is
//!   discarded.
//! - **`Cancelled`**: A blocking queue operation was cancelled. Never retried.
//! - **`InvalidTransition`**: A lifecycle operation was requested in a state that
//!   does not allow it (for example pausing a finished acquisition).
//! - **`Configuration`**: Settings failed semantic validation.
//!
//! Duplicate tiles are not errors; the dedup table reports them as a normal
//! outcome.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a device-layer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device did not come up.
    Initialization,
    /// Link to the device dropped or never responded.
    Communication,
    /// Device reported a fault.
    Hardware,
    /// Operation exceeded its deadline.
    Timeout,
    /// Argument out of range for the device.
    InvalidParameter,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
        };
        write!(f, "{}", label)
    }
}

/// Structured failure reported by a device driver.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver identifier (e.g. `mock_focus`).
    pub driver_type: String,
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// A blocking operation observed its cancellation token.
///
/// Returned by every suspension point in the scheduler (event submission,
/// event dequeue, image hand-off). Callers stop the current unit of work and
/// report upward.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the acquisition scheduler.
///
/// # Error Categories
///
/// 1. **Construction errors** - `Hardware`, `Configuration`
///    - Occur while an acquisition is being created
///    - Recovery: fix the hardware or settings and create a new acquisition
///
/// 2. **Gesture errors** - `Hardware`, `PositionResolution`, `Cancelled`
///    - Contained to the failing user request and logged
///    - Never corrupt the event queue or the dedup table
///
/// 3. **Lifecycle errors** - `InvalidTransition`, `DispatcherClosed`, `ShutdownTimeout`
///    - Returned to the control layer when an operation does not fit the
///      current state
///
/// # Example
///
/// ```rust
/// use daq_core::error::{AppResult, DaqError};
///
/// fn validate_z_step(z_step: f64) -> AppResult<()> {
///     if z_step <= 0.0 {
///         return Err(DaqError::Configuration("z_step must be positive".into()));
///     }
///     Ok(())
/// }
///
/// assert!(validate_z_step(0.0).is_err());
/// ```
#[derive(Error, Debug)]
pub enum DaqError {
    /// Settings validation failed.
    ///
    /// Occurs when values parse correctly but fail semantic validation
    /// (e.g. non-positive z step, overlap outside `0..100`).
    ///
    /// **Error Type**: Permanent - requires fixing the settings.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Device-layer query failed.
    ///
    /// Occurs when the stage or focus position cannot be read, or when the
    /// focus drive property limits cannot be queried.
    ///
    /// **Error Type**: Fatal during construction; recoverable (request aborted,
    /// logged) mid-gesture.
    #[error("Hardware query failed on '{device}': {message}")]
    Hardware {
        /// Device name as reported by the device layer.
        device: String,
        /// Underlying failure.
        message: String,
    },

    /// Structured driver error with category.
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// Storage could not resolve a position index.
    ///
    /// **Error Type**: Discards the whole triggering request; nothing is
    /// partially scheduled.
    #[error("Problem with position metadata: {0}")]
    PositionResolution(String),

    /// A blocking operation was cancelled.
    ///
    /// **Recovery Strategy**: None. Cancellation means "stop now".
    #[error("Operation cancelled")]
    Cancelled(#[from] Cancelled),

    /// Lifecycle operation rejected in the current state.
    #[error("Cannot {action}: acquisition is {state}")]
    InvalidTransition {
        /// Operation that was requested.
        action: &'static str,
        /// State the acquisition was in.
        state: String,
    },

    /// The explore dispatcher no longer accepts requests.
    #[error("Dispatcher is shut down and no longer accepts requests")]
    DispatcherClosed,

    /// A bounded shutdown wait expired.
    #[error("Timed out after {waited_ms} ms waiting for {what}")]
    ShutdownTimeout {
        /// Component being waited on.
        what: &'static str,
        /// Time spent waiting.
        waited_ms: u64,
    },

    /// Storage collaborator failed to persist data.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested frame dimensions exceed supported limits.
    #[error("Frame dimensions {width}x{height} exceed maximum {max_dimension} per dimension")]
    FrameDimensionsTooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Largest allowed dimension.
        max_dimension: u32,
    },

    /// Calculating a size overflowed usize.
    #[error("Size overflow while computing {context}")]
    SizeOverflow {
        /// What was being computed.
        context: &'static str,
    },

    /// Frame payload exceeds maximum allowed size.
    #[error("Frame size {bytes} bytes exceeds maximum {max_bytes} bytes")]
    FrameTooLarge {
        /// Requested payload size.
        bytes: usize,
        /// Largest allowed payload.
        max_bytes: usize,
    },
}

impl DaqError {
    /// Build a [`DaqError::Hardware`] from any displayable failure.
    pub fn hardware(device: impl Into<String>, err: impl std::fmt::Display) -> Self {
        DaqError::Hardware {
            device: device.into(),
            message: err.to_string(),
        }
    }

    /// True if this error represents cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DaqError::Cancelled(_))
    }
}
