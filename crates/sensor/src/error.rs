//! Capture error types

use crate::types::{PropertyId, SerialNumber};
use thiserror::Error;

/// Errors from the capture subsystem boundary
///
/// These cover enumeration, open, and pipeline creation. None of them are
/// fatal to the lifecycle core: the hot-plug router logs and skips, the
/// control loop waits and retries.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Serial not present in the current device list
    #[error("device {0} not found")]
    DeviceNotFound(SerialNumber),

    /// Device exists but could not be opened
    #[error("failed to open device {serial}: {message}")]
    OpenFailed {
        serial: SerialNumber,
        message: String,
    },

    /// Pipeline creation or stream negotiation failed
    #[error("failed to create pipeline for device {serial}: {message}")]
    PipelineFailed {
        serial: SerialNumber,
        message: String,
    },

    /// Device enumeration failed at the subsystem level
    #[error("device enumeration failed: {0}")]
    Enumeration(String),
}

/// Errors from a single property get/set call
///
/// Caught at the property-controller boundary and downgraded to log lines;
/// never surfaced to the control loop.
#[derive(Debug, Error)]
pub enum PropertyError {
    /// Property not present on this device
    #[error("property {0:?} unsupported")]
    Unsupported(PropertyId),

    /// The device rejected or failed the call
    #[error("device error on property {property:?}: {message}")]
    Device {
        property: PropertyId,
        message: String,
    },

    /// Value variant does not match the property's type
    #[error("type mismatch for property {property:?}")]
    TypeMismatch { property: PropertyId },
}

/// Type alias for capture results
pub type Result<T> = std::result::Result<T, CaptureError>;
