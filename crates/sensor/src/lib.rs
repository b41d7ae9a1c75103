//! Shared sensor types for ir-depth-viewer
//!
//! This crate defines the data vocabulary used by every other crate:
//! serial numbers, property identifiers and typed values, capability
//! results, stream configuration, and frame-set metadata. It has no
//! device I/O of its own.

pub mod error;
pub mod types;

pub use error::{CaptureError, PropertyError, Result};
pub use types::{
    CapabilityResult, CaptureSettings, Frame, FrameKind, FrameSet, HotplugNotification,
    PropertyId, PropertyPermission, PropertyValue, SerialNumber, StreamConfig,
};
