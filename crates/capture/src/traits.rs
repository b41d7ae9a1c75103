//! Capture subsystem abstraction
//!
//! Object-safe traits standing in for the vendor SDK. Implementations are
//! expected to be internally synchronized (the SDK serializes device access
//! itself), which is why every method takes `&self`: registry snapshots are
//! shared across threads and issue property writes and frame waits without
//! any lock of ours held.

use async_channel::Receiver;
use sensor::{
    CapabilityResult, FrameSet, HotplugNotification, PropertyId, PropertyPermission,
    PropertyValue, SerialNumber, StreamConfig,
};
use std::time::Duration;

/// Entry point into the capture subsystem
pub trait CaptureBackend: Send + Sync {
    /// Enumerate serials of all currently connected devices
    fn query_device_list(&self) -> sensor::Result<Vec<SerialNumber>>;

    /// Open a device by serial
    fn open_device(&self, serial: &SerialNumber) -> sensor::Result<Box<dyn DeviceControl>>;

    /// Stream of combined hot-plug notifications
    ///
    /// Each received value carries the removed and added lists of one
    /// change event together; consumers must not split them, since the
    /// same serial can appear in both during a reconnect glitch.
    fn notifications(&self) -> Receiver<HotplugNotification>;
}

/// An opened device
pub trait DeviceControl: Send + Sync + std::fmt::Debug {
    /// The device's serial number
    fn serial(&self) -> &SerialNumber;

    /// Query whether a property permits the given access on this device
    ///
    /// Never panics and never blocks on a dead device longer than the
    /// underlying SDK call; "unsupported" is a normal return value.
    fn query_capability(
        &self,
        property: PropertyId,
        permission: PropertyPermission,
    ) -> CapabilityResult;

    /// Read a property value
    fn get_property(&self, property: PropertyId) -> Result<PropertyValue, sensor::PropertyError>;

    /// Write a property value
    fn set_property(
        &self,
        property: PropertyId,
        value: PropertyValue,
    ) -> Result<(), sensor::PropertyError>;

    /// Create a capture pipeline for this device
    ///
    /// One pipeline per device; the registry owns the pairing.
    fn create_pipeline(&self, config: &StreamConfig) -> sensor::Result<Box<dyn FramePipeline>>;
}

/// A running capture session bound to one device
pub trait FramePipeline: Send + Sync {
    /// Wait for the next frame set with a bounded timeout
    ///
    /// `None` means timeout, not failure; callers retry.
    fn wait_for_frames(&self, timeout: Duration) -> Option<FrameSet>;

    /// Stop the capture session. Idempotent.
    fn stop(&self);
}
