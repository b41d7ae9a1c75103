//! Hot-plug event router
//!
//! Converts combined removed/added notifications from the capture backend
//! into registry detach/attach calls. Removals are always processed before
//! additions: a reconnect glitch lists the same serial in both lists of
//! one notification, and processing additions first would leave the
//! registry holding a dead handle for a serial that just reappeared.

use crate::registry::DeviceRegistry;
use crate::traits::CaptureBackend;
use sensor::{CaptureError, HotplugNotification, SerialNumber, StreamConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes hot-plug notifications into the device registry
pub struct HotplugRouter {
    registry: Arc<DeviceRegistry>,
    backend: Arc<dyn CaptureBackend>,
    stream: StreamConfig,
}

impl HotplugRouter {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        backend: Arc<dyn CaptureBackend>,
        stream: StreamConfig,
    ) -> Self {
        Self {
            registry,
            backend,
            stream,
        }
    }

    /// Process one combined notification: removals first, then additions
    pub fn route(&self, notification: &HotplugNotification) {
        for serial in &notification.removed {
            if self.registry.detach(serial) {
                info!(serial = %serial, "removed current device");
            } else {
                debug!(serial = %serial, "removal for non-current device ignored");
            }
        }

        let mut added = notification.added.iter();

        // Single-device policy: the first added serial wins, and only
        // while no device is current.
        if let Some(serial) = added.next() {
            if self.registry.current_serial().is_some() {
                info!(serial = %serial, "added device ignored, a device is already current");
            } else if let Err(e) = self.try_attach(serial) {
                warn!(serial = %serial, error = %e, "failed to bring up added device");
            }
        }

        for serial in added {
            info!(serial = %serial, "additional device ignored (single-device policy)");
        }
    }

    /// Replay the initial enumeration through the normal routing path
    ///
    /// Cold start is just a notification that adds every device already
    /// present; keeping one code path means startup obeys the same
    /// single-device selection as a live hot-plug event.
    pub fn route_initial(&self) -> Result<HotplugNotification, CaptureError> {
        let added = self.backend.query_device_list()?;
        let notification = HotplugNotification {
            removed: Vec::new(),
            added,
        };
        self.route(&notification);
        Ok(notification)
    }

    /// Open the device, build its pipeline, then offer the pair to the
    /// registry. All device I/O happens here, before the registry lock.
    fn try_attach(&self, serial: &SerialNumber) -> Result<(), CaptureError> {
        let device = self.backend.open_device(serial)?;
        let pipeline = device.create_pipeline(&self.stream)?;

        if !self.registry.attach(device, pipeline) {
            // Lost a race with a concurrent attach; the registry stopped
            // the losing pipeline before we dropped the pair.
            debug!(serial = %serial, "attach lost to a concurrent device");
        }
        Ok(())
    }
}
