//! Device registry
//!
//! Tracks the zero-or-one current device/pipeline pair. The pair lives in
//! a single `Arc`, swapped under a briefly held mutex: readers clone the
//! `Arc` and drop the lock before touching the device, so no device I/O
//! ever happens inside the critical section and no reader can observe a
//! device without its pipeline.

use crate::traits::{DeviceControl, FramePipeline};
use sensor::SerialNumber;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// The current device/pipeline pair
///
/// Pipeline is declared before device: drop order tears the pipeline down
/// first, then releases the device, matching the order the SDK requires.
pub struct ActiveDevice {
    serial: SerialNumber,
    pipeline: Box<dyn FramePipeline>,
    device: Box<dyn DeviceControl>,
}

impl ActiveDevice {
    pub fn serial(&self) -> &SerialNumber {
        &self.serial
    }

    pub fn device(&self) -> &dyn DeviceControl {
        self.device.as_ref()
    }

    pub fn pipeline(&self) -> &dyn FramePipeline {
        self.pipeline.as_ref()
    }
}

impl Drop for ActiveDevice {
    fn drop(&mut self) {
        // Runs when the last snapshot reference goes away, which may be
        // after detach if a reader still holds the pair.
        self.pipeline.stop();
        debug!(serial = %self.serial, "released device and pipeline");
    }
}

/// Registry of the single current device
///
/// Constructed once at startup and shared by `Arc`; only the hot-plug
/// router mutates it, everything else takes snapshots.
pub struct DeviceRegistry {
    current: Mutex<Option<Arc<ActiveDevice>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Attach a device with its already-built pipeline
    ///
    /// First attach wins: returns `false` without touching state when a
    /// device is already current. The caller performs all device I/O
    /// (open, pipeline creation) before calling; this method only swaps
    /// the pointer. A losing caller drops its pair.
    pub fn attach(
        &self,
        device: Box<dyn DeviceControl>,
        pipeline: Box<dyn FramePipeline>,
    ) -> bool {
        let serial = device.serial().clone();
        let mut current = self.lock();

        if let Some(active) = current.as_ref() {
            debug!(
                serial = %serial,
                current = %active.serial(),
                "attach ignored, a device is already current"
            );
            drop(current);
            // The losing pair still owns a live capture session.
            pipeline.stop();
            return false;
        }

        *current = Some(Arc::new(ActiveDevice {
            serial: serial.clone(),
            pipeline,
            device,
        }));
        info!(serial = %serial, "device attached");
        true
    }

    /// Detach the current device if its serial matches
    ///
    /// Mismatched or absent serial is a no-op returning `false` (stale or
    /// duplicate notifications land here). Teardown runs when the last
    /// snapshot of the pair is dropped.
    pub fn detach(&self, serial: &SerialNumber) -> bool {
        let removed = {
            let mut current = self.lock();
            let matches = current
                .as_ref()
                .is_some_and(|active| active.serial() == serial);
            if matches { current.take() } else { None }
        };

        match removed {
            Some(_) => {
                info!(serial = %serial, "device detached");
                true
            }
            None => {
                debug!(serial = %serial, "detach ignored, serial is not current");
                false
            }
        }
    }

    /// Snapshot of the current device/pipeline pair
    pub fn current(&self) -> Option<Arc<ActiveDevice>> {
        self.lock().clone()
    }

    /// Snapshot of the current serial
    pub fn current_serial(&self) -> Option<SerialNumber> {
        self.lock().as_ref().map(|active| active.serial().clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<ActiveDevice>>> {
        // A panic while holding the lock cannot leave the pair half
        // swapped (the swap is a single assignment), so a poisoned lock
        // is still safe to use.
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
