//! Property controller
//!
//! Best-effort configuration writes against the current device. Every
//! failure mode — no device attached, unsupported property, device error —
//! is downgraded to a log line; nothing here can abort the control loop.
//!
//! Writes are re-issued on every call on purpose: firmware resets and
//! external tools can silently revert settings, and the device offers no
//! reliable read-back for the toggles. `disable_laser`/`disable_ldp`
//! always write "off" unconditionally instead of toggling from a read
//! value.

use crate::registry::DeviceRegistry;
use crate::traits::DeviceControl;
use sensor::{CapabilityResult, CaptureSettings, PropertyId, PropertyPermission, PropertyValue};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Issues property writes against the registry's current device
pub struct PropertyController {
    registry: Arc<DeviceRegistry>,
}

impl PropertyController {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Apply manual exposure and gain
    ///
    /// Auto-exposure is disabled first, always: manual exposure writes are
    /// firmware-overridden while auto-exposure is on, so the order is a
    /// correctness requirement. A property that turns out unsupported is
    /// skipped; the remaining writes still go out.
    pub fn apply_settings(&self, settings: &CaptureSettings) {
        let Some(active) = self.registry.current() else {
            return;
        };
        let device = active.device();

        self.write_checked(device, PropertyId::AutoExposure, PropertyValue::Bool(false));
        self.write_checked(
            device,
            PropertyId::Exposure,
            PropertyValue::Int(settings.exposure_us),
        );
        self.write_checked(device, PropertyId::Gain, PropertyValue::Int(settings.gain));
    }

    /// Turn the IR projector laser off
    pub fn disable_laser(&self) {
        self.set_off(PropertyId::LaserEnable);
    }

    /// Turn laser drive-over-current protection off
    pub fn disable_ldp(&self) {
        self.set_off(PropertyId::LdpEnable);
    }

    fn set_off(&self, property: PropertyId) {
        let Some(active) = self.registry.current() else {
            return;
        };
        self.write_checked(active.device(), property, PropertyValue::Bool(false));
    }

    /// Capability-check then write. Returns whether the write landed.
    fn write_checked(
        &self,
        device: &dyn DeviceControl,
        property: PropertyId,
        value: PropertyValue,
    ) -> bool {
        match device.query_capability(property, PropertyPermission::Write) {
            CapabilityResult::Supported => {}
            CapabilityResult::Unsupported => {
                debug!(serial = %device.serial(), ?property, "property not supported, skipping");
                return false;
            }
            CapabilityResult::DeviceError(message) => {
                warn!(
                    serial = %device.serial(),
                    ?property,
                    %message,
                    "capability query failed, treating property as unsupported"
                );
                return false;
            }
        }

        match device.set_property(property, value) {
            Ok(()) => {
                trace!(serial = %device.serial(), ?property, %value, "property applied");
                true
            }
            Err(e) => {
                warn!(serial = %device.serial(), ?property, error = %e, "property write failed");
                false
            }
        }
    }
}
