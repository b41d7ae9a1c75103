//! Simulated capture backend
//!
//! A scripted in-memory implementation of the capture traits, used by the
//! integration tests and by `--simulate` runs of the viewer binary.
//! Devices are registered with per-property fault profiles, and every
//! trait call is appended to a shared call log so tests can assert write
//! ordering (auto-exposure before exposure before gain, no reads before a
//! laser/LDP disable, and so on).

use crate::traits::{CaptureBackend, DeviceControl, FramePipeline};
use async_channel::{Receiver, Sender, unbounded};
use sensor::{
    CapabilityResult, CaptureError, Frame, FrameKind, FrameSet, HotplugNotification,
    PropertyError, PropertyId, PropertyPermission, PropertyValue, SerialNumber, StreamConfig,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Fault profile for one simulated device
#[derive(Debug, Clone, Default)]
pub struct SimProfile {
    /// Properties reported as unsupported by capability queries
    pub unsupported: HashSet<PropertyId>,
    /// Properties whose capability query fails at the device level
    pub capability_errors: HashSet<PropertyId>,
    /// Properties whose writes fail even though the capability query passes
    pub write_errors: HashSet<PropertyId>,
    /// Fail `open_device` for this serial
    pub open_fails: bool,
    /// Fail `create_pipeline` for this serial
    pub pipeline_fails: bool,
    /// Make `wait_for_frames` time out instead of producing frames
    pub starve_frames: bool,
}

/// One recorded trait call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    OpenDevice(SerialNumber),
    QueryCapability(SerialNumber, PropertyId, PropertyPermission),
    GetProperty(SerialNumber, PropertyId),
    SetProperty(SerialNumber, PropertyId, PropertyValue),
    CreatePipeline(SerialNumber),
    StopPipeline(SerialNumber),
}

type CallLog = Arc<Mutex<Vec<SimCall>>>;

#[derive(Debug)]
struct SimDeviceState {
    serial: SerialNumber,
    profile: Mutex<SimProfile>,
    properties: Mutex<HashMap<PropertyId, PropertyValue>>,
}

/// Scripted capture backend
pub struct SimulatedBackend {
    devices: Mutex<HashMap<SerialNumber, Arc<SimDeviceState>>>,
    /// Connection order; `query_device_list` preserves it
    connected: Mutex<Vec<SerialNumber>>,
    calls: CallLog,
    notif_tx: Sender<HotplugNotification>,
    notif_rx: Receiver<HotplugNotification>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedBackend {
    pub fn new() -> Self {
        let (notif_tx, notif_rx) = unbounded();
        Self {
            devices: Mutex::new(HashMap::new()),
            connected: Mutex::new(Vec::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            notif_tx,
            notif_rx,
        }
    }

    /// Register a fault-free device and mark it connected
    pub fn add_device(&self, serial: impl Into<SerialNumber>) {
        self.add_device_with_profile(serial, SimProfile::default());
    }

    /// Register a device with a fault profile and mark it connected
    pub fn add_device_with_profile(&self, serial: impl Into<SerialNumber>, profile: SimProfile) {
        let serial = serial.into();
        self.register_device_with_profile(serial.clone(), profile);
        self.plug(&serial);
    }

    /// Register a device without putting it on the bus
    ///
    /// Use this for devices that arrive later via [`notify`](Self::notify);
    /// an added serial must be registered before it can be opened.
    pub fn register_device(&self, serial: impl Into<SerialNumber>) {
        self.register_device_with_profile(serial, SimProfile::default());
    }

    /// Register a device with a fault profile without putting it on the bus
    pub fn register_device_with_profile(
        &self,
        serial: impl Into<SerialNumber>,
        profile: SimProfile,
    ) {
        let serial = serial.into();
        lock(&self.devices).insert(
            serial.clone(),
            Arc::new(SimDeviceState {
                serial,
                profile: Mutex::new(profile),
                properties: Mutex::new(HashMap::new()),
            }),
        );
    }

    /// Replace the fault profile of a registered device
    pub fn set_profile(&self, serial: &SerialNumber, profile: SimProfile) {
        if let Some(state) = lock(&self.devices).get(serial) {
            *lock(&state.profile) = profile;
        }
    }

    /// Remove a device from the bus (no notification is sent)
    pub fn unplug(&self, serial: &SerialNumber) {
        lock(&self.connected).retain(|s| s != serial);
    }

    /// Put a registered device back on the bus (no notification is sent)
    pub fn plug(&self, serial: &SerialNumber) {
        let mut connected = lock(&self.connected);
        if !connected.contains(serial) {
            connected.push(serial.clone());
        }
    }

    /// Deliver a combined hot-plug notification, updating bus state to
    /// match before it is observable
    pub fn notify(&self, removed: &[&str], added: &[&str]) {
        let notification = HotplugNotification {
            removed: removed.iter().map(|s| SerialNumber::from(*s)).collect(),
            added: added.iter().map(|s| SerialNumber::from(*s)).collect(),
        };
        for serial in &notification.removed {
            self.unplug(serial);
        }
        for serial in &notification.added {
            self.plug(serial);
        }
        let _ = self.notif_tx.try_send(notification);
    }

    /// Snapshot of the recorded call log
    pub fn calls(&self) -> Vec<SimCall> {
        lock(&self.calls).clone()
    }

    /// Drain the recorded call log
    pub fn take_calls(&self) -> Vec<SimCall> {
        std::mem::take(&mut *lock(&self.calls))
    }

    /// Read a simulated device's stored property value
    pub fn property(&self, serial: &SerialNumber, property: PropertyId) -> Option<PropertyValue> {
        let devices = lock(&self.devices);
        let state = devices.get(serial)?;
        let value = lock(&state.properties).get(&property).copied();
        value
    }

    fn record(&self, call: SimCall) {
        lock(&self.calls).push(call);
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SimulatedBackend {
    fn query_device_list(&self) -> sensor::Result<Vec<SerialNumber>> {
        Ok(lock(&self.connected).clone())
    }

    fn open_device(&self, serial: &SerialNumber) -> sensor::Result<Box<dyn DeviceControl>> {
        self.record(SimCall::OpenDevice(serial.clone()));

        if !lock(&self.connected).contains(serial) {
            return Err(CaptureError::DeviceNotFound(serial.clone()));
        }
        let state = lock(&self.devices)
            .get(serial)
            .cloned()
            .ok_or_else(|| CaptureError::DeviceNotFound(serial.clone()))?;

        if lock(&state.profile).open_fails {
            return Err(CaptureError::OpenFailed {
                serial: serial.clone(),
                message: "injected open failure".into(),
            });
        }

        Ok(Box::new(SimDevice {
            state,
            calls: Arc::clone(&self.calls),
        }))
    }

    fn notifications(&self) -> Receiver<HotplugNotification> {
        self.notif_rx.clone()
    }
}

#[derive(Debug)]
struct SimDevice {
    state: Arc<SimDeviceState>,
    calls: CallLog,
}

impl SimDevice {
    fn record(&self, call: SimCall) {
        lock(&self.calls).push(call);
    }

    fn profile(&self) -> SimProfile {
        lock(&self.state.profile).clone()
    }
}

/// Whether a property carries a bool (as opposed to an int) value
fn expects_bool(property: PropertyId) -> bool {
    matches!(
        property,
        PropertyId::AutoExposure | PropertyId::LaserEnable | PropertyId::LdpEnable
    )
}

/// Power-on default for a property
fn default_value(property: PropertyId) -> PropertyValue {
    if expects_bool(property) {
        // Laser, LDP and auto-exposure all ship enabled
        PropertyValue::Bool(true)
    } else {
        PropertyValue::Int(0)
    }
}

impl DeviceControl for SimDevice {
    fn serial(&self) -> &SerialNumber {
        &self.state.serial
    }

    fn query_capability(
        &self,
        property: PropertyId,
        permission: PropertyPermission,
    ) -> CapabilityResult {
        self.record(SimCall::QueryCapability(
            self.state.serial.clone(),
            property,
            permission,
        ));

        let profile = self.profile();
        if profile.capability_errors.contains(&property) {
            CapabilityResult::DeviceError("injected capability failure".into())
        } else if profile.unsupported.contains(&property) {
            CapabilityResult::Unsupported
        } else {
            CapabilityResult::Supported
        }
    }

    fn get_property(&self, property: PropertyId) -> Result<PropertyValue, PropertyError> {
        self.record(SimCall::GetProperty(self.state.serial.clone(), property));

        if self.profile().unsupported.contains(&property) {
            return Err(PropertyError::Unsupported(property));
        }
        Ok(lock(&self.state.properties)
            .get(&property)
            .copied()
            .unwrap_or_else(|| default_value(property)))
    }

    fn set_property(
        &self,
        property: PropertyId,
        value: PropertyValue,
    ) -> Result<(), PropertyError> {
        self.record(SimCall::SetProperty(
            self.state.serial.clone(),
            property,
            value,
        ));

        let profile = self.profile();
        if profile.unsupported.contains(&property) {
            return Err(PropertyError::Unsupported(property));
        }
        if profile.write_errors.contains(&property) {
            return Err(PropertyError::Device {
                property,
                message: "injected write failure".into(),
            });
        }
        let type_ok = matches!(value, PropertyValue::Bool(_)) == expects_bool(property);
        if !type_ok {
            return Err(PropertyError::TypeMismatch { property });
        }

        lock(&self.state.properties).insert(property, value);
        Ok(())
    }

    fn create_pipeline(
        &self,
        config: &StreamConfig,
    ) -> sensor::Result<Box<dyn FramePipeline>> {
        self.record(SimCall::CreatePipeline(self.state.serial.clone()));

        if self.profile().pipeline_fails {
            return Err(CaptureError::PipelineFailed {
                serial: self.state.serial.clone(),
                message: "injected pipeline failure".into(),
            });
        }

        Ok(Box::new(SimPipeline {
            state: Arc::clone(&self.state),
            calls: Arc::clone(&self.calls),
            config: config.clone(),
            frame_index: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }))
    }
}

struct SimPipeline {
    state: Arc<SimDeviceState>,
    calls: CallLog,
    config: StreamConfig,
    frame_index: AtomicU64,
    stopped: AtomicBool,
}

impl FramePipeline for SimPipeline {
    fn wait_for_frames(&self, _timeout: Duration) -> Option<FrameSet> {
        if self.stopped.load(Ordering::SeqCst) || lock(&self.state.profile).starve_frames {
            return None;
        }

        let index = self.frame_index.fetch_add(1, Ordering::SeqCst);
        let mut frames = Vec::new();
        let frame = |kind| Frame {
            kind,
            width: self.config.width,
            height: self.config.height,
            index,
        };
        if self.config.ir_left {
            frames.push(frame(FrameKind::IrLeft));
        }
        if self.config.ir_right {
            frames.push(frame(FrameKind::IrRight));
        }
        if self.config.depth {
            frames.push(frame(FrameKind::Depth));
        }
        Some(FrameSet { frames })
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            lock(&self.calls).push(SimCall::StopPipeline(self.state.serial.clone()));
        }
    }
}
