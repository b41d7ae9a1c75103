//! Sensor and device type definitions
//!
//! This module defines the device-facing types used across the workspace:
//! serial numbers, configurable properties, capability query results, and
//! the payload of a hot-plug notification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device serial number (vendor-assigned, unique per physical unit)
///
/// Serial numbers are the only stable identity a device carries across
/// reconnects; bus addresses change on every re-enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialNumber(pub String);

impl SerialNumber {
    /// Borrow the serial as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SerialNumber {
    fn from(s: &str) -> Self {
        SerialNumber(s.to_string())
    }
}

impl From<String> for SerialNumber {
    fn from(s: String) -> Self {
        SerialNumber(s)
    }
}

/// Runtime-configurable device property
///
/// The set is intentionally small: only the properties the control loop
/// actually writes. Sensor-specific extras stay behind the vendor SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyId {
    /// Auto-exposure enable. Mutually exclusive with manual exposure:
    /// firmware silently overrides manual writes while this is on.
    AutoExposure,
    /// Manual IR exposure time in microseconds
    Exposure,
    /// Manual IR analog gain
    Gain,
    /// IR projector laser enable
    LaserEnable,
    /// Laser drive-over-current protection (LDP) enable
    LdpEnable,
}

/// Typed property value
///
/// The vendor property interface is weakly typed (int or bool keyed by
/// property id); this enum keeps the pairing explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i32),
    Bool(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Access direction for a capability query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyPermission {
    Read,
    Write,
}

/// Result of a property capability query
///
/// "Unsupported" is a normal control-flow value here, not an error: the
/// controller skips the write and moves on. Only `DeviceError` carries a
/// message, and even that is logged rather than propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityResult {
    /// Property exists and permits the requested access
    Supported,
    /// Property missing or access direction not permitted on this device
    Unsupported,
    /// The query itself failed at the device level
    DeviceError(String),
}

impl CapabilityResult {
    pub fn is_supported(&self) -> bool {
        matches!(self, CapabilityResult::Supported)
    }
}

/// Manual capture settings applied on every control tick
///
/// Settings are re-applied each tick because the device does not guarantee
/// they survive reconnects or external tool writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// IR exposure time in microseconds
    pub exposure_us: i32,
    /// IR analog gain
    pub gain: i32,
}

/// Stream selection and mode for a capture pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub ir_left: bool,
    pub ir_right: bool,
    pub depth: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ir_left: true,
            ir_right: true,
            depth: false,
            width: 1280,
            height: 800,
            fps: 30,
        }
    }
}

/// Which sensor a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    IrLeft,
    IrRight,
    Depth,
}

/// Metadata for one frame of a frame set
///
/// Pixel payloads stay inside the vendor pipeline; the control loop only
/// needs dimensions and the running index for logging and warm-up skips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-pipeline frame counter
    pub index: u64,
}

/// A bundle of synchronized frames for one capture instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSet {
    pub frames: Vec<Frame>,
}

impl FrameSet {
    /// Find the frame for a given sensor, if the set carries one
    pub fn frame(&self, kind: FrameKind) -> Option<&Frame> {
        self.frames.iter().find(|f| f.kind == kind)
    }
}

/// A combined hot-plug notification
///
/// The capture subsystem delivers removals and additions of one change
/// event together. The pairing matters: a reconnect glitch can list the
/// same serial in both, and the router relies on seeing both lists at
/// once to process removals first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotplugNotification {
    pub removed: Vec<SerialNumber>,
    pub added: Vec<SerialNumber>,
}

impl HotplugNotification {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}
