//! Device lifecycle core for ir-depth-viewer
//!
//! The vendor capture SDK is modeled as a set of object-safe traits
//! ([`CaptureBackend`], [`DeviceControl`], [`FramePipeline`]); everything
//! above those traits is this crate:
//!
//! - [`DeviceRegistry`] — tracks the single current device/pipeline pair
//!   behind an atomically swapped snapshot.
//! - [`HotplugRouter`] — turns combined removed/added notifications into
//!   registry detach/attach calls, removals strictly first.
//! - [`PropertyController`] — best-effort exposure/gain/laser/LDP writes
//!   with capability checks; unsupported properties are never fatal.
//!
//! The [`sim`] module provides a scripted in-memory backend used by the
//! test suites and by `--simulate` runs of the viewer binary.

pub mod hotplug;
pub mod properties;
pub mod registry;
pub mod sim;
pub mod traits;

pub use hotplug::HotplugRouter;
pub use properties::PropertyController;
pub use registry::{ActiveDevice, DeviceRegistry};
pub use traits::{CaptureBackend, DeviceControl, FramePipeline};
