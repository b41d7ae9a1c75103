//! Common utilities for ir-depth-viewer
//!
//! Shared plumbing between the capture worker thread and the tokio control
//! side: error handling, logging setup, and the async channel bridge.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{
    CaptureBridge, CaptureCommand, CaptureEvent, CaptureWorker, create_capture_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
