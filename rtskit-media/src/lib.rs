//! # RTS Kit Media
//!
//! Local device handling for RTS Kit: the device catalog with its selectable
//! lists, the platform backend boundary and capture control.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod capture;
pub mod catalog;
pub mod devices;
pub mod error;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use backend::{AudioCapture, MediaBackend, VideoCapture};
pub use capture::CaptureController;
pub use catalog::{DeviceCatalog, SelectionIndices};
pub use devices::{
    AudioDevice, AudioDeviceKind, CameraFacing, Capability, CodecName, PlaybackDevice,
    VideoDevice, VideoDeviceKind,
};
pub use error::{ErrorCategory, MediaError, MediaResult};
