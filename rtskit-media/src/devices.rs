//! Device, capability and codec entities reported by the platform

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of audio source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioDeviceKind {
    /// Microphone or line-in
    Microphone,
    /// Network audio (NDI)
    Ndi,
    /// Anything else the platform reports
    Other,
}

/// An audio capture source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Platform identifier
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Source kind
    pub kind: AudioDeviceKind,
}

impl AudioDevice {
    /// Create a microphone entry
    pub fn microphone(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: AudioDeviceKind::Microphone,
        }
    }

    /// Create an NDI audio entry
    pub fn ndi(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: AudioDeviceKind::Ndi,
        }
    }
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            AudioDeviceKind::Microphone => "Mic",
            AudioDeviceKind::Ndi => "NDI",
            AudioDeviceKind::Other => "Audio",
        };
        write!(f, "{}:{}", prefix, self.name)
    }
}

/// Kind of video source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoDeviceKind {
    /// Physical camera
    Camera,
    /// Network video (NDI)
    Ndi,
    /// Anything else the platform reports
    Other,
}

/// Direction a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraFacing {
    /// Facing the user
    Front,
    /// Facing away from the user
    Back,
    /// External camera
    External,
    /// Not reported
    #[default]
    Unknown,
}

/// A video capture source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDevice {
    /// Platform identifier
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Source kind
    pub kind: VideoDeviceKind,
    /// Facing, meaningful for cameras only
    pub facing: CameraFacing,
}

impl VideoDevice {
    /// Create a camera entry
    pub fn camera(id: impl Into<String>, name: impl Into<String>, facing: CameraFacing) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: VideoDeviceKind::Camera,
            facing,
        }
    }

    /// Create an NDI video entry
    pub fn ndi(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: VideoDeviceKind::Ndi,
            facing: CameraFacing::Unknown,
        }
    }

    /// Whether this is an NDI source
    pub fn is_ndi(&self) -> bool {
        self.kind == VideoDeviceKind::Ndi
    }

    /// Whether the local preview of this device is mirrored
    pub fn should_mirror(&self) -> bool {
        self.kind == VideoDeviceKind::Camera && self.facing == CameraFacing::Front
    }
}

impl fmt::Display for VideoDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            VideoDeviceKind::Camera => "Camera",
            VideoDeviceKind::Ndi => "NDI",
            VideoDeviceKind::Other => "Video",
        };
        write!(f, "{}:{}", prefix, self.name)
    }
}

/// A capture resolution and frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: u32,
}

impl Capability {
    /// Create a capability
    pub const fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}fps", self.width, self.height, self.fps)
    }
}

/// Name of an audio or video codec ("opus", "VP8", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecName(pub String);

impl CodecName {
    /// Wrap a codec name as reported by the SDK
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Codec name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodecName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An audio output device for subscribed media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackDevice {
    /// Platform identifier
    pub id: String,
    /// Human readable name
    pub name: String,
}

impl PlaybackDevice {
    /// Create a playback device entry
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PlaybackDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Playback:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions() {
        let front = VideoDevice::camera("0", "Front", CameraFacing::Front);
        let studio = VideoDevice::ndi("ndi-1", "Studio");
        assert_eq!(front.to_string(), "Camera:Front");
        assert_eq!(studio.to_string(), "NDI:Studio");
        assert_eq!(Capability::new(1280, 720, 30).to_string(), "1280x720@30fps");
        assert_eq!(AudioDevice::microphone("mic", "Built-in").to_string(), "Mic:Built-in");
    }

    #[test]
    fn test_mirror_policy() {
        assert!(VideoDevice::camera("0", "Front", CameraFacing::Front).should_mirror());
        assert!(!VideoDevice::camera("1", "Back", CameraFacing::Back).should_mirror());
        assert!(!VideoDevice::ndi("ndi-1", "Studio").should_mirror());
    }
}
