//! Platform media backend boundary
//!
//! Camera and microphone hardware access lives behind [`MediaBackend`]. The
//! catalog queries it for device lists; the capture controller opens
//! [`AudioCapture`] / [`VideoCapture`] handles from it.

use crate::devices::{AudioDevice, Capability, CodecName, PlaybackDevice, VideoDevice};
use crate::error::MediaResult;
use rtskit_core::LocalTrack;
use std::fmt;

/// Device enumeration and capture handle creation
pub trait MediaBackend: Send + fmt::Debug {
    /// Currently available audio sources
    fn audio_devices(&self) -> Vec<AudioDevice>;

    /// Currently available video sources
    fn video_devices(&self) -> Vec<VideoDevice>;

    /// Capabilities of a video source; NDI sources report none
    fn capabilities(&self, device: &VideoDevice) -> Vec<Capability>;

    /// Supported audio codecs
    fn audio_codecs(&self) -> Vec<CodecName>;

    /// Supported video codecs
    fn video_codecs(&self) -> Vec<CodecName>;

    /// Available playback devices
    fn playback_devices(&self) -> Vec<PlaybackDevice>;

    /// Open a capture handle for an audio source
    fn open_audio(&mut self, device: &AudioDevice) -> MediaResult<Box<dyn AudioCapture>>;

    /// Open a capture handle for a video source
    fn open_video(&mut self, device: &VideoDevice) -> MediaResult<Box<dyn VideoCapture>>;

    /// Prepare a playback device to render subscribed audio
    fn init_playback(&mut self, device: &PlaybackDevice) -> MediaResult<()>;
}

/// A handle on one audio source
pub trait AudioCapture: Send + fmt::Debug {
    /// Start capturing, producing the local track
    fn start(&mut self) -> MediaResult<LocalTrack>;

    /// Stop capturing and release the hardware
    fn stop(&mut self);

    /// Whether the handle is capturing
    fn is_capturing(&self) -> bool;
}

/// A handle on one video source
pub trait VideoCapture: Send + fmt::Debug {
    /// Start capturing with `capability` (`None` for NDI), producing the local track
    fn start(&mut self, capability: Option<&Capability>) -> MediaResult<LocalTrack>;

    /// Stop capturing and release the hardware
    fn stop(&mut self);

    /// Whether the handle is capturing
    fn is_capturing(&self) -> bool;

    /// Capability to use on the next start
    fn set_capability(&mut self, capability: &Capability);

    /// Change the format of a live capture
    fn change_capture_format(&mut self, capability: &Capability) -> MediaResult<()>;

    /// Move a live capture to another physical device
    fn switch_device(&mut self, device: &VideoDevice) -> MediaResult<()>;
}
