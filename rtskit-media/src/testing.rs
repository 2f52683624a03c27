//! In-memory media backend for tests
//!
//! Clones of a [`FakeMediaBackend`] share one [`FakeMediaState`], so a test
//! can keep a clone to script failures and inspect what the capture
//! controller did after handing the backend over.

use crate::backend::{AudioCapture, MediaBackend, VideoCapture};
use crate::devices::{
    AudioDevice, CameraFacing, Capability, CodecName, PlaybackDevice, VideoDevice,
};
use crate::error::{MediaError, MediaResult};
use parking_lot::Mutex;
use rtskit_core::{LocalTrack, MediaKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Device lists, failure switches and observations of a fake backend
#[derive(Debug, Default)]
pub struct FakeMediaState {
    /// Reported audio sources
    pub audio_devices: Vec<AudioDevice>,
    /// Reported video sources
    pub video_devices: Vec<VideoDevice>,
    /// Capabilities per video device id
    pub capabilities: HashMap<String, Vec<Capability>>,
    /// Reported audio codecs
    pub audio_codecs: Vec<CodecName>,
    /// Reported video codecs
    pub video_codecs: Vec<CodecName>,
    /// Reported playback devices
    pub playback_devices: Vec<PlaybackDevice>,
    /// Capture start fails
    pub fail_start: bool,
    /// Live device switch fails
    pub fail_switch: bool,
    /// Number of audio handles opened
    pub audio_opened: usize,
    /// Number of video handles opened
    pub video_opened: usize,
    /// Number of codec list queries
    pub codec_queries: usize,
    /// Names of devices that started capturing, in order
    pub started: Vec<String>,
    /// Names of devices that stopped capturing, in order
    pub stopped: Vec<String>,
    /// Devices switched to, in order
    pub switches: Vec<String>,
    /// Live format changes, in order
    pub format_changes: Vec<Capability>,
    /// Capabilities applied to idle handles, in order
    pub capabilities_set: Vec<Capability>,
    /// Playback devices initialised, in order
    pub playback_initialised: Vec<String>,
}

/// Fake media backend
#[derive(Debug, Clone, Default)]
pub struct FakeMediaBackend {
    state: Arc<Mutex<FakeMediaState>>,
}

impl FakeMediaBackend {
    /// Backend with no devices at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Backend with a microphone, front and back cameras and one NDI source
    pub fn standard() -> Self {
        let camera_modes = vec![
            Capability::new(640, 480, 30),
            Capability::new(1280, 720, 30),
            Capability::new(1920, 1080, 30),
        ];
        let backend = Self::empty();
        backend.script(|state| {
            state.audio_devices = vec![AudioDevice::microphone("mic-0", "Built-in Mic")];
            state.video_devices = vec![
                VideoDevice::camera("cam-0", "Front Camera", CameraFacing::Front),
                VideoDevice::camera("cam-1", "Back Camera", CameraFacing::Back),
                VideoDevice::ndi("ndi-0", "NDI Studio"),
            ];
            state.capabilities.insert("cam-0".into(), camera_modes.clone());
            state.capabilities.insert("cam-1".into(), camera_modes);
            state.audio_codecs = vec![CodecName::new("opus"), CodecName::new("multiopus")];
            state.video_codecs = ["VP8", "VP9", "H264", "AV1"]
                .into_iter()
                .map(CodecName::new)
                .collect();
            state.playback_devices = vec![
                PlaybackDevice::new("spk", "Speaker"),
                PlaybackDevice::new("ear", "Earpiece"),
            ];
        });
        backend
    }

    /// Change lists or failure switches
    pub fn script(&self, f: impl FnOnce(&mut FakeMediaState)) {
        f(&mut self.state.lock());
    }

    /// Inspect what the backend observed
    pub fn inspect<R>(&self, f: impl FnOnce(&FakeMediaState) -> R) -> R {
        f(&self.state.lock())
    }
}

impl MediaBackend for FakeMediaBackend {
    fn audio_devices(&self) -> Vec<AudioDevice> {
        self.state.lock().audio_devices.clone()
    }

    fn video_devices(&self) -> Vec<VideoDevice> {
        self.state.lock().video_devices.clone()
    }

    fn capabilities(&self, device: &VideoDevice) -> Vec<Capability> {
        self.state
            .lock()
            .capabilities
            .get(&device.id)
            .cloned()
            .unwrap_or_default()
    }

    fn audio_codecs(&self) -> Vec<CodecName> {
        let mut state = self.state.lock();
        state.codec_queries += 1;
        state.audio_codecs.clone()
    }

    fn video_codecs(&self) -> Vec<CodecName> {
        let mut state = self.state.lock();
        state.codec_queries += 1;
        state.video_codecs.clone()
    }

    fn playback_devices(&self) -> Vec<PlaybackDevice> {
        self.state.lock().playback_devices.clone()
    }

    fn open_audio(&mut self, device: &AudioDevice) -> MediaResult<Box<dyn AudioCapture>> {
        self.state.lock().audio_opened += 1;
        Ok(Box::new(FakeAudioCapture {
            state: Arc::clone(&self.state),
            device: device.clone(),
            capturing: false,
        }))
    }

    fn open_video(&mut self, device: &VideoDevice) -> MediaResult<Box<dyn VideoCapture>> {
        self.state.lock().video_opened += 1;
        Ok(Box::new(FakeVideoCapture {
            state: Arc::clone(&self.state),
            device: device.clone(),
            capability: None,
            capturing: false,
        }))
    }

    fn init_playback(&mut self, device: &PlaybackDevice) -> MediaResult<()> {
        self.state.lock().playback_initialised.push(device.name.clone());
        Ok(())
    }
}

/// Fake audio handle
#[derive(Debug)]
pub struct FakeAudioCapture {
    state: Arc<Mutex<FakeMediaState>>,
    device: AudioDevice,
    capturing: bool,
}

impl AudioCapture for FakeAudioCapture {
    fn start(&mut self) -> MediaResult<LocalTrack> {
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(MediaError::backend("scripted start failure"));
        }
        state.started.push(self.device.name.clone());
        self.capturing = true;
        Ok(LocalTrack::new(MediaKind::Audio, self.device.name.clone()))
    }

    fn stop(&mut self) {
        if self.capturing {
            self.state.lock().stopped.push(self.device.name.clone());
            self.capturing = false;
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }
}

/// Fake video handle
#[derive(Debug)]
pub struct FakeVideoCapture {
    state: Arc<Mutex<FakeMediaState>>,
    device: VideoDevice,
    capability: Option<Capability>,
    capturing: bool,
}

impl VideoCapture for FakeVideoCapture {
    fn start(&mut self, capability: Option<&Capability>) -> MediaResult<LocalTrack> {
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(MediaError::backend("scripted start failure"));
        }
        state.started.push(self.device.name.clone());
        self.capability = capability.copied();
        self.capturing = true;
        Ok(LocalTrack::new(MediaKind::Video, self.device.name.clone()))
    }

    fn stop(&mut self) {
        if self.capturing {
            self.state.lock().stopped.push(self.device.name.clone());
            self.capturing = false;
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn set_capability(&mut self, capability: &Capability) {
        self.capability = Some(*capability);
        self.state.lock().capabilities_set.push(*capability);
    }

    fn change_capture_format(&mut self, capability: &Capability) -> MediaResult<()> {
        self.capability = Some(*capability);
        self.state.lock().format_changes.push(*capability);
        Ok(())
    }

    fn switch_device(&mut self, device: &VideoDevice) -> MediaResult<()> {
        let mut state = self.state.lock();
        if state.fail_switch {
            return Err(MediaError::SwitchFailed {
                device: device.to_string(),
                reason: "scripted switch failure".to_string(),
            });
        }
        state.switches.push(device.name.clone());
        self.device = device.clone();
        Ok(())
    }
}
