//! Integration tests for the device catalog and capture control
//!
//! A small stub backend stands in for the platform: a front camera without
//! capabilities, a back camera with two, and an NDI source.

use parking_lot::Mutex;
use rtskit_core::{CaptureState, LocalTrack, MediaKind};
use rtskit_media::*;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

#[derive(Debug, Clone, Default)]
struct StubBackend {
    audio: Vec<AudioDevice>,
    video: Vec<VideoDevice>,
    events: Arc<Mutex<Vec<String>>>,
}

impl StubBackend {
    fn studio() -> Self {
        Self {
            audio: vec![
                AudioDevice::microphone("mic", "Mic"),
                AudioDevice::ndi("ndi-a", "Studio Audio"),
            ],
            video: vec![
                VideoDevice::camera("front", "Front", CameraFacing::Front),
                VideoDevice::camera("back", "Back", CameraFacing::Back),
                VideoDevice::ndi("ndi-v", "Studio"),
            ],
            events: Arc::default(),
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl MediaBackend for StubBackend {
    fn audio_devices(&self) -> Vec<AudioDevice> {
        self.audio.clone()
    }

    fn video_devices(&self) -> Vec<VideoDevice> {
        self.video.clone()
    }

    fn capabilities(&self, device: &VideoDevice) -> Vec<Capability> {
        match device.id.as_str() {
            "back" => vec![Capability::new(640, 480, 15), Capability::new(1280, 720, 30)],
            _ => Vec::new(),
        }
    }

    fn audio_codecs(&self) -> Vec<CodecName> {
        vec![CodecName::new("opus")]
    }

    fn video_codecs(&self) -> Vec<CodecName> {
        vec![CodecName::new("VP8"), CodecName::new("H264")]
    }

    fn playback_devices(&self) -> Vec<PlaybackDevice> {
        Vec::new()
    }

    fn open_audio(&mut self, device: &AudioDevice) -> MediaResult<Box<dyn AudioCapture>> {
        Ok(Box::new(StubAudio {
            name: device.name.clone(),
            capturing: false,
        }))
    }

    fn open_video(&mut self, device: &VideoDevice) -> MediaResult<Box<dyn VideoCapture>> {
        Ok(Box::new(StubVideo {
            name: device.name.clone(),
            capturing: false,
            events: Arc::clone(&self.events),
        }))
    }

    fn init_playback(&mut self, _device: &PlaybackDevice) -> MediaResult<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct StubAudio {
    name: String,
    capturing: bool,
}

impl AudioCapture for StubAudio {
    fn start(&mut self) -> MediaResult<LocalTrack> {
        self.capturing = true;
        Ok(LocalTrack::new(MediaKind::Audio, self.name.clone()))
    }

    fn stop(&mut self) {
        self.capturing = false;
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }
}

#[derive(Debug)]
struct StubVideo {
    name: String,
    capturing: bool,
    events: Arc<Mutex<Vec<String>>>,
}

impl VideoCapture for StubVideo {
    fn start(&mut self, _capability: Option<&Capability>) -> MediaResult<LocalTrack> {
        self.capturing = true;
        Ok(LocalTrack::new(MediaKind::Video, self.name.clone()))
    }

    fn stop(&mut self) {
        self.capturing = false;
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn set_capability(&mut self, capability: &Capability) {
        self.events.lock().push(format!("set {capability}"));
    }

    fn change_capture_format(&mut self, capability: &Capability) -> MediaResult<()> {
        self.events.lock().push(format!("format {capability}"));
        Ok(())
    }

    fn switch_device(&mut self, device: &VideoDevice) -> MediaResult<()> {
        self.events.lock().push(format!("switch {device}"));
        Ok(())
    }
}

fn controller() -> (CaptureController, StubBackend) {
    let backend = StubBackend::studio();
    let catalog = DeviceCatalog::new(Box::new(backend.clone()));
    (CaptureController::new(catalog), backend)
}

fn index_of(capture: &CaptureController, id: &str) -> i64 {
    capture
        .catalog()
        .video()
        .items()
        .iter()
        .position(|device| device.id == id)
        .unwrap() as i64
}

// ============================================================================
// Capture Preconditions
// ============================================================================

#[test]
fn test_camera_without_capability_does_not_capture() {
    let (mut capture, _backend) = controller();
    // The front camera reports no capabilities
    assert!(capture.catalog().capabilities().is_empty());

    let error = assert_err!(capture.start_capture(false, true));
    assert!(matches!(error, MediaError::MissingCapability { .. }));
    assert_eq!(capture.video_state(), CaptureState::NotCaptured);
    assert!(capture.video_track().is_none());
}

#[test]
fn test_ndi_captures_without_capability() {
    let (mut capture, _backend) = controller();
    let ndi = index_of(&capture, "ndi-v");
    assert_ok!(capture.select_video(ndi));

    assert_ok!(capture.start_capture(false, true));
    assert_eq!(capture.video_state(), CaptureState::IsCaptured);
    assert!(!capture.is_mirrored());
}

#[test]
fn test_failed_video_does_not_block_audio() {
    let (mut capture, _backend) = controller();
    assert_err!(capture.start_capture(true, true));
    assert_eq!(capture.audio_state(), CaptureState::IsCaptured);
    assert_eq!(capture.video_state(), CaptureState::NotCaptured);
    assert_eq!(capture.captured_tracks().len(), 1);
}

// ============================================================================
// NDI Exclusivity
// ============================================================================

#[test]
fn test_camera_to_ndi_rejected_while_capturing() {
    let (mut capture, backend) = controller();
    let back = index_of(&capture, "back");
    let ndi = index_of(&capture, "ndi-v");
    assert_ok!(capture.select_video(back));
    assert_ok!(capture.start_capture(false, true));

    let error = assert_err!(capture.select_video(ndi));
    assert!(matches!(error, MediaError::NdiSwitchWhileCapturing { .. }));
    assert_eq!(capture.catalog().video().index(), Some(back as usize));
    assert!(!backend.events().iter().any(|e| e.starts_with("switch")));
}

#[test]
fn test_ndi_to_camera_rejected_while_capturing() {
    let (mut capture, _backend) = controller();
    let ndi = index_of(&capture, "ndi-v");
    assert_ok!(capture.select_video(ndi));
    assert_ok!(capture.start_capture(false, true));

    assert_err!(capture.select_video(0));
    assert_err!(capture.switch_video(true));
    assert_eq!(capture.catalog().video().index(), Some(ndi as usize));
}

#[test]
fn test_camera_to_ndi_allowed_when_idle() {
    let (mut capture, _backend) = controller();
    let ndi = index_of(&capture, "ndi-v");
    assert_eq!(assert_ok!(capture.select_video(ndi)), Some(ndi as usize));
    assert!(capture.catalog().video().selected().unwrap().is_ndi());
}

// ============================================================================
// Live Switching
// ============================================================================

#[test]
fn test_live_camera_switch() {
    let (mut capture, backend) = controller();
    let back = index_of(&capture, "back");
    assert_ok!(capture.select_video(back));
    assert_ok!(capture.start_capture(false, true));
    assert!(!capture.is_mirrored());

    assert_ok!(capture.select_video(0));
    assert_eq!(capture.video_state(), CaptureState::IsCaptured);
    assert_eq!(capture.switched_video_device().unwrap().id, "front");
    assert!(capture.is_mirrored());
    assert!(backend.events().contains(&"switch Camera:Front".to_string()));
}

#[test]
fn test_switch_video_skips_ndi_while_capturing() {
    let (mut capture, _backend) = controller();
    let back = index_of(&capture, "back");
    assert_ok!(capture.select_video(back));
    assert_ok!(capture.start_capture(false, true));

    // back -> (ndi skipped) -> front
    assert_eq!(assert_ok!(capture.switch_video(true)), Some(0));
}

#[test]
fn test_capability_change_while_capturing_changes_format() {
    let (mut capture, backend) = controller();
    let back = index_of(&capture, "back");
    assert_ok!(capture.select_video(back));
    assert_ok!(capture.start_capture(false, true));

    assert_eq!(assert_ok!(capture.select_capability(5)), Some(1));
    assert!(backend.events().contains(&"format 1280x720@30fps".to_string()));
}

#[test]
fn test_audio_source_locked_while_capturing() {
    let (mut capture, _backend) = controller();
    assert_ok!(capture.start_capture(true, false));

    let error = assert_err!(capture.select_audio(1));
    assert!(matches!(
        error,
        MediaError::CaptureBusy {
            medium: MediaKind::Audio,
            ..
        }
    ));
    assert_eq!(capture.catalog().audio().index(), Some(0));

    capture.stop_capture(true, false);
    assert_eq!(assert_ok!(capture.select_audio(1)), Some(1));
}

// ============================================================================
// Empty Lists
// ============================================================================

#[test]
fn test_empty_lists_keep_selection() {
    let backend = StubBackend::default();
    let mut capture = CaptureController::new(DeviceCatalog::new(Box::new(backend)));

    assert_eq!(assert_ok!(capture.select_audio(3)), None);
    assert_eq!(assert_ok!(capture.select_video(-1)), None);
    assert_eq!(assert_ok!(capture.select_capability(0)), None);
    assert!(matches!(
        capture.switch_video(true),
        Err(MediaError::EmptyList { .. })
    ));

    let error = assert_err!(capture.start_capture(true, false));
    assert!(matches!(error, MediaError::MissingSource { .. }));
    assert_eq!(capture.audio_state(), CaptureState::NotCaptured);
}

#[test]
fn test_persisted_indices_json_shape() {
    let indices = SelectionIndices {
        video_source: 2,
        capability: 1,
        ..Default::default()
    };
    let value = serde_json::to_value(indices).unwrap();
    assert_eq!(value["video_source"], 2);
    assert_eq!(value["capability"], 1);

    let restored: SelectionIndices = serde_json::from_value(value).unwrap();
    assert_eq!(restored, indices);

    let device = VideoDevice::ndi("ndi-v", "Studio");
    let json = serde_json::to_string(&device).unwrap();
    let back: VideoDevice = serde_json::from_str(&json).unwrap();
    assert!(back.is_ndi());
}
