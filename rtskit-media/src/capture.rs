//! Local capture control
//!
//! [`CaptureController`] owns the [`DeviceCatalog`], one capture handle per
//! medium and the capture state machine of each medium.
//!
//! While video is capturing, selecting another video device switches the live
//! capture in place, and selecting another capability changes the live
//! format. A live switch never involves an NDI source: NDI capture has to be
//! stopped before moving to or from it.

use crate::backend::{AudioCapture, VideoCapture};
use crate::catalog::DeviceCatalog;
use crate::devices::VideoDevice;
use crate::error::{MediaError, MediaResult};
use rtskit_core::{CaptureState, LocalTrack, MediaKind};
use tracing::{debug, info, warn};

/// Audio and video capture of the local device
#[derive(Debug)]
pub struct CaptureController {
    catalog: DeviceCatalog,
    audio_state: CaptureState,
    video_state: CaptureState,
    audio_source: Option<Box<dyn AudioCapture>>,
    video_source: Option<Box<dyn VideoCapture>>,
    audio_track: Option<LocalTrack>,
    video_track: Option<LocalTrack>,
    /// Device a live capture was switched to, if any
    switched_video: Option<VideoDevice>,
    mirrored: bool,
}

impl CaptureController {
    /// Create a controller, opening handles for the selected sources
    pub fn new(catalog: DeviceCatalog) -> Self {
        let mut controller = Self {
            catalog,
            audio_state: CaptureState::NotCaptured,
            video_state: CaptureState::NotCaptured,
            audio_source: None,
            video_source: None,
            audio_track: None,
            video_track: None,
            switched_video: None,
            mirrored: false,
        };
        controller.derive_audio_source();
        controller.derive_video_source();
        controller
    }

    /// Device catalog
    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Device catalog, for codec and playback lists
    pub fn catalog_mut(&mut self) -> &mut DeviceCatalog {
        &mut self.catalog
    }

    /// Audio capture state
    pub fn audio_state(&self) -> CaptureState {
        self.audio_state
    }

    /// Video capture state
    pub fn video_state(&self) -> CaptureState {
        self.video_state
    }

    /// Capture state of one medium
    pub fn state(&self, kind: MediaKind) -> CaptureState {
        match kind {
            MediaKind::Audio => self.audio_state,
            MediaKind::Video => self.video_state,
        }
    }

    /// Whether audio is being captured
    pub fn is_audio_captured(&self) -> bool {
        self.audio_state == CaptureState::IsCaptured
    }

    /// Whether video is being captured
    pub fn is_video_captured(&self) -> bool {
        self.video_state == CaptureState::IsCaptured
    }

    /// Track of the running audio capture
    pub fn audio_track(&self) -> Option<&LocalTrack> {
        self.audio_track.as_ref()
    }

    /// Track of the running video capture
    pub fn video_track(&self) -> Option<&LocalTrack> {
        self.video_track.as_ref()
    }

    /// Every track of a running capture, audio first
    pub fn captured_tracks(&self) -> Vec<LocalTrack> {
        self.audio_track
            .iter()
            .chain(self.video_track.iter())
            .cloned()
            .collect()
    }

    /// Device feeding the video capture
    pub fn active_video_device(&self) -> Option<&VideoDevice> {
        self.switched_video
            .as_ref()
            .or_else(|| self.catalog.video().selected())
    }

    /// Device a live capture was switched to
    pub fn switched_video_device(&self) -> Option<&VideoDevice> {
        self.switched_video.as_ref()
    }

    /// Whether the local preview is mirrored
    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Flip the preview mirroring, returning the new value
    pub fn toggle_mirror(&mut self) -> bool {
        self.set_mirrored(!self.mirrored);
        self.mirrored
    }

    /// Set the preview mirroring
    pub fn set_mirrored(&mut self, mirrored: bool) {
        if self.mirrored != mirrored {
            debug!("🪞 Preview mirrored: {}", mirrored);
        }
        self.mirrored = mirrored;
    }

    fn apply_mirroring(&mut self) {
        let mirror = self
            .active_video_device()
            .is_some_and(VideoDevice::should_mirror);
        self.set_mirrored(mirror);
    }

    fn set_audio_state(&mut self, next: CaptureState) {
        debug_assert!(self.audio_state == next || self.audio_state.can_transition_to(next));
        if self.audio_state != next {
            info!("🎙️ Audio capture: {} -> {}", self.audio_state, next);
            self.audio_state = next;
        }
    }

    fn set_video_state(&mut self, next: CaptureState) {
        debug_assert!(self.video_state == next || self.video_state.can_transition_to(next));
        if self.video_state != next {
            info!("📹 Video capture: {} -> {}", self.video_state, next);
            self.video_state = next;
        }
    }

    fn derive_audio_source(&mut self) {
        self.audio_source = None;
        let Some(device) = self.catalog.audio().selected().cloned() else {
            debug!("No audio source selected, no handle opened");
            return;
        };
        match self.catalog.backend_mut().open_audio(&device) {
            Ok(source) => {
                debug!("🎙️ Opened audio handle for {}", device);
                self.audio_source = Some(source);
            }
            Err(e) => warn!("Failed to open audio handle for {}: {}", device, e),
        }
    }

    fn derive_video_source(&mut self) {
        self.video_source = None;
        let Some(device) = self.catalog.video().selected().cloned() else {
            debug!("No video source selected, no handle opened");
            return;
        };
        match self.catalog.backend_mut().open_video(&device) {
            Ok(mut source) => {
                if let Some(capability) = self.catalog.capabilities().selected() {
                    source.set_capability(capability);
                }
                debug!("📹 Opened video handle for {}", device);
                self.video_source = Some(source);
            }
            Err(e) => warn!("Failed to open video handle for {}: {}", device, e),
        }
    }

    /// Select the audio source. Rejected while audio is capturing.
    ///
    /// Returns `Ok(None)` without changing anything when no audio source exists.
    pub fn select_audio(&mut self, requested: i64) -> MediaResult<Option<usize>> {
        if self.audio_state != CaptureState::NotCaptured {
            warn!("Rejecting audio source change while audio is capturing");
            return Err(MediaError::CaptureBusy {
                medium: MediaKind::Audio,
                operation: "change audio source".to_string(),
            });
        }
        let Some(index) = self.catalog.select_audio(requested) else {
            warn!("No audio sources available, keeping selection");
            return Ok(None);
        };
        self.derive_audio_source();
        if let Some(device) = self.catalog.audio().selected() {
            info!("🎙️ Audio source set to {} ({})", device, index);
        }
        Ok(Some(index))
    }

    /// Select the video source.
    ///
    /// While video is capturing the live capture is switched to the new
    /// device; NDI sources on either side of such a switch are rejected.
    pub fn select_video(&mut self, requested: i64) -> MediaResult<Option<usize>> {
        let Some(target) = self.catalog.video().resolve(requested) else {
            warn!("No video sources available, keeping selection");
            return Ok(None);
        };

        if self.video_state == CaptureState::NotCaptured {
            self.catalog.select_video(target as i64);
            self.derive_video_source();
            if let Some(device) = self.catalog.video().selected() {
                info!("📹 Video source set to {} ({})", device, target);
            }
            return Ok(Some(target));
        }

        if self.catalog.video().index() == Some(target) {
            debug!("Video source {} already active", target);
            return Ok(Some(target));
        }
        self.check_live_switch(target)?;

        let device = self
            .catalog
            .video()
            .get(target)
            .cloned()
            .ok_or_else(|| MediaError::DeviceNotFound {
                device_id: target.to_string(),
            })?;
        let source = self.video_source.as_mut().ok_or(MediaError::MissingSource {
            medium: MediaKind::Video,
        })?;
        if let Err(e) = source.switch_device(&device) {
            warn!("❌ Camera switch to {} failed: {}", device, e);
            return Err(match e {
                e @ MediaError::SwitchFailed { .. } => e,
                other => MediaError::SwitchFailed {
                    device: device.to_string(),
                    reason: other.to_string(),
                },
            });
        }
        info!("🔁 Camera switch done: {}", device);

        self.catalog.select_video(target as i64);
        self.switched_video = Some(device);
        if let Some(capability) = self.catalog.capabilities().selected().copied() {
            if let Some(source) = self.video_source.as_mut() {
                if let Err(e) = source.change_capture_format(&capability) {
                    warn!("Failed to re-apply {} after camera switch: {}", capability, e);
                }
            }
        }
        self.apply_mirroring();
        Ok(Some(target))
    }

    fn check_live_switch(&self, target: usize) -> MediaResult<()> {
        let current = self.active_video_device();
        let next = self.catalog.video().get(target);
        if current.is_some_and(VideoDevice::is_ndi) || next.is_some_and(VideoDevice::is_ndi) {
            let from = current.map(ToString::to_string).unwrap_or_default();
            let to = next.map(ToString::to_string).unwrap_or_default();
            warn!("Rejecting live video switch {} -> {} (NDI)", from, to);
            return Err(MediaError::NdiSwitchWhileCapturing { from, to });
        }
        Ok(())
    }

    /// Select the capability of the current video source.
    ///
    /// While video is capturing the live format is changed instead.
    pub fn select_capability(&mut self, requested: i64) -> MediaResult<Option<usize>> {
        let Some(index) = self.catalog.capabilities().resolve(requested) else {
            warn!("No capabilities available, keeping selection");
            return Ok(None);
        };
        let Some(capability) = self.catalog.capabilities().get(index).copied() else {
            return Ok(None);
        };
        if let Some(source) = self.video_source.as_mut() {
            if self.video_state == CaptureState::IsCaptured {
                source.change_capture_format(&capability)?;
            } else {
                source.set_capability(&capability);
            }
        }
        self.catalog.select_capability(index as i64);
        info!("📐 Capability set to {} ({})", capability, index);
        Ok(Some(index))
    }

    /// Step to the next or previous audio source
    pub fn switch_audio(&mut self, ascending: bool) -> MediaResult<Option<usize>> {
        let next = self
            .catalog
            .audio()
            .next(ascending)
            .ok_or_else(|| MediaError::empty("audio sources"))?;
        self.select_audio(next as i64)
    }

    /// Step to the next or previous video source.
    ///
    /// While video is capturing NDI sources are skipped, and a running NDI
    /// capture cannot be switched at all.
    pub fn switch_video(&mut self, ascending: bool) -> MediaResult<Option<usize>> {
        let video = self.catalog.video();
        let next = if self.video_state == CaptureState::NotCaptured {
            video
                .next(ascending)
                .ok_or_else(|| MediaError::empty("video sources"))?
        } else {
            if let Some(current) = video.selected().filter(|device| device.is_ndi()) {
                warn!("Rejecting live switch away from NDI source {}", current);
                return Err(MediaError::NdiSwitchWhileCapturing {
                    from: current.to_string(),
                    to: "next video source".to_string(),
                });
            }
            video
                .next_matching(ascending, |device| !device.is_ndi())
                .ok_or_else(|| MediaError::empty("non-NDI video sources"))?
        };
        self.select_video(next as i64)
    }

    /// Step to the next or previous capability
    pub fn switch_capability(&mut self, ascending: bool) -> MediaResult<Option<usize>> {
        let next = self
            .catalog
            .capabilities()
            .next(ascending)
            .ok_or_else(|| MediaError::empty("capabilities"))?;
        self.select_capability(next as i64)
    }

    /// Start capturing the requested media.
    ///
    /// Already capturing media are left alone. Both media are attempted; the
    /// first failure is returned.
    pub fn start_capture(&mut self, audio: bool, video: bool) -> MediaResult<()> {
        let audio_result = if audio { self.start_audio() } else { Ok(()) };
        let video_result = if video { self.start_video() } else { Ok(()) };
        audio_result.and(video_result)
    }

    fn start_audio(&mut self) -> MediaResult<()> {
        if self.audio_state == CaptureState::IsCaptured {
            debug!("Audio already capturing");
            return Ok(());
        }
        self.set_audio_state(CaptureState::TryCapture);
        if self.audio_source.is_none() {
            self.derive_audio_source();
        }
        let result = match self.audio_source.as_mut() {
            Some(source) => source.start(),
            None => {
                warn!("Cannot capture audio: no audio source");
                Err(MediaError::MissingSource {
                    medium: MediaKind::Audio,
                })
            }
        };
        match result {
            Ok(track) => {
                self.audio_track = Some(track);
                self.set_audio_state(CaptureState::IsCaptured);
                Ok(())
            }
            Err(e) => {
                warn!("Audio capture failed: {}", e);
                self.set_audio_state(CaptureState::NotCaptured);
                Err(e)
            }
        }
    }

    fn start_video(&mut self) -> MediaResult<()> {
        if self.video_state == CaptureState::IsCaptured {
            debug!("Video already capturing");
            return Ok(());
        }
        self.set_video_state(CaptureState::TryCapture);
        if self.video_source.is_none() {
            self.derive_video_source();
        }
        let device = self
            .catalog
            .video()
            .selected()
            .cloned()
            .filter(|_| self.video_source.is_some());
        let Some(device) = device else {
            warn!("Cannot capture video: no video source");
            self.set_video_state(CaptureState::NotCaptured);
            return Err(MediaError::MissingSource {
                medium: MediaKind::Video,
            });
        };
        let capability = self.catalog.capabilities().selected().copied();
        if capability.is_none() && !device.is_ndi() {
            warn!("Cannot capture video from {}: no capability", device);
            self.set_video_state(CaptureState::NotCaptured);
            return Err(MediaError::MissingCapability {
                device: device.to_string(),
            });
        }

        let result = match self.video_source.as_mut() {
            Some(source) => source.start(capability.as_ref()),
            None => Err(MediaError::MissingSource {
                medium: MediaKind::Video,
            }),
        };
        match result {
            Ok(track) => {
                self.video_track = Some(track);
                self.set_video_state(CaptureState::IsCaptured);
                self.apply_mirroring();
                info!(
                    "📹 Capturing {} at {}",
                    device,
                    capability.map_or_else(|| "source format".to_string(), |c| c.to_string())
                );
                Ok(())
            }
            Err(e) => {
                warn!("Video capture failed: {}", e);
                self.set_video_state(CaptureState::NotCaptured);
                Err(e)
            }
        }
    }

    /// Stop capturing the requested media.
    ///
    /// The handle is released and a fresh one is opened from the current
    /// selection for the next start.
    pub fn stop_capture(&mut self, audio: bool, video: bool) {
        if audio {
            self.stop_audio();
        }
        if video {
            self.stop_video();
        }
    }

    fn stop_audio(&mut self) {
        if self.audio_state == CaptureState::NotCaptured {
            debug!("Audio not capturing, nothing to stop");
            return;
        }
        if let Some(mut source) = self.audio_source.take() {
            source.stop();
        }
        self.audio_track = None;
        self.set_audio_state(CaptureState::NotCaptured);
        self.derive_audio_source();
    }

    fn stop_video(&mut self) {
        if self.video_state == CaptureState::NotCaptured {
            debug!("Video not capturing, nothing to stop");
            return;
        }
        if let Some(mut source) = self.video_source.take() {
            source.stop();
        }
        self.video_track = None;
        self.switched_video = None;
        self.set_mirrored(false);
        self.set_video_state(CaptureState::NotCaptured);
        self.derive_video_source();
    }

    /// Re-query device lists; idle handles are re-opened from the new selection
    pub fn refresh_devices(&mut self) {
        self.catalog.refresh();
        if self.audio_state == CaptureState::NotCaptured {
            self.derive_audio_source();
        }
        if self.video_state == CaptureState::NotCaptured {
            self.derive_video_source();
        }
    }

    /// Stop every capture
    pub fn release(&mut self) {
        self.stop_capture(true, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMediaBackend;

    fn controller() -> (CaptureController, FakeMediaBackend) {
        let media = FakeMediaBackend::standard();
        let catalog = DeviceCatalog::new(Box::new(media.clone()));
        (CaptureController::new(catalog), media)
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut capture, media) = controller();
        capture.start_capture(true, false).unwrap();
        capture.start_capture(true, false).unwrap();
        assert_eq!(capture.audio_state(), CaptureState::IsCaptured);
        assert_eq!(media.inspect(|s| s.started.len()), 1);
    }

    #[test]
    fn test_stop_opens_fresh_handle() {
        let (mut capture, media) = controller();
        let opened = media.inspect(|s| s.video_opened);
        capture.start_capture(false, true).unwrap();
        capture.stop_capture(false, true);
        assert_eq!(capture.video_state(), CaptureState::NotCaptured);
        assert!(capture.video_track().is_none());
        assert_eq!(media.inspect(|s| s.video_opened), opened + 1);
    }

    #[test]
    fn test_front_camera_is_mirrored() {
        let (mut capture, _media) = controller();
        capture.start_capture(false, true).unwrap();
        assert!(capture.is_mirrored());
        capture.stop_capture(false, true);
        assert!(!capture.is_mirrored());
    }
}
