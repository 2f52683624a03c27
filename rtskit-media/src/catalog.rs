//! Device catalog
//!
//! Holds every selectable list of the session and the selected index of each.
//! Audio and video source lists are queried eagerly and on [`DeviceCatalog::refresh`];
//! codec and playback lists are queried on first use and cached.

use crate::backend::MediaBackend;
use crate::devices::{AudioDevice, Capability, CodecName, PlaybackDevice, VideoDevice};
use rtskit_core::CyclicSelection;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Requested index of every selectable list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionIndices {
    /// Audio source index
    pub audio_source: i64,
    /// Video source index
    pub video_source: i64,
    /// Capability index
    pub capability: i64,
    /// Audio codec index
    pub audio_codec: i64,
    /// Video codec index
    pub video_codec: i64,
    /// Playback device index
    pub playback: i64,
}

/// Selectable device, capability, codec and playback lists
#[derive(Debug)]
pub struct DeviceCatalog {
    backend: Box<dyn MediaBackend>,
    audio: CyclicSelection<AudioDevice>,
    video: CyclicSelection<VideoDevice>,
    capabilities: CyclicSelection<Capability>,
    audio_codecs: Option<CyclicSelection<CodecName>>,
    video_codecs: Option<CyclicSelection<CodecName>>,
    playback: Option<CyclicSelection<PlaybackDevice>>,
    pending: SelectionIndices,
}

impl DeviceCatalog {
    /// Create a catalog with every index at 0
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self::with_indices(backend, SelectionIndices::default())
    }

    /// Create a catalog restoring previously persisted indices
    pub fn with_indices(backend: Box<dyn MediaBackend>, indices: SelectionIndices) -> Self {
        let audio = CyclicSelection::with_index(backend.audio_devices(), indices.audio_source);
        let video = CyclicSelection::with_index(backend.video_devices(), indices.video_source);
        let mut catalog = Self {
            backend,
            audio,
            video,
            capabilities: CyclicSelection::default(),
            audio_codecs: None,
            video_codecs: None,
            playback: None,
            pending: indices,
        };
        catalog.reload_capabilities(indices.capability);
        debug!(
            "📋 Catalog ready: {} audio, {} video, {} capabilities",
            catalog.audio.len(),
            catalog.video.len(),
            catalog.capabilities.len()
        );
        catalog
    }

    /// Re-query audio and video sources and re-clamp every index
    pub fn refresh(&mut self) {
        let audio = self.audio.set_items(self.backend.audio_devices());
        let video = self.video.set_items(self.backend.video_devices());
        let capability = self.capabilities.stored_index() as i64;
        self.reload_capabilities(capability);
        debug!(
            "🔄 Catalog refreshed: audio {:?}/{}, video {:?}/{}",
            audio,
            self.audio.len(),
            video,
            self.video.len()
        );
    }

    fn reload_capabilities(&mut self, requested: i64) {
        let items = match self.video.selected() {
            Some(device) => self.backend.capabilities(device),
            None => Vec::new(),
        };
        self.capabilities = CyclicSelection::with_index(items, requested);
    }

    /// Audio source list
    pub fn audio(&self) -> &CyclicSelection<AudioDevice> {
        &self.audio
    }

    /// Video source list
    pub fn video(&self) -> &CyclicSelection<VideoDevice> {
        &self.video
    }

    /// Capability list of the selected video source
    pub fn capabilities(&self) -> &CyclicSelection<Capability> {
        &self.capabilities
    }

    /// Audio codec list, queried on first use
    pub fn audio_codecs(&mut self) -> &CyclicSelection<CodecName> {
        let requested = self.pending.audio_codec;
        let backend = &self.backend;
        self.audio_codecs.get_or_insert_with(|| {
            debug!("📋 Loading audio codecs");
            CyclicSelection::with_index(backend.audio_codecs(), requested)
        })
    }

    /// Video codec list, queried on first use
    pub fn video_codecs(&mut self) -> &CyclicSelection<CodecName> {
        let requested = self.pending.video_codec;
        let backend = &self.backend;
        self.video_codecs.get_or_insert_with(|| {
            debug!("📋 Loading video codecs");
            CyclicSelection::with_index(backend.video_codecs(), requested)
        })
    }

    /// Playback device list, queried on first use
    pub fn playback(&mut self) -> &CyclicSelection<PlaybackDevice> {
        let requested = self.pending.playback;
        let backend = &self.backend;
        self.playback.get_or_insert_with(|| {
            debug!("📋 Loading playback devices");
            CyclicSelection::with_index(backend.playback_devices(), requested)
        })
    }

    /// Select an audio source
    pub fn select_audio(&mut self, requested: i64) -> Option<usize> {
        self.audio.select(requested)
    }

    /// Select a video source, re-deriving the capability list from it
    pub fn select_video(&mut self, requested: i64) -> Option<usize> {
        let index = self.video.select(requested)?;
        let capability = self.capabilities.stored_index() as i64;
        self.reload_capabilities(capability);
        Some(index)
    }

    /// Select a capability of the current video source
    pub fn select_capability(&mut self, requested: i64) -> Option<usize> {
        self.capabilities.select(requested)
    }

    /// Select an audio codec
    pub fn select_audio_codec(&mut self, requested: i64) -> Option<usize> {
        self.audio_codecs();
        let index = self.audio_codecs.as_mut()?.select(requested)?;
        self.pending.audio_codec = index as i64;
        Some(index)
    }

    /// Select a video codec
    pub fn select_video_codec(&mut self, requested: i64) -> Option<usize> {
        self.video_codecs();
        let index = self.video_codecs.as_mut()?.select(requested)?;
        self.pending.video_codec = index as i64;
        Some(index)
    }

    /// Select a playback device
    pub fn select_playback(&mut self, requested: i64) -> Option<usize> {
        self.playback();
        let index = self.playback.as_mut()?.select(requested)?;
        self.pending.playback = index as i64;
        Some(index)
    }

    /// Step to the next or previous audio codec, wrapping around
    pub fn switch_audio_codec(&mut self, ascending: bool) -> Option<usize> {
        let next = self.audio_codecs().next(ascending)?;
        self.select_audio_codec(next as i64)
    }

    /// Step to the next or previous video codec, wrapping around
    pub fn switch_video_codec(&mut self, ascending: bool) -> Option<usize> {
        let next = self.video_codecs().next(ascending)?;
        self.select_video_codec(next as i64)
    }

    /// Step to the next or previous playback device, wrapping around
    pub fn switch_playback(&mut self, ascending: bool) -> Option<usize> {
        let next = self.playback().next(ascending)?;
        self.select_playback(next as i64)
    }

    /// Selected audio codec name
    pub fn selected_audio_codec(&mut self) -> Option<CodecName> {
        self.audio_codecs().selected().cloned()
    }

    /// Selected video codec name
    pub fn selected_video_codec(&mut self) -> Option<CodecName> {
        self.video_codecs().selected().cloned()
    }

    /// Selected playback device
    pub fn selected_playback(&mut self) -> Option<PlaybackDevice> {
        self.playback().selected().cloned()
    }

    /// Every selected index, for persistence
    pub fn indices(&self) -> SelectionIndices {
        SelectionIndices {
            audio_source: self.audio.stored_index() as i64,
            video_source: self.video.stored_index() as i64,
            capability: self.capabilities.stored_index() as i64,
            audio_codec: stored_or(&self.audio_codecs, self.pending.audio_codec),
            video_codec: stored_or(&self.video_codecs, self.pending.video_codec),
            playback: stored_or(&self.playback, self.pending.playback),
        }
    }

    /// Platform backend
    pub fn backend_mut(&mut self) -> &mut dyn MediaBackend {
        self.backend.as_mut()
    }
}

fn stored_or<T>(selection: &Option<CyclicSelection<T>>, fallback: i64) -> i64 {
    selection
        .as_ref()
        .map_or(fallback, |selection| selection.stored_index() as i64)
}
