//! Remote source registry and projection slots
//!
//! One [`SourceInfo`] per remote source known to the subscribing session,
//! keyed by source id (`""` is the default source of a stream published
//! without an explicit id). Each playout medium has at most one projected
//! source; the slots refer to registry keys and never own entries.

use rtskit_core::{LayerDescriptor, MediaKind, RtsError, RtsResult, SourceTrack};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A remote source and its layer state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Source id, `""` for the default source
    pub source_id: String,
    /// Tracks the source offers
    pub tracks: Vec<SourceTrack>,
    /// Selectable layers, best first
    pub active_layers: Vec<LayerDescriptor>,
    /// Pinned layer, `""` for automatic selection
    pub active_layer_id: String,
}

impl SourceInfo {
    /// A freshly discovered source without layer information
    pub fn new(source_id: impl Into<String>, tracks: Vec<SourceTrack>) -> Self {
        Self {
            source_id: source_id.into(),
            tracks,
            ..Default::default()
        }
    }

    /// Whether this is the default (unnamed) source
    pub fn is_default(&self) -> bool {
        self.source_id.is_empty()
    }

    /// First track of the given medium
    pub fn track(&self, kind: MediaKind) -> Option<&SourceTrack> {
        self.tracks.iter().find(|track| track.kind == kind)
    }

    /// Active layer with the given id
    pub fn layer(&self, layer_id: &str) -> Option<&LayerDescriptor> {
        self.active_layers.iter().find(|layer| layer.id() == layer_id)
    }
}

/// What a removal changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// The removed entry
    pub info: SourceInfo,
    /// Slots that projected the removed source and are now empty
    pub vacated: Vec<MediaKind>,
    /// Source to project onto the vacated slots, if any remain
    pub replacement: Option<String>,
}

/// Copy of the registry for observers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Every known source, in key order
    pub sources: Vec<SourceInfo>,
    /// Source projected onto the audio playout track
    pub projected_audio: Option<String>,
    /// Source projected onto the video playout track
    pub projected_video: Option<String>,
}

impl RegistrySnapshot {
    /// Source with the given id
    pub fn source(&self, source_id: &str) -> Option<&SourceInfo> {
        self.sources.iter().find(|info| info.source_id == source_id)
    }
}

/// Remote sources of the subscribing session
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, SourceInfo>,
    projected_audio: Option<String>,
    projected_video: Option<String>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a source. Never projects it.
    pub fn add_source(&mut self, info: SourceInfo) -> Option<SourceInfo> {
        let id = info.source_id.clone();
        let previous = self.sources.insert(id.clone(), info);
        if previous.is_some() {
            debug!("🔁 Source {:?} re-announced", id);
        } else {
            info!("➕ Source {:?} added ({} known)", id, self.sources.len());
        }
        previous
    }

    /// Remove a source, clearing any slot that projected it.
    ///
    /// The returned [`Removal`] names the first remaining source as the
    /// replacement for vacated slots.
    pub fn remove_source(&mut self, source_id: &str) -> Option<Removal> {
        let info = self.sources.remove(source_id)?;
        let mut vacated = Vec::new();
        if self.projected_audio.as_deref() == Some(source_id) {
            self.projected_audio = None;
            vacated.push(MediaKind::Audio);
        }
        if self.projected_video.as_deref() == Some(source_id) {
            self.projected_video = None;
            vacated.push(MediaKind::Video);
        }
        let replacement = if vacated.is_empty() {
            None
        } else {
            self.first_id().map(str::to_string)
        };
        info!(
            "➖ Source {:?} removed, vacated {:?}, replacement {:?}",
            source_id, vacated, replacement
        );
        Some(Removal {
            info,
            vacated,
            replacement,
        })
    }

    /// Record `source_id` as projected onto `kind`
    pub fn project(&mut self, source_id: &str, kind: MediaKind) -> RtsResult<()> {
        if !self.sources.contains_key(source_id) {
            return Err(RtsError::SourceNotFound {
                source_id: source_id.to_string(),
            });
        }
        let slot = match kind {
            MediaKind::Audio => &mut self.projected_audio,
            MediaKind::Video => &mut self.projected_video,
        };
        *slot = Some(source_id.to_string());
        info!("🎯 Projected source {:?} onto {}", source_id, kind);
        Ok(())
    }

    /// Empty the slot of `kind`
    pub fn unproject(&mut self, kind: MediaKind) -> Option<String> {
        match kind {
            MediaKind::Audio => self.projected_audio.take(),
            MediaKind::Video => self.projected_video.take(),
        }
    }

    /// Source projected onto `kind`
    pub fn projected(&self, kind: MediaKind) -> Option<&str> {
        match kind {
            MediaKind::Audio => self.projected_audio.as_deref(),
            MediaKind::Video => self.projected_video.as_deref(),
        }
    }

    /// Entry of the source projected onto `kind`
    pub fn projected_source(&self, kind: MediaKind) -> Option<&SourceInfo> {
        self.projected(kind).and_then(|id| self.sources.get(id))
    }

    /// Mutable entry of the source projected onto `kind`
    pub fn projected_source_mut(&mut self, kind: MediaKind) -> Option<&mut SourceInfo> {
        let id = match kind {
            MediaKind::Audio => self.projected_audio.as_deref(),
            MediaKind::Video => self.projected_video.as_deref(),
        }?;
        self.sources.get_mut(id)
    }

    /// Replace the layers of a source, keeping the pinned layer if still offered
    pub fn set_layers(&mut self, source_id: &str, layers: Vec<LayerDescriptor>) -> RtsResult<()> {
        let info = self
            .sources
            .get_mut(source_id)
            .ok_or_else(|| RtsError::SourceNotFound {
                source_id: source_id.to_string(),
            })?;
        info.active_layers = layers;
        if !info.active_layer_id.is_empty() && info.layer(&info.active_layer_id).is_none() {
            debug!(
                "Pinned layer {:?} of {:?} no longer offered, back to automatic",
                info.active_layer_id, source_id
            );
            info.active_layer_id.clear();
        }
        Ok(())
    }

    /// Entry for a source
    pub fn get(&self, source_id: &str) -> Option<&SourceInfo> {
        self.sources.get(source_id)
    }

    /// Whether a source is known
    pub fn contains(&self, source_id: &str) -> bool {
        self.sources.contains_key(source_id)
    }

    /// First source in iteration order
    pub fn first_id(&self) -> Option<&str> {
        self.sources.keys().next().map(String::as_str)
    }

    /// Known source ids, in iteration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Number of known sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no source is known
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Forget every source and both projections
    pub fn clear(&mut self) {
        if !self.sources.is_empty() {
            info!("🧹 Clearing {} sources", self.sources.len());
        }
        self.sources.clear();
        self.projected_audio = None;
        self.projected_video = None;
    }

    /// Copy for observers
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            sources: self.sources.values().cloned().collect(),
            projected_audio: self.projected_audio.clone(),
            projected_video: self.projected_video.clone(),
        }
    }
}
