//! Track, layer and projection value types shared with the transport

use crate::state::MediaKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// A locally captured track handed to the publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTrack {
    /// Track ID
    id: Uuid,
    /// Track kind (audio/video)
    kind: MediaKind,
    /// Name of the device feeding the track
    device_name: String,
}

impl LocalTrack {
    /// Create a new local track for a capturing device
    pub fn new(kind: MediaKind, device_name: impl Into<String>) -> Self {
        let track = Self {
            id: Uuid::new_v4(),
            kind,
            device_name: device_name.into(),
        };
        debug!(
            "🎙️ Created local {} track {} for {}",
            track.kind, track.id, track.device_name
        );
        track
    }

    /// Get track ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get track kind
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Get the feeding device name
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// A playout track created by the subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    /// Track ID assigned by the transport
    pub id: String,
    /// Track kind (audio/video)
    pub kind: MediaKind,
}

impl RemoteTrack {
    /// Create a remote track
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// A track offered by a remote source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTrack {
    /// Media carried by the track
    pub kind: MediaKind,
    /// Track ID inside the source
    pub track_id: String,
}

impl SourceTrack {
    /// Create an audio track entry
    pub fn audio(track_id: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Audio,
            track_id: track_id.into(),
        }
    }

    /// Create a video track entry
    pub fn video(track_id: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Video,
            track_id: track_id.into(),
        }
    }
}

/// One simulcast / SVC layer reported for a video media id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Simulcast encoding id ("h", "m", "l"), empty for SVC-only layers
    pub encoding_id: String,
    /// Spatial layer, if the encoding is scalable
    pub spatial_layer_id: Option<u32>,
    /// Temporal layer, if the encoding is scalable
    pub temporal_layer_id: Option<u32>,
    /// Highest spatial layer to forward
    pub max_spatial_layer_id: Option<u32>,
    /// Highest temporal layer to forward
    pub max_temporal_layer_id: Option<u32>,
}

impl LayerDescriptor {
    /// Simulcast layer identified only by its encoding id
    pub fn simulcast(encoding_id: impl Into<String>) -> Self {
        Self {
            encoding_id: encoding_id.into(),
            ..Default::default()
        }
    }

    /// Stable identifier used for layer selection.
    ///
    /// Encoding id when present, otherwise `S<spatial>T<temporal>`.
    pub fn id(&self) -> String {
        if !self.encoding_id.is_empty() {
            return self.encoding_id.clone();
        }
        let mut id = String::new();
        if let Some(spatial) = self.spatial_layer_id {
            id.push_str(&format!("S{spatial}"));
        }
        if let Some(temporal) = self.temporal_layer_id {
            id.push_str(&format!("T{temporal}"));
        }
        id
    }
}

impl fmt::Display for LayerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layer({})", self.id())?;
        if let (Some(spatial), Some(temporal)) = (self.max_spatial_layer_id, self.max_temporal_layer_id)
        {
            write!(f, " max S{spatial}T{temporal}")?;
        }
        Ok(())
    }
}

/// Maps one track of a remote source onto a local playout media id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionData {
    /// Track ID inside the remote source
    pub track_id: String,
    /// Media kind of the track
    pub media: MediaKind,
    /// Media id of the local playout track
    pub mid: String,
    /// Layer to forward, `None` for automatic selection
    pub layer: Option<LayerDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_track_ids_are_unique() {
        let a = LocalTrack::new(MediaKind::Audio, "mic");
        let b = LocalTrack::new(MediaKind::Audio, "mic");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.kind(), MediaKind::Audio);
        assert_eq!(a.device_name(), "mic");
    }

    #[test]
    fn test_layer_id() {
        assert_eq!(LayerDescriptor::simulcast("h").id(), "h");

        let svc = LayerDescriptor {
            spatial_layer_id: Some(2),
            temporal_layer_id: Some(1),
            ..Default::default()
        };
        assert_eq!(svc.id(), "S2T1");
        assert_eq!(LayerDescriptor::default().id(), "");
    }
}
