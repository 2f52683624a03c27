//! Session credentials and transport options

use serde::{Deserialize, Serialize};

/// Credentials used by the publishing session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishCredentials {
    /// Publish API URL
    pub url: String,
    /// Stream name to publish under
    pub stream_name: String,
    /// Publishing token
    pub token: String,
    /// Source ID announced for this publisher
    pub source_id: String,
    /// Whether `source_id` is sent at all
    pub source_id_enabled: bool,
}

impl PublishCredentials {
    /// Source ID to place in publish options.
    ///
    /// Only present when enabled and non-empty.
    pub fn effective_source_id(&self) -> Option<&str> {
        if self.source_id_enabled && !self.source_id.is_empty() {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// Credentials used by the subscribing session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeCredentials {
    /// Subscribe API URL
    pub url: String,
    /// Account that owns the stream
    pub account_id: String,
    /// Stream name to subscribe to
    pub stream_name: String,
    /// Subscribing token, empty for unsecured streams
    pub token: String,
}

/// Which bitrate bound a value applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitrateKind {
    /// Initial encoder bitrate
    Start,
    /// Lower bound
    Min,
    /// Upper bound
    Max,
}

/// Encoder bitrate bounds in kbps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitrateSettings {
    /// Initial bitrate
    pub start_kbps: u32,
    /// Minimum bitrate
    pub min_kbps: u32,
    /// Maximum bitrate
    pub max_kbps: u32,
}

impl Default for BitrateSettings {
    fn default() -> Self {
        Self {
            start_kbps: 300,
            min_kbps: 0,
            max_kbps: 2500,
        }
    }
}

impl BitrateSettings {
    /// Value for one bound
    pub fn get(&self, kind: BitrateKind) -> u32 {
        match kind {
            BitrateKind::Start => self.start_kbps,
            BitrateKind::Min => self.min_kbps,
            BitrateKind::Max => self.max_kbps,
        }
    }

    /// Replace one bound
    pub fn set(&mut self, kind: BitrateKind, kbps: u32) {
        match kind {
            BitrateKind::Start => self.start_kbps = kbps,
            BitrateKind::Min => self.min_kbps = kbps,
            BitrateKind::Max => self.max_kbps = kbps,
        }
    }
}

/// Options handed to the publisher right before publishing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    /// Source ID, when one is announced
    pub source_id: Option<String>,
    /// Preferred audio codec
    pub audio_codec: Option<String>,
    /// Preferred video codec
    pub video_codec: Option<String>,
    /// Encoder bitrate bounds
    pub bitrate: BitrateSettings,
    /// Publish stereo audio
    pub stereo: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            source_id: None,
            audio_codec: None,
            video_codec: None,
            bitrate: BitrateSettings::default(),
            stereo: true,
        }
    }
}

/// Options handed to the subscriber right before subscribing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// Request stereo audio
    pub stereo: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_source_id() {
        let mut creds = PublishCredentials {
            source_id: "cam-a".to_string(),
            ..Default::default()
        };
        assert_eq!(creds.effective_source_id(), None);

        creds.source_id_enabled = true;
        assert_eq!(creds.effective_source_id(), Some("cam-a"));

        creds.source_id.clear();
        assert_eq!(creds.effective_source_id(), None);
    }

    #[test]
    fn test_bitrate_defaults() {
        let mut bitrate = BitrateSettings::default();
        assert_eq!(bitrate.get(BitrateKind::Start), 300);
        assert_eq!(bitrate.get(BitrateKind::Min), 0);
        assert_eq!(bitrate.get(BitrateKind::Max), 2500);

        bitrate.set(BitrateKind::Max, 4000);
        assert_eq!(bitrate.max_kbps, 4000);
    }
}
