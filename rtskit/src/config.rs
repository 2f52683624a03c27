//! Configuration types, defaults and persisted settings

use parking_lot::Mutex;
use rtskit_core::{BitrateSettings, PublishCredentials, RtsError, RtsResult, SubscribeCredentials};
use rtskit_media::SelectionIndices;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default publish API endpoint
pub const DEFAULT_PUBLISH_URL: &str = "https://director.millicast.com/api/director/publish";

/// Default subscribe API endpoint
pub const DEFAULT_SUBSCRIBE_URL: &str = "https://director.millicast.com/api/director/subscribe";

/// Session-wide configuration and compiled-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default publish URL
    pub url_publish: String,
    /// Default subscribe URL
    pub url_subscribe: String,
    /// Default account id
    pub account_id: String,
    /// Default stream name for publishing
    pub stream_name_publish: String,
    /// Default stream name for subscribing
    pub stream_name_subscribe: String,
    /// Default publishing token
    pub token_publish: String,
    /// Default subscribing token
    pub token_subscribe: String,
    /// Default publisher source id
    pub source_id_publish: String,
    /// Whether the publisher source id is sent by default
    pub source_id_publish_enabled: bool,
    /// Default encoder bitrate bounds
    pub bitrate: BitrateSettings,
    /// Statistics interval while publishing or subscribing
    pub stats_interval_ms: u64,
    /// Number of statistics reports kept per side
    pub stats_history: usize,
    /// Start publishing as soon as the publisher connects
    pub auto_publish_on_connect: bool,
    /// Start subscribing as soon as the subscriber connects
    pub auto_subscribe_on_connect: bool,
    /// Project newly discovered sources onto empty playout slots
    pub auto_project_sources: bool,
    /// NDI output name for subscribed audio
    pub ndi_audio_name: String,
    /// NDI output name for subscribed video
    pub ndi_video_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url_publish: DEFAULT_PUBLISH_URL.to_string(),
            url_subscribe: DEFAULT_SUBSCRIBE_URL.to_string(),
            account_id: String::new(),
            stream_name_publish: String::new(),
            stream_name_subscribe: String::new(),
            token_publish: String::new(),
            token_subscribe: String::new(),
            source_id_publish: String::new(),
            source_id_publish_enabled: false,
            bitrate: BitrateSettings::default(),
            stats_interval_ms: 10_000,
            stats_history: 32,
            auto_publish_on_connect: true,
            auto_subscribe_on_connect: true,
            auto_project_sources: false,
            ndi_audio_name: "Millicast-AND-Audio".to_string(),
            ndi_video_name: "Millicast-AND-Video".to_string(),
        }
    }
}

impl SessionConfig {
    /// Compiled-in publish credentials
    pub fn publish_credentials(&self) -> PublishCredentials {
        PublishCredentials {
            url: self.url_publish.clone(),
            stream_name: self.stream_name_publish.clone(),
            token: self.token_publish.clone(),
            source_id: self.source_id_publish.clone(),
            source_id_enabled: self.source_id_publish_enabled,
        }
    }

    /// Compiled-in subscribe credentials
    pub fn subscribe_credentials(&self) -> SubscribeCredentials {
        SubscribeCredentials {
            url: self.url_subscribe.clone(),
            account_id: self.account_id.clone(),
            stream_name: self.stream_name_subscribe.clone(),
            token: self.token_subscribe.clone(),
        }
    }

    /// Compiled-in value of a persisted key
    pub fn default_value(&self, key: SettingKey) -> SettingValue {
        use SettingKey::*;
        match key {
            AccountId => SettingValue::Text(self.account_id.clone()),
            StreamNamePublish => SettingValue::Text(self.stream_name_publish.clone()),
            StreamNameSubscribe => SettingValue::Text(self.stream_name_subscribe.clone()),
            TokenPublish => SettingValue::Text(self.token_publish.clone()),
            TokenSubscribe => SettingValue::Text(self.token_subscribe.clone()),
            UrlPublish => SettingValue::Text(self.url_publish.clone()),
            UrlSubscribe => SettingValue::Text(self.url_subscribe.clone()),
            SourceIdPublish => SettingValue::Text(self.source_id_publish.clone()),
            SourceIdPublishEnabled => SettingValue::Bool(self.source_id_publish_enabled),
            AudioSourceIndex | VideoSourceIndex | CapabilityIndex | AudioCodecIndex
            | VideoCodecIndex | PlaybackIndex => SettingValue::Integer(0),
        }
    }
}

/// Where a credential value is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSource {
    /// Value applied to the live session
    Current,
    /// Value saved in the settings store
    Stored,
    /// Compiled-in default
    Default,
}

/// Keys recognised by the settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SettingKey {
    /// Subscribe account id
    #[serde(rename = "ACCOUNT_ID")]
    AccountId,
    /// Publish stream name
    #[serde(rename = "STREAM_NAME_PUB")]
    StreamNamePublish,
    /// Subscribe stream name
    #[serde(rename = "STREAM_NAME_SUB")]
    StreamNameSubscribe,
    /// Publish token
    #[serde(rename = "TOKEN_PUB")]
    TokenPublish,
    /// Subscribe token
    #[serde(rename = "TOKEN_SUB")]
    TokenSubscribe,
    /// Publish URL
    #[serde(rename = "URL_PUB")]
    UrlPublish,
    /// Subscribe URL
    #[serde(rename = "URL_SUB")]
    UrlSubscribe,
    /// Publisher source id
    #[serde(rename = "SOURCE_ID_PUB")]
    SourceIdPublish,
    /// Whether the publisher source id is sent
    #[serde(rename = "SOURCE_ID_PUB_ENABLED")]
    SourceIdPublishEnabled,
    /// Selected audio source
    #[serde(rename = "AUDIO_SOURCE_INDEX")]
    AudioSourceIndex,
    /// Selected video source
    #[serde(rename = "VIDEO_SOURCE_INDEX")]
    VideoSourceIndex,
    /// Selected capability
    #[serde(rename = "CAPABILITY_INDEX")]
    CapabilityIndex,
    /// Selected audio codec
    #[serde(rename = "AUDIO_CODEC_INDEX")]
    AudioCodecIndex,
    /// Selected video codec
    #[serde(rename = "VIDEO_CODEC_INDEX")]
    VideoCodecIndex,
    /// Selected playback device
    #[serde(rename = "PLAYBACK_INDEX")]
    PlaybackIndex,
}

impl SettingKey {
    /// Every recognised key
    pub const ALL: [SettingKey; 15] = [
        SettingKey::AccountId,
        SettingKey::StreamNamePublish,
        SettingKey::StreamNameSubscribe,
        SettingKey::TokenPublish,
        SettingKey::TokenSubscribe,
        SettingKey::UrlPublish,
        SettingKey::UrlSubscribe,
        SettingKey::SourceIdPublish,
        SettingKey::SourceIdPublishEnabled,
        SettingKey::AudioSourceIndex,
        SettingKey::VideoSourceIndex,
        SettingKey::CapabilityIndex,
        SettingKey::AudioCodecIndex,
        SettingKey::VideoCodecIndex,
        SettingKey::PlaybackIndex,
    ];

    /// Stable name used in persisted files
    pub fn name(&self) -> &'static str {
        use SettingKey::*;
        match self {
            AccountId => "ACCOUNT_ID",
            StreamNamePublish => "STREAM_NAME_PUB",
            StreamNameSubscribe => "STREAM_NAME_SUB",
            TokenPublish => "TOKEN_PUB",
            TokenSubscribe => "TOKEN_SUB",
            UrlPublish => "URL_PUB",
            UrlSubscribe => "URL_SUB",
            SourceIdPublish => "SOURCE_ID_PUB",
            SourceIdPublishEnabled => "SOURCE_ID_PUB_ENABLED",
            AudioSourceIndex => "AUDIO_SOURCE_INDEX",
            VideoSourceIndex => "VIDEO_SOURCE_INDEX",
            CapabilityIndex => "CAPABILITY_INDEX",
            AudioCodecIndex => "AUDIO_CODEC_INDEX",
            VideoCodecIndex => "VIDEO_CODEC_INDEX",
            PlaybackIndex => "PLAYBACK_INDEX",
        }
    }

    /// Look a key up by its stable name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }

    /// Whether the key guards the publishing session
    pub fn is_publish_credential(&self) -> bool {
        use SettingKey::*;
        matches!(
            self,
            StreamNamePublish | TokenPublish | UrlPublish | SourceIdPublish | SourceIdPublishEnabled
        )
    }

    /// Whether the key guards the subscribing session
    pub fn is_subscribe_credential(&self) -> bool {
        use SettingKey::*;
        matches!(
            self,
            AccountId | StreamNameSubscribe | TokenSubscribe | UrlSubscribe
        )
    }

    /// Whether the key holds a list selection index
    pub fn is_selection_index(&self) -> bool {
        !self.is_publish_credential() && !self.is_subscribe_credential()
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A persisted value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Flag
    Bool(bool),
    /// Index
    Integer(i64),
    /// Text
    Text(String),
}

impl SettingValue {
    /// Text content, if this is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Flag content, if this is a flag
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Integer content, if this is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Integer(value)
    }
}

/// Durable key/value storage for session settings
pub trait SettingsStore: Send + fmt::Debug {
    /// Stored value of a key
    fn get(&self, key: SettingKey) -> Option<SettingValue>;

    /// Store a value
    fn set(&mut self, key: SettingKey, value: SettingValue) -> RtsResult<()>;

    /// Stored text, or `default`
    fn text_or(&self, key: SettingKey, default: &str) -> String {
        self.get(key)
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    /// Stored flag, or `default`
    fn flag_or(&self, key: SettingKey, default: bool) -> bool {
        self.get(key)
            .and_then(|value| value.as_bool())
            .unwrap_or(default)
    }

    /// Stored index, or `default`
    fn index_or(&self, key: SettingKey, default: i64) -> i64 {
        self.get(key)
            .and_then(|value| value.as_i64())
            .unwrap_or(default)
    }

    /// Stored publish credentials, falling back to `defaults` per field
    fn publish_credentials(&self, defaults: &SessionConfig) -> PublishCredentials {
        PublishCredentials {
            url: self.text_or(SettingKey::UrlPublish, &defaults.url_publish),
            stream_name: self.text_or(SettingKey::StreamNamePublish, &defaults.stream_name_publish),
            token: self.text_or(SettingKey::TokenPublish, &defaults.token_publish),
            source_id: self.text_or(SettingKey::SourceIdPublish, &defaults.source_id_publish),
            source_id_enabled: self.flag_or(
                SettingKey::SourceIdPublishEnabled,
                defaults.source_id_publish_enabled,
            ),
        }
    }

    /// Stored subscribe credentials, falling back to `defaults` per field
    fn subscribe_credentials(&self, defaults: &SessionConfig) -> SubscribeCredentials {
        SubscribeCredentials {
            url: self.text_or(SettingKey::UrlSubscribe, &defaults.url_subscribe),
            account_id: self.text_or(SettingKey::AccountId, &defaults.account_id),
            stream_name: self.text_or(SettingKey::StreamNameSubscribe, &defaults.stream_name_subscribe),
            token: self.text_or(SettingKey::TokenSubscribe, &defaults.token_subscribe),
        }
    }

    /// Stored selection indices, 0 when missing
    fn selection_indices(&self) -> SelectionIndices {
        SelectionIndices {
            audio_source: self.index_or(SettingKey::AudioSourceIndex, 0),
            video_source: self.index_or(SettingKey::VideoSourceIndex, 0),
            capability: self.index_or(SettingKey::CapabilityIndex, 0),
            audio_codec: self.index_or(SettingKey::AudioCodecIndex, 0),
            video_codec: self.index_or(SettingKey::VideoCodecIndex, 0),
            playback: self.index_or(SettingKey::PlaybackIndex, 0),
        }
    }
}

/// In-process settings; clones share the same values
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: Arc<Mutex<BTreeMap<SettingKey, SettingValue>>>,
}

impl MemorySettings {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with values
    pub fn with_values(values: impl IntoIterator<Item = (SettingKey, SettingValue)>) -> Self {
        Self {
            values: Arc::new(Mutex::new(values.into_iter().collect())),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: SettingKey) -> Option<SettingValue> {
        self.values.lock().get(&key).cloned()
    }

    fn set(&mut self, key: SettingKey, value: SettingValue) -> RtsResult<()> {
        self.values.lock().insert(key, value);
        Ok(())
    }
}

/// Settings kept in a JSON object file, rewritten on every change
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: BTreeMap<SettingKey, SettingValue>,
}

impl JsonFileSettings {
    /// Open a settings file; a missing file starts empty
    pub fn open(path: impl AsRef<Path>) -> RtsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut values = BTreeMap::new();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            if !contents.trim().is_empty() {
                let raw: BTreeMap<String, SettingValue> = serde_json::from_str(&contents)?;
                for (name, value) in raw {
                    match SettingKey::from_name(&name) {
                        Some(key) => {
                            values.insert(key, value);
                        }
                        None => warn!("Ignoring unknown setting {:?} in {}", name, path.display()),
                    }
                }
            }
            debug!("📂 Loaded {} settings from {}", values.len(), path.display());
        }
        Ok(Self { path, values })
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> RtsResult<()> {
        let raw: BTreeMap<&str, &SettingValue> = self
            .values
            .iter()
            .map(|(key, value)| (key.name(), value))
            .collect();
        let contents = serde_json::to_string_pretty(&raw)?;
        std::fs::write(&self.path, contents).map_err(|e| RtsError::Settings {
            reason: format!("cannot write {}: {}", self.path.display(), e),
        })
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: SettingKey) -> Option<SettingValue> {
        self.values.get(&key).cloned()
    }

    fn set(&mut self, key: SettingKey, value: SettingValue) -> RtsResult<()> {
        let previous = self.values.insert(key, value);
        if let Err(e) = self.save() {
            match previous {
                Some(previous) => self.values.insert(key, previous),
                None => self.values.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.bitrate.start_kbps, 300);
        assert_eq!(config.stats_interval_ms, 10_000);
        assert_eq!(config.ndi_video_name, "Millicast-AND-Video");
        assert!(config.auto_publish_on_connect);
        assert!(!config.auto_project_sources);
        assert_eq!(
            config.default_value(SettingKey::UrlSubscribe),
            SettingValue::Text(DEFAULT_SUBSCRIBE_URL.to_string())
        );
    }

    #[test]
    fn test_key_names_round_trip() {
        for key in SettingKey::ALL {
            assert_eq!(SettingKey::from_name(key.name()), Some(key));
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.name()));
        }
        assert_eq!(SettingKey::from_name("NOPE"), None);
        assert_eq!(SettingKey::ALL.iter().filter(|k| k.is_selection_index()).count(), 6);
    }

    #[test]
    fn test_memory_settings_fall_back_per_field() {
        let store = MemorySettings::with_values([
            (SettingKey::StreamNamePublish, "stage".into()),
            (SettingKey::SourceIdPublishEnabled, true.into()),
            (SettingKey::VideoSourceIndex, 2i64.into()),
        ]);
        let config = SessionConfig::default();

        let creds = store.publish_credentials(&config);
        assert_eq!(creds.stream_name, "stage");
        assert_eq!(creds.url, DEFAULT_PUBLISH_URL);
        assert!(creds.source_id_enabled);
        assert_eq!(store.selection_indices().video_source, 2);
        assert_eq!(store.selection_indices().audio_source, 0);
    }

    #[test]
    fn test_mistyped_value_uses_default() {
        let store = MemorySettings::with_values([(SettingKey::TokenPublish, 5i64.into())]);
        assert_eq!(store.text_or(SettingKey::TokenPublish, "fallback"), "fallback");
    }
}
