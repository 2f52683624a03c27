//! Session composition root
//!
//! [`MediaSession`] owns every controller of one streaming session: local
//! capture, the publish side, the subscribe side and the settings store. All
//! mutation goes through `&mut MediaSession`, so a single owner serialises
//! caller operations and transport events. Transports report back through
//! an unbounded channel; [`MediaSession::process_pending_events`] applies
//! what arrived, or [`crate::spawn_session`] drives the session from a
//! control task.

use crate::config::{
    MemorySettings, SessionConfig, SettingKey, SettingValue, SettingsStore, ValueSource,
};
use crate::event::{EventHub, EventStream, SessionEvent};
use crate::publish::PublishController;
use crate::source::RegistrySnapshot;
use crate::subscribe::{NdiOutput, SubscribeController};
use chrono::{DateTime, Utc};
use rtskit_core::{
    BitrateKind, BitrateSettings, CaptureState, MediaKind, PublishCredentials, PublishState,
    RtsError, RtsResult, SessionSide, SessionState, SubscribeCredentials, SubscribeState,
    TransportEnvelope, TransportEvent, TransportFactory,
};
use rtskit_diagnostics::{TimestampedStats, ViewerActivity};
use rtskit_media::{CaptureController, CodecName, DeviceCatalog, MediaBackend, SelectionIndices};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Read-only copy of a session for observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// When the copy was taken
    pub taken_at: DateTime<Utc>,
    /// Every state machine
    pub state: SessionState,
    /// Publish credentials in use
    pub publish_credentials: PublishCredentials,
    /// Subscribe credentials in use
    pub subscribe_credentials: SubscribeCredentials,
    /// Selected index of every list
    pub selections: SelectionIndices,
    /// Encoder bitrate bounds
    pub bitrate: BitrateSettings,
    /// Known remote sources and projections
    pub sources: RegistrySnapshot,
    /// Selectable layer ids of the projected video source
    pub active_layer_ids: Vec<String>,
    /// Pinned layer of the projected video source
    pub active_layer_id: Option<String>,
    /// Local preview mirroring
    pub mirrored: bool,
    /// NDI output of subscribed audio
    pub ndi_audio: NdiOutput,
    /// NDI output of subscribed video
    pub ndi_video: NdiOutput,
    /// Audience of the published stream
    pub publish_viewers: ViewerActivity,
    /// Audience of the subscribed stream
    pub subscribe_viewers: ViewerActivity,
    /// Latest publish statistics
    pub publish_stats: Option<TimestampedStats>,
    /// Latest subscribe statistics
    pub subscribe_stats: Option<TimestampedStats>,
}

/// Fluent builder for a [`MediaSession`]
#[derive(Debug, Default)]
pub struct MediaSessionBuilder {
    config: SessionConfig,
    store: Option<Box<dyn SettingsStore>>,
    factory: Option<Box<dyn TransportFactory>>,
    backend: Option<Box<dyn MediaBackend>>,
}

impl MediaSessionBuilder {
    /// Replace the default configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist settings into `store` (in-memory when not set)
    pub fn settings(mut self, store: impl SettingsStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Transport SDK binding (required)
    pub fn transport(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Platform media backend (required)
    pub fn media(mut self, backend: impl MediaBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Create the session
    pub fn build(self) -> RtsResult<MediaSession> {
        let factory = self
            .factory
            .ok_or_else(|| RtsError::precondition("build session", "no transport factory"))?;
        let backend = self
            .backend
            .ok_or_else(|| RtsError::precondition("build session", "no media backend"))?;
        let store = self
            .store
            .unwrap_or_else(|| Box::new(MemorySettings::new()));
        Ok(MediaSession::new(self.config, store, factory, backend))
    }
}

/// One streaming session: capture, publish and subscribe
#[derive(Debug)]
pub struct MediaSession {
    config: SessionConfig,
    store: Box<dyn SettingsStore>,
    factory: Box<dyn TransportFactory>,
    capture: CaptureController,
    publisher: PublishController,
    subscriber: SubscribeController,
    events: EventHub,
    transport_tx: mpsc::UnboundedSender<TransportEnvelope>,
    transport_rx: Option<mpsc::UnboundedReceiver<TransportEnvelope>>,
}

impl MediaSession {
    /// Start building a session
    pub fn builder() -> MediaSessionBuilder {
        MediaSessionBuilder::default()
    }

    /// Create a session, restoring credentials and selections from `store`
    pub fn new(
        config: SessionConfig,
        store: Box<dyn SettingsStore>,
        factory: Box<dyn TransportFactory>,
        backend: Box<dyn MediaBackend>,
    ) -> Self {
        let events = EventHub::new();
        let indices = store.selection_indices();
        let capture = CaptureController::new(DeviceCatalog::with_indices(backend, indices));
        let publisher = PublishController::new(
            store.publish_credentials(&config),
            config.bitrate,
            config.stats_interval_ms,
            config.stats_history,
            events.clone(),
        );
        let subscriber = SubscribeController::new(
            store.subscribe_credentials(&config),
            config.stats_interval_ms,
            config.stats_history,
            config.auto_project_sources,
            events.clone(),
        );
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        info!(
            "🚀 Media session ready (publish {}, subscribe {})",
            publisher.credentials().url,
            subscriber.credentials().url
        );
        Self {
            config,
            store,
            factory,
            capture,
            publisher,
            subscriber,
            events,
            transport_tx,
            transport_rx: Some(transport_rx),
        }
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Every state machine
    pub fn state(&self) -> SessionState {
        SessionState {
            audio_capture: self.capture.audio_state(),
            video_capture: self.capture.video_state(),
            publish: self.publisher.state(),
            subscribe: self.subscriber.state(),
        }
    }

    /// Subscribe to session events
    pub fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    pub(crate) fn event_hub(&self) -> EventHub {
        self.events.clone()
    }

    /// Local capture
    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    /// Publish side
    pub fn publisher(&self) -> &PublishController {
        &self.publisher
    }

    /// Subscribe side
    pub fn subscriber(&self) -> &SubscribeController {
        &self.subscriber
    }

    fn persist(&mut self, persist: bool, key: SettingKey, value: SettingValue) -> RtsResult<()> {
        if !persist {
            return Ok(());
        }
        debug!("💾 Persisting {} = {:?}", key, value);
        self.store.set(key, value)
    }

    fn persist_index(&mut self, persist: bool, key: SettingKey, index: Option<usize>) -> RtsResult<()> {
        match index {
            Some(index) => self.persist(persist, key, SettingValue::Integer(index as i64)),
            None => Ok(()),
        }
    }

    fn report_error(&self, operation: &str, error: &RtsError) {
        self.events.emit(SessionEvent::Error {
            operation: operation.to_string(),
            error: error.to_string(),
            recoverable: error.is_recoverable(),
        });
    }

    // Capture

    fn emit_capture_changes(&self, before: (CaptureState, CaptureState), mirrored: bool) {
        for (kind, previous) in [(MediaKind::Audio, before.0), (MediaKind::Video, before.1)] {
            let state = self.capture.state(kind);
            if state != previous {
                self.events
                    .emit(SessionEvent::CaptureStateChanged { kind, state });
            }
        }
        if self.capture.is_mirrored() != mirrored {
            self.events.emit(SessionEvent::MirrorChanged {
                mirrored: self.capture.is_mirrored(),
            });
        }
    }

    fn capture_marker(&self) -> ((CaptureState, CaptureState), bool) {
        (
            (self.capture.audio_state(), self.capture.video_state()),
            self.capture.is_mirrored(),
        )
    }

    /// Start capturing the requested media
    pub fn start_capture(&mut self, audio: bool, video: bool) -> RtsResult<()> {
        let (before, mirrored) = self.capture_marker();
        let result = self.capture.start_capture(audio, video);
        self.emit_capture_changes(before, mirrored);
        result.map_err(RtsError::from)
    }

    /// Stop capturing the requested media
    pub fn stop_capture(&mut self, audio: bool, video: bool) {
        let (before, mirrored) = self.capture_marker();
        self.capture.stop_capture(audio, video);
        self.emit_capture_changes(before, mirrored);
    }

    /// Select the audio source
    pub fn select_audio(&mut self, index: i64, persist: bool) -> RtsResult<Option<usize>> {
        let selected = self.capture.select_audio(index)?;
        self.persist_index(persist, SettingKey::AudioSourceIndex, selected)?;
        Ok(selected)
    }

    /// Select the video source; switches a running capture in place
    pub fn select_video(&mut self, index: i64, persist: bool) -> RtsResult<Option<usize>> {
        let (before, mirrored) = self.capture_marker();
        let selected = self.capture.select_video(index)?;
        self.emit_capture_changes(before, mirrored);
        self.persist_index(persist, SettingKey::VideoSourceIndex, selected)?;
        let capability = self.capture.catalog().capabilities().index();
        self.persist_index(persist && selected.is_some(), SettingKey::CapabilityIndex, capability)?;
        Ok(selected)
    }

    /// Select the capability; changes the format of a running capture
    pub fn select_capability(&mut self, index: i64, persist: bool) -> RtsResult<Option<usize>> {
        let selected = self.capture.select_capability(index)?;
        self.persist_index(persist, SettingKey::CapabilityIndex, selected)?;
        Ok(selected)
    }

    /// Step to the next or previous audio source
    pub fn switch_audio(&mut self, ascending: bool, persist: bool) -> RtsResult<Option<usize>> {
        let selected = self.capture.switch_audio(ascending)?;
        self.persist_index(persist, SettingKey::AudioSourceIndex, selected)?;
        Ok(selected)
    }

    /// Step to the next or previous video source
    pub fn switch_video(&mut self, ascending: bool, persist: bool) -> RtsResult<Option<usize>> {
        let (before, mirrored) = self.capture_marker();
        let selected = self.capture.switch_video(ascending)?;
        self.emit_capture_changes(before, mirrored);
        self.persist_index(persist, SettingKey::VideoSourceIndex, selected)?;
        Ok(selected)
    }

    /// Step to the next or previous capability
    pub fn switch_capability(&mut self, ascending: bool, persist: bool) -> RtsResult<Option<usize>> {
        let selected = self.capture.switch_capability(ascending)?;
        self.persist_index(persist, SettingKey::CapabilityIndex, selected)?;
        Ok(selected)
    }

    /// Flip the local preview mirroring
    pub fn toggle_mirror(&mut self) -> bool {
        let mirrored = self.capture.toggle_mirror();
        self.events.emit(SessionEvent::MirrorChanged { mirrored });
        mirrored
    }

    /// Re-query local device lists
    pub fn refresh_devices(&mut self) {
        self.capture.refresh_devices();
    }

    // Codecs and playback

    fn guard_not_publishing(&self, operation: &str) -> RtsResult<()> {
        if self.publisher.state() == PublishState::Publishing {
            warn!("Rejecting {} while publishing", operation);
            return Err(RtsError::precondition(operation, "publish session is Publishing"));
        }
        Ok(())
    }

    /// Select the audio codec applied at the next publish start
    pub fn select_audio_codec(&mut self, index: i64, persist: bool) -> RtsResult<Option<usize>> {
        self.guard_not_publishing("change audio codec")?;
        let selected = self.capture.catalog_mut().select_audio_codec(index);
        if selected.is_none() {
            warn!("No audio codecs available, keeping selection");
        }
        self.persist_index(persist, SettingKey::AudioCodecIndex, selected)?;
        Ok(selected)
    }

    /// Select the video codec applied at the next publish start
    pub fn select_video_codec(&mut self, index: i64, persist: bool) -> RtsResult<Option<usize>> {
        self.guard_not_publishing("change video codec")?;
        let selected = self.capture.catalog_mut().select_video_codec(index);
        if selected.is_none() {
            warn!("No video codecs available, keeping selection");
        }
        self.persist_index(persist, SettingKey::VideoCodecIndex, selected)?;
        Ok(selected)
    }

    /// Step to the next or previous audio codec
    pub fn switch_audio_codec(&mut self, ascending: bool, persist: bool) -> RtsResult<Option<usize>> {
        self.guard_not_publishing("switch audio codec")?;
        let selected = self.capture.catalog_mut().switch_audio_codec(ascending);
        if selected.is_none() {
            warn!("No audio codecs available, keeping selection");
        }
        self.persist_index(persist, SettingKey::AudioCodecIndex, selected)?;
        Ok(selected)
    }

    /// Step to the next or previous video codec
    pub fn switch_video_codec(&mut self, ascending: bool, persist: bool) -> RtsResult<Option<usize>> {
        self.guard_not_publishing("switch video codec")?;
        let selected = self.capture.catalog_mut().switch_video_codec(ascending);
        if selected.is_none() {
            warn!("No video codecs available, keeping selection");
        }
        self.persist_index(persist, SettingKey::VideoCodecIndex, selected)?;
        Ok(selected)
    }

    fn guard_not_subscribing(&self, operation: &str) -> RtsResult<()> {
        if self.subscriber.state() == SubscribeState::Subscribing {
            warn!("Rejecting {} while subscribing", operation);
            return Err(RtsError::precondition(operation, "subscribe session is Subscribing"));
        }
        Ok(())
    }

    /// Select the playback device initialised at the next subscribe connect
    pub fn select_playback(&mut self, index: i64, persist: bool) -> RtsResult<Option<usize>> {
        self.guard_not_subscribing("change playback device")?;
        let selected = self.capture.catalog_mut().select_playback(index);
        if selected.is_none() {
            warn!("No playback devices available, keeping selection");
        }
        self.persist_index(persist, SettingKey::PlaybackIndex, selected)?;
        Ok(selected)
    }

    /// Step to the next or previous playback device
    pub fn switch_playback(&mut self, ascending: bool, persist: bool) -> RtsResult<Option<usize>> {
        self.guard_not_subscribing("switch playback device")?;
        let selected = self.capture.catalog_mut().switch_playback(ascending);
        if selected.is_none() {
            warn!("No playback devices available, keeping selection");
        }
        self.persist_index(persist, SettingKey::PlaybackIndex, selected)?;
        Ok(selected)
    }

    /// Selected audio codec
    pub fn selected_audio_codec(&mut self) -> Option<CodecName> {
        self.capture.catalog_mut().selected_audio_codec()
    }

    /// Selected video codec
    pub fn selected_video_codec(&mut self) -> Option<CodecName> {
        self.capture.catalog_mut().selected_video_codec()
    }

    /// Set one encoder bitrate bound, applied at the next publish start
    pub fn set_bitrate(&mut self, kind: BitrateKind, kbps: i64) -> RtsResult<()> {
        self.publisher.set_bitrate(kind, kbps)
    }

    // Credentials

    /// Publish credentials from the given origin
    pub fn publish_credentials(&self, source: ValueSource) -> PublishCredentials {
        match source {
            ValueSource::Current => self.publisher.credentials().clone(),
            ValueSource::Stored => self.store.publish_credentials(&self.config),
            ValueSource::Default => self.config.publish_credentials(),
        }
    }

    /// Subscribe credentials from the given origin
    pub fn subscribe_credentials(&self, source: ValueSource) -> SubscribeCredentials {
        match source {
            ValueSource::Current => self.subscriber.credentials().clone(),
            ValueSource::Stored => self.store.subscribe_credentials(&self.config),
            ValueSource::Default => self.config.subscribe_credentials(),
        }
    }

    /// Value of one persisted key from the given origin
    pub fn setting(&self, key: SettingKey, source: ValueSource) -> SettingValue {
        match source {
            ValueSource::Default => self.config.default_value(key),
            ValueSource::Stored => self
                .store
                .get(key)
                .unwrap_or_else(|| self.config.default_value(key)),
            ValueSource::Current => self.current_value(key),
        }
    }

    fn current_value(&self, key: SettingKey) -> SettingValue {
        use SettingKey::*;
        let publish = self.publisher.credentials();
        let subscribe = self.subscriber.credentials();
        let indices = self.capture.catalog().indices();
        match key {
            AccountId => subscribe.account_id.as_str().into(),
            StreamNamePublish => publish.stream_name.as_str().into(),
            StreamNameSubscribe => subscribe.stream_name.as_str().into(),
            TokenPublish => publish.token.as_str().into(),
            TokenSubscribe => subscribe.token.as_str().into(),
            UrlPublish => publish.url.as_str().into(),
            UrlSubscribe => subscribe.url.as_str().into(),
            SourceIdPublish => publish.source_id.as_str().into(),
            SourceIdPublishEnabled => publish.source_id_enabled.into(),
            AudioSourceIndex => indices.audio_source.into(),
            VideoSourceIndex => indices.video_source.into(),
            CapabilityIndex => indices.capability.into(),
            AudioCodecIndex => indices.audio_codec.into(),
            VideoCodecIndex => indices.video_codec.into(),
            PlaybackIndex => indices.playback.into(),
        }
    }

    /// Change one credential.
    ///
    /// Publish credentials require a disconnected publisher and subscribe
    /// credentials a disconnected subscriber. A rejected change writes
    /// nothing, neither in memory nor to the store; when the store write
    /// fails the in-memory value is restored.
    pub fn set_credential(
        &mut self,
        key: SettingKey,
        value: impl Into<SettingValue>,
        persist: bool,
    ) -> RtsResult<()> {
        let value = value.into();
        let mismatch = || RtsError::Settings {
            reason: format!("{key} does not accept {value:?}"),
        };
        let previous_publish = self.publisher.credentials().clone();
        let previous_subscribe = self.subscriber.credentials().clone();
        if key.is_publish_credential() {
            let apply: Box<dyn FnOnce(&mut PublishCredentials)> = match key {
                SettingKey::SourceIdPublishEnabled => {
                    let enabled = value.as_bool().ok_or_else(mismatch)?;
                    Box::new(move |c| c.source_id_enabled = enabled)
                }
                _ => {
                    let text = value.as_str().ok_or_else(mismatch)?.to_string();
                    match key {
                        SettingKey::UrlPublish => Box::new(move |c| c.url = text),
                        SettingKey::StreamNamePublish => Box::new(move |c| c.stream_name = text),
                        SettingKey::TokenPublish => Box::new(move |c| c.token = text),
                        _ => Box::new(move |c| c.source_id = text),
                    }
                }
            };
            self.publisher.update_credentials(apply)?;
        } else if key.is_subscribe_credential() {
            let text = value.as_str().ok_or_else(mismatch)?.to_string();
            self.subscriber.update_credentials(move |c| match key {
                SettingKey::UrlSubscribe => c.url = text,
                SettingKey::AccountId => c.account_id = text,
                SettingKey::StreamNameSubscribe => c.stream_name = text,
                _ => c.token = text,
            })?;
        } else {
            return Err(RtsError::precondition(
                format!("set {key}"),
                "selection indices are changed through their select operation",
            ));
        }
        if let Err(e) = self.persist(persist, key, value) {
            warn!("Failed to persist {}, restoring previous value: {}", key, e);
            if key.is_publish_credential() {
                self.publisher
                    .update_credentials(|c| *c = previous_publish)?;
            } else {
                self.subscriber
                    .update_credentials(|c| *c = previous_subscribe)?;
            }
            return Err(e);
        }
        info!("🔑 {} updated", key);
        Ok(())
    }

    /// Set the publish URL
    pub fn set_publish_url(&mut self, url: &str, persist: bool) -> RtsResult<()> {
        self.set_credential(SettingKey::UrlPublish, url, persist)
    }

    /// Set the subscribe URL
    pub fn set_subscribe_url(&mut self, url: &str, persist: bool) -> RtsResult<()> {
        self.set_credential(SettingKey::UrlSubscribe, url, persist)
    }

    /// Set the account id used to subscribe
    pub fn set_account_id(&mut self, account_id: &str, persist: bool) -> RtsResult<()> {
        self.set_credential(SettingKey::AccountId, account_id, persist)
    }

    /// Set the stream name to publish under
    pub fn set_stream_name_publish(&mut self, name: &str, persist: bool) -> RtsResult<()> {
        self.set_credential(SettingKey::StreamNamePublish, name, persist)
    }

    /// Set the stream name to subscribe to
    pub fn set_stream_name_subscribe(&mut self, name: &str, persist: bool) -> RtsResult<()> {
        self.set_credential(SettingKey::StreamNameSubscribe, name, persist)
    }

    /// Set the publishing token
    pub fn set_token_publish(&mut self, token: &str, persist: bool) -> RtsResult<()> {
        self.set_credential(SettingKey::TokenPublish, token, persist)
    }

    /// Set the subscribing token
    pub fn set_token_subscribe(&mut self, token: &str, persist: bool) -> RtsResult<()> {
        self.set_credential(SettingKey::TokenSubscribe, token, persist)
    }

    /// Set the source id announced when publishing
    pub fn set_source_id_publish(&mut self, source_id: &str, persist: bool) -> RtsResult<()> {
        self.set_credential(SettingKey::SourceIdPublish, source_id, persist)
    }

    /// Enable or disable announcing the source id
    pub fn set_source_id_publish_enabled(&mut self, enabled: bool, persist: bool) -> RtsResult<()> {
        self.set_credential(SettingKey::SourceIdPublishEnabled, enabled, persist)
    }

    // Publish

    /// Request a publisher connection; `Ok(false)` when one exists already
    pub fn connect_publisher(&mut self) -> RtsResult<bool> {
        self.publisher
            .connect(self.factory.as_mut(), &self.transport_tx)
    }

    /// Publish whatever is being captured
    pub fn start_publishing(&mut self) -> RtsResult<()> {
        let tracks = self.capture.captured_tracks();
        let catalog = self.capture.catalog_mut();
        let audio_codec = catalog.selected_audio_codec().map(|codec| codec.0);
        let video_codec = catalog.selected_video_codec().map(|codec| codec.0);
        self.publisher.start(&tracks, audio_codec, video_codec)
    }

    /// Stop publishing and disconnect
    pub fn stop_publishing(&mut self) -> RtsResult<()> {
        self.publisher.stop()
    }

    /// Close the publisher connection, stopping first if needed
    pub fn disconnect_publisher(&mut self) -> RtsResult<()> {
        self.publisher.disconnect()
    }

    // Subscribe

    /// Request a subscriber connection and prepare the playback device
    pub fn connect_subscriber(&mut self) -> RtsResult<bool> {
        let accepted = self
            .subscriber
            .connect(self.factory.as_mut(), &self.transport_tx)?;
        if accepted {
            let catalog = self.capture.catalog_mut();
            if let Some(device) = catalog.selected_playback() {
                match catalog.backend_mut().init_playback(&device) {
                    Ok(()) => debug!("🔈 Playback device {} ready", device),
                    Err(e) => warn!("Failed to initialise playback on {}: {}", device, e),
                }
            }
        }
        Ok(accepted)
    }

    /// Start receiving the subscribed stream
    pub fn start_subscribing(&mut self) -> RtsResult<()> {
        self.subscriber.start()
    }

    /// Stop receiving, forget remote sources and disconnect
    pub fn stop_subscribing(&mut self) -> RtsResult<()> {
        self.subscriber.stop()
    }

    /// Close the subscriber connection, stopping first if needed
    pub fn disconnect_subscriber(&mut self) -> RtsResult<()> {
        self.subscriber.disconnect()
    }

    /// Project a remote source onto the playout track of `kind`
    pub fn project_source(&mut self, source_id: &str, kind: MediaKind) -> RtsResult<()> {
        self.subscriber.project_source(source_id, kind)
    }

    /// Pin a layer of the projected video source; `""` selects automatically
    pub fn select_layer(&mut self, layer_id: &str) -> RtsResult<bool> {
        self.subscriber.select_layer(layer_id)
    }

    /// Selectable layer ids, `""` (automatic) first
    pub fn active_layer_ids(&self) -> Vec<String> {
        self.subscriber.active_layer_ids()
    }

    /// Ask for an additional playout track
    pub fn add_playout_track(&mut self, kind: MediaKind) -> RtsResult<()> {
        self.subscriber.add_playout_track(kind)
    }

    /// Send a subscribed medium over NDI under its configured name
    pub fn set_ndi_output(&mut self, kind: MediaKind, enable: bool) -> RtsResult<()> {
        let name = match kind {
            MediaKind::Audio => self.config.ndi_audio_name.clone(),
            MediaKind::Video => self.config.ndi_video_name.clone(),
        };
        self.subscriber.set_ndi_output(kind, enable, name)
    }

    /// Copy of the known remote sources
    pub fn sources(&self) -> RegistrySnapshot {
        self.subscriber.sources()
    }

    // Transport events

    fn generation(&self, side: SessionSide) -> u64 {
        match side {
            SessionSide::Publish => self.publisher.generation(),
            SessionSide::Subscribe => self.subscriber.generation(),
        }
    }

    /// Apply one transport event.
    ///
    /// Events from a transport instance that has since been released are
    /// dropped with [`RtsError::StaleEvent`].
    pub fn handle_envelope(&mut self, envelope: TransportEnvelope) -> RtsResult<()> {
        let TransportEnvelope {
            side,
            generation,
            event,
        } = envelope;
        let current = self.generation(side);
        if generation != current {
            debug!(
                "Dropping stale {} {} event (generation {}, current {})",
                side,
                event.event_type(),
                generation,
                current
            );
            return Err(RtsError::StaleEvent {
                side,
                event_generation: generation,
                current_generation: current,
            });
        }
        match side {
            SessionSide::Publish => self.handle_publish_event(event),
            SessionSide::Subscribe => self.handle_subscribe_event(event),
        }
        Ok(())
    }

    fn handle_publish_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                if self.publisher.handle_connected() && self.config.auto_publish_on_connect {
                    if let Err(e) = self.start_publishing() {
                        warn!("Automatic publish start failed: {}", e);
                        self.report_error("start publishing", &e);
                    }
                }
            }
            TransportEvent::ConnectionError { reason } => {
                self.publisher.handle_connection_error(&reason)
            }
            TransportEvent::Publishing => self.publisher.handle_publishing(),
            TransportEvent::PublishingError { reason } => {
                self.publisher.handle_publishing_error(&reason)
            }
            TransportEvent::StatsReport(report) => self.publisher.handle_stats(report),
            TransportEvent::ViewerCount(count) => self.publisher.handle_viewer_count(count),
            TransportEvent::Active => self.publisher.handle_activity(true),
            TransportEvent::Inactive => self.publisher.handle_activity(false),
            other => debug!("Ignoring {} event on the publisher", other.event_type()),
        }
    }

    fn handle_subscribe_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                if self.subscriber.handle_connected() && self.config.auto_subscribe_on_connect {
                    if let Err(e) = self.start_subscribing() {
                        warn!("Automatic subscribe start failed: {}", e);
                        self.report_error("start subscribing", &e);
                    }
                }
            }
            TransportEvent::ConnectionError { reason } => {
                self.subscriber.handle_connection_error(&reason)
            }
            TransportEvent::Subscribed => self.subscriber.handle_subscribed(),
            TransportEvent::SubscribingError { reason } => {
                self.subscriber.handle_subscribing_error(&reason)
            }
            TransportEvent::StatsReport(report) => self.subscriber.handle_stats(report),
            TransportEvent::ViewerCount(count) => self.subscriber.handle_viewer_count(count),
            TransportEvent::Active => self.subscriber.handle_activity(true),
            TransportEvent::Inactive => self.subscriber.handle_activity(false),
            TransportEvent::Track { track, mid } => self.subscriber.handle_track(track, mid),
            TransportEvent::SourceAdded { source_id, tracks } => {
                self.subscriber.handle_source_added(source_id, tracks)
            }
            TransportEvent::SourceRemoved { source_id } => {
                self.subscriber.handle_source_removed(&source_id)
            }
            TransportEvent::Layers {
                mid,
                active,
                inactive,
            } => self.subscriber.handle_layers(&mid, &active, &inactive),
            other => debug!("Ignoring {} event on the subscriber", other.event_type()),
        }
    }

    /// Apply every queued transport event in arrival order.
    ///
    /// Returns the number of events applied; stale events are not counted.
    /// Always 0 once the session runs on a control task.
    pub fn process_pending_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let Some(rx) = self.transport_rx.as_mut() else {
                return applied;
            };
            let mut batch = Vec::new();
            while let Ok(envelope) = rx.try_recv() {
                batch.push(envelope);
            }
            if batch.is_empty() {
                return applied;
            }
            for envelope in batch {
                if self.handle_envelope(envelope).is_ok() {
                    applied += 1;
                }
            }
        }
    }

    pub(crate) fn take_transport_events(
        &mut self,
    ) -> Option<mpsc::UnboundedReceiver<TransportEnvelope>> {
        self.transport_rx.take()
    }

    /// Read-only copy for observers
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            taken_at: Utc::now(),
            state: self.state(),
            publish_credentials: self.publisher.credentials().clone(),
            subscribe_credentials: self.subscriber.credentials().clone(),
            selections: self.capture.catalog().indices(),
            bitrate: self.publisher.bitrate(),
            sources: self.subscriber.sources(),
            active_layer_ids: self.subscriber.active_layer_ids(),
            active_layer_id: self.subscriber.active_layer_id().map(str::to_string),
            mirrored: self.capture.is_mirrored(),
            ndi_audio: self.subscriber.ndi_output(MediaKind::Audio).clone(),
            ndi_video: self.subscriber.ndi_output(MediaKind::Video).clone(),
            publish_viewers: self.publisher.viewers().clone(),
            subscribe_viewers: self.subscriber.viewers().clone(),
            publish_stats: self.publisher.stats().latest().cloned(),
            subscribe_stats: self.subscriber.stats().latest().cloned(),
        }
    }

    /// Stop capture, publishing and subscribing, dropping every transport
    pub fn release(&mut self) {
        info!("🧹 Releasing media session");
        self.stop_capture(true, true);
        self.publisher.release();
        self.subscriber.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtskit_core::testing::FakeTransportFactory;
    use rtskit_media::testing::FakeMediaBackend;

    fn session() -> (MediaSession, FakeTransportFactory) {
        let factory = FakeTransportFactory::new();
        let session = MediaSession::builder()
            .transport(factory.clone())
            .media(FakeMediaBackend::standard())
            .build()
            .unwrap();
        (session, factory)
    }

    #[test]
    fn test_builder_requires_transport() {
        let error = MediaSession::builder()
            .media(FakeMediaBackend::standard())
            .build()
            .unwrap_err();
        assert_eq!(error.error_code(), "PRECONDITION_FAILED");
    }

    #[test]
    fn test_selection_index_is_not_a_credential() {
        let (mut session, _factory) = session();
        assert!(session
            .set_credential(SettingKey::AudioSourceIndex, 1i64, false)
            .is_err());
    }

    #[test]
    fn test_credential_type_mismatch() {
        let (mut session, _factory) = session();
        let error = session
            .set_credential(SettingKey::TokenPublish, true, false)
            .unwrap_err();
        assert_eq!(error.error_code(), "SETTINGS_ERROR");
        assert_eq!(session.publish_credentials(ValueSource::Current).token, "");
    }

    #[test]
    fn test_current_value_follows_memory() {
        let (mut session, _factory) = session();
        session.set_account_id("acct", false).unwrap();
        assert_eq!(
            session.setting(SettingKey::AccountId, ValueSource::Current),
            SettingValue::from("acct")
        );
        assert_eq!(
            session.setting(SettingKey::AccountId, ValueSource::Stored),
            SettingValue::from("")
        );
    }

    #[test]
    fn test_auto_publish_needs_tracks() {
        let (mut session, factory) = session();
        let mut events = session.events();
        session.connect_publisher().unwrap();
        assert!(factory.emit_publisher(TransportEvent::Connected));
        assert_eq!(session.process_pending_events(), 1);

        assert_eq!(session.state().publish, PublishState::Connected);
        assert!(events.drain().iter().any(SessionEvent::is_error_event));
    }
}
