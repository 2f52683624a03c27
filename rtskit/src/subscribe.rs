//! Subscribe session control
//!
//! Owns the subscribe credentials, the subscriber transport of the current
//! connection, the playout tracks it created and the multi-source state:
//! which remote sources exist, which one is projected onto each playout
//! track and which layer of the projected video is pinned.

use crate::event::{EventHub, SessionEvent};
use crate::layer::{active_layer_ids, LayerSelector};
use crate::source::{RegistrySnapshot, SourceInfo, SourceRegistry};
use rtskit_core::{
    LayerDescriptor, MediaKind, ProjectionData, RemoteTrack, RtsError, RtsResult, SessionSide,
    SourceTrack, StatsReport, SubscribeCredentials, SubscribeOptions, SubscribeState,
    SubscriberTransport, TransportEnvelope, TransportEventSink, TransportFactory,
};
use rtskit_diagnostics::{StatsHistory, ViewerActivity};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// NDI output state of one subscribed medium
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NdiOutput {
    /// Not sent over NDI
    #[default]
    Disabled,
    /// Requested before the playout track existed
    Pending(String),
    /// Sent over NDI under the given name
    Enabled(String),
}

impl NdiOutput {
    /// Whether output is enabled or waiting for its track
    pub fn is_requested(&self) -> bool {
        !matches!(self, NdiOutput::Disabled)
    }

    /// Output name, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            NdiOutput::Disabled => None,
            NdiOutput::Pending(name) | NdiOutput::Enabled(name) => Some(name),
        }
    }
}

/// A playout track created by the subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayoutTrack {
    /// The track
    pub track: RemoteTrack,
    /// Media id, once negotiated
    pub mid: Option<String>,
}

/// Controller of the subscribing session
#[derive(Debug)]
pub struct SubscribeController {
    state: SubscribeState,
    credentials: SubscribeCredentials,
    options: SubscribeOptions,
    stats_interval_ms: u64,
    auto_project: bool,
    transport: Option<Box<dyn SubscriberTransport>>,
    generation: u64,
    registry: SourceRegistry,
    layers: LayerSelector,
    audio_track: Option<PlayoutTrack>,
    video_track: Option<PlayoutTrack>,
    ndi_audio: NdiOutput,
    ndi_video: NdiOutput,
    stats: StatsHistory,
    viewers: ViewerActivity,
    events: EventHub,
}

impl SubscribeController {
    /// Create a disconnected controller
    pub fn new(
        credentials: SubscribeCredentials,
        stats_interval_ms: u64,
        stats_capacity: usize,
        auto_project: bool,
        events: EventHub,
    ) -> Self {
        Self {
            state: SubscribeState::Disconnected,
            credentials,
            options: SubscribeOptions { stereo: true },
            stats_interval_ms,
            auto_project,
            transport: None,
            generation: 0,
            registry: SourceRegistry::new(),
            layers: LayerSelector::new(),
            audio_track: None,
            video_track: None,
            ndi_audio: NdiOutput::Disabled,
            ndi_video: NdiOutput::Disabled,
            stats: StatsHistory::new(stats_capacity),
            viewers: ViewerActivity::default(),
            events,
        }
    }

    /// Current state
    pub fn state(&self) -> SubscribeState {
        self.state
    }

    /// Generation of the current subscriber instance
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Credentials applied on the next connect
    pub fn credentials(&self) -> &SubscribeCredentials {
        &self.credentials
    }

    /// Known remote sources
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Copy of the known sources and projections
    pub fn sources(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    /// Layer ids of the projected video source, `""` (automatic) first
    pub fn active_layer_ids(&self) -> Vec<String> {
        active_layer_ids(&self.registry)
    }

    /// Pinned layer of the projected video source
    pub fn active_layer_id(&self) -> Option<&str> {
        self.registry
            .projected_source(MediaKind::Video)
            .map(|source| source.active_layer_id.as_str())
    }

    /// Playout track of a medium
    pub fn playout(&self, kind: MediaKind) -> Option<&PlayoutTrack> {
        match kind {
            MediaKind::Audio => self.audio_track.as_ref(),
            MediaKind::Video => self.video_track.as_ref(),
        }
    }

    /// NDI output state of a medium
    pub fn ndi_output(&self, kind: MediaKind) -> &NdiOutput {
        match kind {
            MediaKind::Audio => &self.ndi_audio,
            MediaKind::Video => &self.ndi_video,
        }
    }

    /// Statistics received while subscribing
    pub fn stats(&self) -> &StatsHistory {
        &self.stats
    }

    /// Audience reported to the subscriber
    pub fn viewers(&self) -> &ViewerActivity {
        &self.viewers
    }

    /// Whether a subscriber instance exists
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    fn set_state(&mut self, next: SubscribeState) {
        debug_assert!(self.state == next || self.state.can_transition_to(next));
        if self.state == next {
            return;
        }
        let from = self.state;
        info!("📥 Subscribe state: {} -> {}", from, next);
        self.state = next;
        self.events
            .emit(SessionEvent::SubscribeStateChanged { from, to: next });
    }

    fn release_transport(&mut self) {
        self.transport = None;
        self.generation += 1;
        self.viewers.reset();
    }

    fn disable_stats(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.get_stats(0);
        }
        self.stats.disable();
    }

    fn report_error(&self, operation: &str, error: &RtsError) {
        self.events.emit(SessionEvent::Error {
            operation: operation.to_string(),
            error: error.to_string(),
            recoverable: error.is_recoverable(),
        });
    }

    /// Change credentials. Only allowed while disconnected.
    pub fn update_credentials(
        &mut self,
        update: impl FnOnce(&mut SubscribeCredentials),
    ) -> RtsResult<()> {
        if self.state != SubscribeState::Disconnected {
            warn!("Rejecting subscribe credential change while {}", self.state);
            return Err(RtsError::precondition(
                "change subscribe credentials",
                format!("subscribe session is {}", self.state),
            ));
        }
        update(&mut self.credentials);
        Ok(())
    }

    /// Create a subscriber and request a connection.
    ///
    /// Returns `Ok(false)` when a connection already exists or is pending.
    pub fn connect(
        &mut self,
        factory: &mut dyn TransportFactory,
        events_tx: &mpsc::UnboundedSender<TransportEnvelope>,
    ) -> RtsResult<bool> {
        if self.state != SubscribeState::Disconnected {
            debug!("Subscriber already {}", self.state);
            return Ok(false);
        }
        self.generation += 1;
        let sink =
            TransportEventSink::new(SessionSide::Subscribe, self.generation, events_tx.clone());
        let mut transport = factory.create_subscriber(sink);
        transport.set_credentials(&self.credentials);
        self.set_state(SubscribeState::Connecting);

        if !transport.connect() {
            warn!("❌ Subscriber rejected the connection request");
            self.release_transport();
            self.set_state(SubscribeState::Disconnected);
            return Err(RtsError::transport(
                "connect subscriber",
                "connection request rejected",
            ));
        }
        info!(
            "🔌 Connecting subscriber to {}/{}",
            self.credentials.account_id, self.credentials.stream_name
        );
        self.transport = Some(transport);
        Ok(true)
    }

    /// Transport confirmed the connection. Returns whether the state moved.
    pub fn handle_connected(&mut self) -> bool {
        if self.state != SubscribeState::Connecting {
            debug!("Ignoring subscriber connected while {}", self.state);
            return false;
        }
        self.set_state(SubscribeState::Connected);
        true
    }

    /// Transport reported a failed or dropped connection
    pub fn handle_connection_error(&mut self, reason: &str) {
        warn!("❌ Subscriber connection error: {}", reason);
        self.clear_remote_state();
        self.stats.disable();
        self.release_transport();
        self.set_state(SubscribeState::Disconnected);
        self.events.emit(SessionEvent::Error {
            operation: "connect subscriber".to_string(),
            error: reason.to_string(),
            recoverable: true,
        });
    }

    /// Start receiving. Requires a connection; already subscribing is a no-op.
    pub fn start(&mut self) -> RtsResult<()> {
        match self.state {
            SubscribeState::Subscribing => {
                debug!("Already subscribing");
                return Ok(());
            }
            SubscribeState::Connected => {}
            other => {
                warn!("Cannot start subscribing while {}", other);
                return Err(RtsError::precondition(
                    "start subscribing",
                    format!("subscribe session is {other}"),
                ));
            }
        }
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| RtsError::precondition("start subscribing", "no subscriber"))?;
        transport.set_options(&self.options);
        if let Err(e) = transport.subscribe() {
            warn!("❌ Subscribe request failed: {}", e);
            return Err(e);
        }
        transport.get_stats(self.stats_interval_ms);
        self.stats.enable();
        self.set_state(SubscribeState::Subscribing);
        Ok(())
    }

    /// Stop receiving, forget every source and playout track, then
    /// disconnect and release the subscriber.
    ///
    /// A failing step stops the sequence; the state stays at the last
    /// stage reached.
    pub fn stop(&mut self) -> RtsResult<()> {
        if self.state != SubscribeState::Subscribing {
            return Err(RtsError::precondition(
                "stop subscribing",
                format!("subscribe session is {}", self.state),
            ));
        }
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.unsubscribe() {
                warn!("❌ Unsubscribe failed: {}", e);
                return Err(e);
            }
        }
        self.clear_remote_state();
        self.disable_stats();
        self.set_state(SubscribeState::Connected);
        self.disconnect_connected()
    }

    /// Close the connection. Subscribing sessions are stopped first.
    pub fn disconnect(&mut self) -> RtsResult<()> {
        match self.state {
            SubscribeState::Disconnected => {
                debug!("Subscriber not connected");
                Ok(())
            }
            SubscribeState::Subscribing => self.stop(),
            SubscribeState::Connecting => {
                if let Some(transport) = self.transport.as_mut() {
                    if let Err(e) = transport.disconnect() {
                        debug!("Abandoning pending subscriber connection: {}", e);
                    }
                }
                self.release_transport();
                self.set_state(SubscribeState::Disconnected);
                Ok(())
            }
            SubscribeState::Connected => self.disconnect_connected(),
        }
    }

    fn disconnect_connected(&mut self) -> RtsResult<()> {
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.disconnect() {
                warn!("❌ Subscriber disconnect failed: {}", e);
                return Err(e);
            }
        }
        self.clear_remote_state();
        self.release_transport();
        self.set_state(SubscribeState::Disconnected);
        Ok(())
    }

    fn clear_remote_state(&mut self) {
        for kind in [MediaKind::Audio, MediaKind::Video] {
            if self.ndi_output(kind).is_requested() {
                if let Err(e) = self.set_ndi_output(kind, false, String::new()) {
                    warn!("Failed to disable {} NDI output: {}", kind, e);
                    self.set_ndi_state(kind, NdiOutput::Disabled);
                }
            }
        }
        for kind in [MediaKind::Audio, MediaKind::Video] {
            if self.registry.projected(kind).is_some() {
                self.events.emit(SessionEvent::ProjectionChanged {
                    kind,
                    source_id: None,
                });
            }
        }
        let removed: Vec<String> = self.registry.ids().map(str::to_string).collect();
        self.registry.clear();
        for source_id in removed {
            self.events.emit(SessionEvent::SourceRemoved { source_id });
        }
        self.layers.clear();
        let audio = self.audio_track.take();
        let video = self.video_track.take();
        if audio.is_some() || video.is_some() {
            debug!("Released playout tracks");
        }
    }

    /// Transport confirmed that media is flowing
    pub fn handle_subscribed(&mut self) {
        if self.state == SubscribeState::Subscribing {
            info!("📡 Subscriber is receiving");
        } else {
            debug!("Ignoring subscribed confirmation while {}", self.state);
        }
    }

    /// Transport failed to receive; falls back to connected
    pub fn handle_subscribing_error(&mut self, reason: &str) {
        warn!("❌ Subscribing error: {}", reason);
        if self.state == SubscribeState::Subscribing {
            self.clear_remote_state();
            self.disable_stats();
            self.set_state(SubscribeState::Connected);
        }
        self.events.emit(SessionEvent::Error {
            operation: "subscribe".to_string(),
            error: reason.to_string(),
            recoverable: true,
        });
    }

    /// Install a playout track created by the transport
    pub fn handle_track(&mut self, track: RemoteTrack, mid: Option<String>) {
        let kind = track.kind;
        info!("🎬 Playout {} track {} (mid {:?})", kind, track.id, mid);
        let playout = PlayoutTrack {
            track: track.clone(),
            mid: mid.clone(),
        };
        match kind {
            MediaKind::Audio => self.audio_track = Some(playout),
            MediaKind::Video => self.video_track = Some(playout),
        }
        self.events.emit(SessionEvent::PlayoutTrack { track, mid });

        if let NdiOutput::Pending(name) = self.ndi_output(kind).clone() {
            if let Err(e) = self.set_ndi_output(kind, true, name) {
                warn!("Failed to apply pending {} NDI output: {}", kind, e);
                self.report_error("enable NDI output", &e);
            }
        }
    }

    /// A remote source appeared (or was re-announced)
    pub fn handle_source_added(&mut self, source_id: String, tracks: Vec<SourceTrack>) {
        let mut info = SourceInfo::new(source_id.clone(), tracks);
        if let Some(known) = self.registry.get(&source_id) {
            info.active_layers = known.active_layers.clone();
            info.active_layer_id = known.active_layer_id.clone();
        }
        let previous = self.registry.add_source(info);
        self.events.emit(SessionEvent::SourceAdded {
            source_id: source_id.clone(),
        });

        let projected_video = self.registry.projected(MediaKind::Video) == Some(source_id.as_str());
        if previous.is_some() && projected_video {
            self.refresh_layers();
        }
        if !self.auto_project {
            return;
        }
        for kind in [MediaKind::Audio, MediaKind::Video] {
            let offers = self
                .registry
                .get(&source_id)
                .is_some_and(|source| source.track(kind).is_some());
            if self.registry.projected(kind).is_none() && offers && self.playout(kind).is_some() {
                if let Err(e) = self.project_source(&source_id, kind) {
                    warn!("Auto projection of {:?} failed: {}", source_id, e);
                    self.report_error("project source", &e);
                }
            }
        }
    }

    /// A remote source went away; vacated slots get the first remaining source
    pub fn handle_source_removed(&mut self, source_id: &str) {
        let Some(removal) = self.registry.remove_source(source_id) else {
            debug!("Unknown source {:?} removed", source_id);
            return;
        };
        self.events.emit(SessionEvent::SourceRemoved {
            source_id: source_id.to_string(),
        });
        for kind in removal.vacated {
            self.events.emit(SessionEvent::ProjectionChanged {
                kind,
                source_id: None,
            });
            let Some(replacement) = removal.replacement.as_deref() else {
                continue;
            };
            if let Err(e) = self.project_source(replacement, kind) {
                warn!("Re-projecting {} onto {:?} failed: {}", kind, replacement, e);
                self.report_error("project source", &e);
            }
        }
    }

    /// Record a layer report and refresh the projected video source
    pub fn handle_layers(&mut self, mid: &str, active: &[LayerDescriptor], inactive: &[String]) {
        self.layers.record(mid, active, inactive);
        let video_mid = self.video_track.as_ref().and_then(|t| t.mid.as_deref());
        if video_mid.is_some_and(|video_mid| video_mid != mid) {
            debug!("Layers for mid {} do not belong to the video playout track", mid);
            return;
        }
        self.refresh_layers();
    }

    fn refresh_layers(&mut self) {
        let video_mid = self.video_track.as_ref().and_then(|t| t.mid.clone());
        if let Some(source_id) = self.layers.refresh(&mut self.registry, video_mid.as_deref()) {
            self.emit_layers(source_id);
        }
    }

    fn emit_layers(&self, source_id: String) {
        let active_layer_id = self
            .registry
            .get(&source_id)
            .map(|source| source.active_layer_id.clone())
            .unwrap_or_default();
        self.events.emit(SessionEvent::LayersChanged {
            source_id,
            layer_ids: self.active_layer_ids(),
            active_layer_id,
        });
    }

    /// Project a remote source onto the playout track of `kind`.
    ///
    /// Fails without touching either slot when the source is unknown, offers
    /// no track of that medium, no playout track exists yet or the transport
    /// rejects the projection.
    pub fn project_source(&mut self, source_id: &str, kind: MediaKind) -> RtsResult<()> {
        let source = self
            .registry
            .get(source_id)
            .ok_or_else(|| RtsError::SourceNotFound {
                source_id: source_id.to_string(),
            })?;
        let track = source.track(kind).ok_or_else(|| {
            RtsError::precondition(
                "project source",
                format!("source {source_id:?} offers no {kind} track"),
            )
        })?;
        let mid = self
            .playout(kind)
            .and_then(|playout| playout.mid.clone())
            .ok_or_else(|| {
                RtsError::precondition("project source", format!("no {kind} playout track"))
            })?;
        let layer = match kind {
            MediaKind::Video => source.layer(&source.active_layer_id).cloned(),
            MediaKind::Audio => None,
        };
        let projection = [ProjectionData {
            track_id: track.track_id.clone(),
            media: kind,
            mid,
            layer,
        }];

        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| RtsError::precondition("project source", "subscriber is not connected"))?;
        if !transport.project(source_id, &projection) {
            warn!("❌ Transport rejected projection of {:?}", source_id);
            return Err(RtsError::transport(
                "project source",
                format!("projection of {source_id:?} was not accepted"),
            ));
        }
        self.registry.project(source_id, kind)?;
        self.events.emit(SessionEvent::ProjectionChanged {
            kind,
            source_id: Some(source_id.to_string()),
        });
        if kind == MediaKind::Video {
            self.refresh_layers();
        }
        Ok(())
    }

    /// Pin a layer of the projected video source; `""` selects automatically
    pub fn select_layer(&mut self, layer_id: &str) -> RtsResult<bool> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| RtsError::precondition("select layer", "subscriber is not connected"))?;
        let changed = self
            .layers
            .select_layer(&mut self.registry, transport.as_mut(), layer_id)?;
        if changed {
            if let Some(source_id) = self.registry.projected(MediaKind::Video) {
                self.emit_layers(source_id.to_string());
            }
        }
        Ok(changed)
    }

    /// Ask the transport for an additional empty playout track
    pub fn add_playout_track(&mut self, kind: MediaKind) -> RtsResult<()> {
        let transport = self.transport.as_mut().ok_or_else(|| {
            RtsError::precondition("add playout track", "subscriber is not connected")
        })?;
        if !transport.add_remote_track(kind) {
            return Err(RtsError::transport(
                "add playout track",
                format!("{kind} track request rejected"),
            ));
        }
        debug!("Requested an additional {} playout track", kind);
        Ok(())
    }

    fn set_ndi_state(&mut self, kind: MediaKind, output: NdiOutput) {
        let slot = match kind {
            MediaKind::Audio => &mut self.ndi_audio,
            MediaKind::Video => &mut self.ndi_video,
        };
        if *slot == output {
            return;
        }
        *slot = output.clone();
        info!("📺 {} NDI output: {:?}", kind, output);
        self.events
            .emit(SessionEvent::NdiOutputChanged { kind, output });
    }

    /// Enable NDI output of a subscribed medium under `name`, or disable it.
    ///
    /// Enabling before the playout track exists is remembered and applied
    /// when the track arrives.
    pub fn set_ndi_output(&mut self, kind: MediaKind, enable: bool, name: String) -> RtsResult<()> {
        let track_id = self.playout(kind).map(|playout| playout.track.id.clone());
        let next = if enable {
            match (track_id, self.transport.as_mut()) {
                (Some(track_id), Some(transport)) => {
                    transport.set_ndi_output(&track_id, Some(&name))?;
                    NdiOutput::Enabled(name)
                }
                _ => {
                    debug!("No {} playout track yet, NDI output pending", kind);
                    NdiOutput::Pending(name)
                }
            }
        } else {
            let enabled = matches!(self.ndi_output(kind), NdiOutput::Enabled(_));
            if let (true, Some(track_id), Some(transport)) =
                (enabled, track_id, self.transport.as_mut())
            {
                transport.set_ndi_output(&track_id, None)?;
            }
            NdiOutput::Disabled
        };
        self.set_ndi_state(kind, next);
        Ok(())
    }

    /// Record a statistics report
    pub fn handle_stats(&mut self, report: StatsReport) {
        if self.stats.record(report.clone()) {
            self.events.emit(SessionEvent::Stats {
                side: SessionSide::Subscribe,
                report,
            });
        }
    }

    /// Record the viewer count of the subscribed stream
    pub fn handle_viewer_count(&mut self, count: u32) {
        debug!("👀 Subscribe viewers: {}", count);
        self.viewers.set_viewer_count(count);
        self.events.emit(SessionEvent::ViewerCount {
            side: SessionSide::Subscribe,
            count,
        });
    }

    /// Record an active/inactive notification
    pub fn handle_activity(&mut self, active: bool) {
        self.viewers.set_active(active);
        self.events.emit(SessionEvent::StreamActivity {
            side: SessionSide::Subscribe,
            active,
        });
    }

    /// Stop and disconnect whatever is running, dropping the subscriber
    pub fn release(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Subscriber release incomplete: {}", e);
        }
        if self.transport.is_some() || self.state != SubscribeState::Disconnected {
            self.clear_remote_state();
            self.disable_stats();
            self.release_transport();
            self.set_state(SubscribeState::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtskit_core::testing::FakeTransportFactory;

    fn subscribing(auto_project: bool) -> (
        SubscribeController,
        FakeTransportFactory,
        mpsc::UnboundedReceiver<TransportEnvelope>,
    ) {
        let mut factory = FakeTransportFactory::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscriber = SubscribeController::new(
            SubscribeCredentials::default(),
            10_000,
            8,
            auto_project,
            EventHub::new(),
        );
        assert!(subscriber.connect(&mut factory, &tx).unwrap());
        assert!(subscriber.handle_connected());
        subscriber.start().unwrap();
        (subscriber, factory, rx)
    }

    fn with_playout(subscriber: &mut SubscribeController) {
        subscriber.handle_track(RemoteTrack::new("ra", MediaKind::Audio), Some("0".into()));
        subscriber.handle_track(RemoteTrack::new("rv", MediaKind::Video), Some("1".into()));
    }

    fn tracks() -> Vec<SourceTrack> {
        vec![SourceTrack::audio("a"), SourceTrack::video("v")]
    }

    #[test]
    fn test_project_default_and_unknown_source() {
        let (mut subscriber, factory, _rx) = subscribing(false);
        with_playout(&mut subscriber);
        subscriber.handle_source_added(String::new(), tracks());

        subscriber.project_source("", MediaKind::Video).unwrap();
        assert_eq!(subscriber.registry().projected(MediaKind::Video), Some(""));

        let error = subscriber
            .project_source("unknown", MediaKind::Video)
            .unwrap_err();
        assert_eq!(error.error_code(), "SOURCE_NOT_FOUND");
        assert_eq!(subscriber.registry().projected(MediaKind::Video), Some(""));
        assert_eq!(factory.inspect(|s| s.projections.len()), 1);
    }

    #[test]
    fn test_rejected_projection_keeps_slot() {
        let (mut subscriber, factory, _rx) = subscribing(false);
        with_playout(&mut subscriber);
        subscriber.handle_source_added("cam".into(), tracks());

        factory.script(|b| b.accept_project = false);
        assert!(subscriber.project_source("cam", MediaKind::Audio).is_err());
        assert_eq!(subscriber.registry().projected(MediaKind::Audio), None);
    }

    #[test]
    fn test_projection_needs_playout_track() {
        let (mut subscriber, _factory, _rx) = subscribing(false);
        subscriber.handle_source_added("cam".into(), tracks());
        let error = subscriber
            .project_source("cam", MediaKind::Video)
            .unwrap_err();
        assert_eq!(error.error_code(), "PRECONDITION_FAILED");
    }

    #[test]
    fn test_auto_projection_and_replacement() {
        let (mut subscriber, factory, _rx) = subscribing(true);
        with_playout(&mut subscriber);
        subscriber.handle_source_added("a".into(), tracks());
        subscriber.handle_source_added("b".into(), tracks());
        assert_eq!(subscriber.registry().projected(MediaKind::Video), Some("a"));
        assert_eq!(subscriber.registry().projected(MediaKind::Audio), Some("a"));

        subscriber.handle_source_removed("a");
        assert_eq!(subscriber.registry().projected(MediaKind::Video), Some("b"));
        assert_eq!(subscriber.registry().projected(MediaKind::Audio), Some("b"));
        let last = factory.inspect(|s| s.projections.last().cloned()).unwrap();
        assert_eq!(last.0, "b");
    }

    #[test]
    fn test_pending_ndi_output_applied_with_track() {
        let (mut subscriber, factory, _rx) = subscribing(false);
        subscriber
            .set_ndi_output(MediaKind::Video, true, "ndi-video".into())
            .unwrap();
        assert_eq!(
            subscriber.ndi_output(MediaKind::Video),
            &NdiOutput::Pending("ndi-video".into())
        );

        with_playout(&mut subscriber);
        assert_eq!(
            subscriber.ndi_output(MediaKind::Video),
            &NdiOutput::Enabled("ndi-video".into())
        );
        assert_eq!(
            factory.inspect(|s| s.ndi_outputs.clone()),
            vec![("rv".to_string(), Some("ndi-video".to_string()))]
        );

        subscriber
            .set_ndi_output(MediaKind::Video, false, String::new())
            .unwrap();
        assert_eq!(subscriber.ndi_output(MediaKind::Video), &NdiOutput::Disabled);
    }

    #[test]
    fn test_stop_forgets_remote_state() {
        let (mut subscriber, factory, _rx) = subscribing(true);
        with_playout(&mut subscriber);
        subscriber.handle_source_added("a".into(), tracks());

        subscriber.stop().unwrap();
        assert_eq!(subscriber.state(), SubscribeState::Disconnected);
        assert!(subscriber.registry().is_empty());
        assert!(subscriber.playout(MediaKind::Video).is_none());
        assert!(!subscriber.stats().is_enabled());
        assert!(factory.log().contains("subscriber.get_stats(0)"));
    }

    #[test]
    fn test_subscribing_error_falls_back_to_connected() {
        let (mut subscriber, _factory, _rx) = subscribing(false);
        subscriber.handle_subscribing_error("edge refused");
        assert_eq!(subscriber.state(), SubscribeState::Connected);
        assert!(subscriber.has_transport());
    }
}
