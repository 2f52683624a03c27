//! Publish session control
//!
//! Owns the publish credentials and encoder preferences, the publisher
//! transport of the current connection and the publish state machine.

use crate::event::{EventHub, SessionEvent};
use rtskit_core::{
    BitrateKind, BitrateSettings, LocalTrack, PublishCredentials, PublishOptions, PublishState,
    PublisherTransport, RtsError, RtsResult, SessionSide, StatsReport, TransportEnvelope,
    TransportEventSink, TransportFactory,
};
use rtskit_diagnostics::{StatsHistory, ViewerActivity};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Controller of the publishing session
#[derive(Debug)]
pub struct PublishController {
    state: PublishState,
    credentials: PublishCredentials,
    bitrate: BitrateSettings,
    stats_interval_ms: u64,
    transport: Option<Box<dyn PublisherTransport>>,
    generation: u64,
    stats: StatsHistory,
    viewers: ViewerActivity,
    events: EventHub,
}

impl PublishController {
    /// Create a disconnected controller
    pub fn new(
        credentials: PublishCredentials,
        bitrate: BitrateSettings,
        stats_interval_ms: u64,
        stats_capacity: usize,
        events: EventHub,
    ) -> Self {
        Self {
            state: PublishState::Disconnected,
            credentials,
            bitrate,
            stats_interval_ms,
            transport: None,
            generation: 0,
            stats: StatsHistory::new(stats_capacity),
            viewers: ViewerActivity::default(),
            events,
        }
    }

    /// Current state
    pub fn state(&self) -> PublishState {
        self.state
    }

    /// Generation of the current publisher instance
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Credentials applied on the next connect
    pub fn credentials(&self) -> &PublishCredentials {
        &self.credentials
    }

    /// Bitrate bounds applied on the next start
    pub fn bitrate(&self) -> BitrateSettings {
        self.bitrate
    }

    /// Statistics received while publishing
    pub fn stats(&self) -> &StatsHistory {
        &self.stats
    }

    /// Audience reported to the publisher
    pub fn viewers(&self) -> &ViewerActivity {
        &self.viewers
    }

    /// Whether a publisher instance exists
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    fn set_state(&mut self, next: PublishState) {
        debug_assert!(self.state == next || self.state.can_transition_to(next));
        if self.state == next {
            return;
        }
        let from = self.state;
        info!("📤 Publish state: {} -> {}", from, next);
        self.state = next;
        self.events
            .emit(SessionEvent::PublishStateChanged { from, to: next });
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

    /// Change credentials. Only allowed while disconnected.
    pub fn update_credentials(
        &mut self,
        update: impl FnOnce(&mut PublishCredentials),
    ) -> RtsResult<()> {
        if self.state != PublishState::Disconnected {
            warn!("Rejecting publish credential change while {}", self.state);
            return Err(RtsError::precondition(
                "change publish credentials",
                format!("publish session is {}", self.state),
            ));
        }
        update(&mut self.credentials);
        Ok(())
    }

    /// Change one bitrate bound for the next start
    pub fn set_bitrate(&mut self, kind: BitrateKind, kbps: i64) -> RtsResult<()> {
        if self.state == PublishState::Publishing {
            warn!("Rejecting bitrate change while publishing");
            return Err(RtsError::precondition("set bitrate", "publish session is Publishing"));
        }
        let kbps = u32::try_from(kbps).map_err(|_| {
            RtsError::precondition("set bitrate", format!("{kbps} kbps is not a valid bitrate"))
        })?;
        self.bitrate.set(kind, kbps);
        debug!("Bitrate {:?} set to {} kbps", kind, kbps);
        Ok(())
    }

    /// Create a publisher and request a connection.
    ///
    /// Returns `Ok(false)` when a connection already exists or is pending.
    pub fn connect(
        &mut self,
        factory: &mut dyn TransportFactory,
        events_tx: &mpsc::UnboundedSender<TransportEnvelope>,
    ) -> RtsResult<bool> {
        if self.state != PublishState::Disconnected {
            debug!("Publisher already {}", self.state);
            return Ok(false);
        }
        self.generation += 1;
        let sink = TransportEventSink::new(SessionSide::Publish, self.generation, events_tx.clone());
        let mut transport = factory.create_publisher(sink);
        transport.set_credentials(&self.credentials);
        self.set_state(PublishState::Connecting);

        if !transport.connect() {
            warn!("❌ Publisher rejected the connection request");
            self.release_transport();
            self.set_state(PublishState::Disconnected);
            return Err(RtsError::transport(
                "connect publisher",
                "connection request rejected",
            ));
        }
        info!(
            "🔌 Connecting publisher to {} (stream {:?})",
            self.credentials.url, self.credentials.stream_name
        );
        self.transport = Some(transport);
        Ok(true)
    }

    /// Transport confirmed the connection. Returns whether the state moved.
    pub fn handle_connected(&mut self) -> bool {
        if self.state != PublishState::Connecting {
            debug!("Ignoring publisher connected while {}", self.state);
            return false;
        }
        self.set_state(PublishState::Connected);
        true
    }

    /// Transport reported a failed or dropped connection
    pub fn handle_connection_error(&mut self, reason: &str) {
        warn!("❌ Publisher connection error: {}", reason);
        self.stats.disable();
        self.release_transport();
        self.set_state(PublishState::Disconnected);
        self.events.emit(SessionEvent::Error {
            operation: "connect publisher".to_string(),
            error: reason.to_string(),
            recoverable: true,
        });
    }

    /// Attach `tracks` with the current preferences and start sending.
    ///
    /// Requires a connection and at least one track; already publishing is a
    /// no-op. On failure the state is left unchanged.
    pub fn start(
        &mut self,
        tracks: &[LocalTrack],
        audio_codec: Option<String>,
        video_codec: Option<String>,
    ) -> RtsResult<()> {
        match self.state {
            PublishState::Publishing => {
                debug!("Already publishing");
                return Ok(());
            }
            PublishState::Connected => {}
            other => {
                warn!("Cannot start publishing while {}", other);
                return Err(RtsError::precondition(
                    "start publishing",
                    format!("publish session is {other}"),
                ));
            }
        }
        if tracks.is_empty() {
            warn!("Cannot start publishing: nothing is captured");
            return Err(RtsError::precondition(
                "start publishing",
                "no audio or video is captured",
            ));
        }

        let options = PublishOptions {
            source_id: self.credentials.effective_source_id().map(str::to_string),
            audio_codec,
            video_codec,
            bitrate: self.bitrate,
            ..Default::default()
        };
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| RtsError::precondition("start publishing", "no publisher"))?;
        for track in tracks {
            transport.add_track(track);
        }
        transport.set_options(&options);
        if let Err(e) = transport.publish() {
            warn!("❌ Publish request failed: {}", e);
            return Err(e);
        }
        transport.get_stats(self.stats_interval_ms);
        self.stats.enable();
        info!(
            "🚀 Publishing {} track(s), codecs {:?}/{:?}",
            tracks.len(),
            options.audio_codec,
            options.video_codec
        );
        self.set_state(PublishState::Publishing);
        Ok(())
    }

    /// Stop sending, then disconnect and release the publisher.
    ///
    /// A failing step stops the sequence; the state stays at the last
    /// stage reached.
    pub fn stop(&mut self) -> RtsResult<()> {
        if self.state != PublishState::Publishing {
            return Err(RtsError::precondition(
                "stop publishing",
                format!("publish session is {}", self.state),
            ));
        }
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.unpublish() {
                warn!("❌ Unpublish failed: {}", e);
                return Err(e);
            }
        }
        self.disable_stats();
        self.set_state(PublishState::Connected);
        self.disconnect_connected()
    }

    /// Close the connection. Publishing sessions are stopped first.
    pub fn disconnect(&mut self) -> RtsResult<()> {
        match self.state {
            PublishState::Disconnected => {
                debug!("Publisher not connected");
                Ok(())
            }
            PublishState::Publishing => self.stop(),
            PublishState::Connecting => {
                if let Some(transport) = self.transport.as_mut() {
                    if let Err(e) = transport.disconnect() {
                        debug!("Abandoning pending publisher connection: {}", e);
                    }
                }
                self.release_transport();
                self.set_state(PublishState::Disconnected);
                Ok(())
            }
            PublishState::Connected => self.disconnect_connected(),
        }
    }

    fn disconnect_connected(&mut self) -> RtsResult<()> {
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.disconnect() {
                warn!("❌ Publisher disconnect failed: {}", e);
                return Err(e);
            }
        }
        self.release_transport();
        self.set_state(PublishState::Disconnected);
        Ok(())
    }

    /// Transport confirmed that media is flowing
    pub fn handle_publishing(&mut self) {
        if self.state == PublishState::Publishing {
            info!("📡 Publisher is live");
        } else {
            debug!("Ignoring publishing confirmation while {}", self.state);
        }
    }

    /// Transport failed to send; falls back to connected
    pub fn handle_publishing_error(&mut self, reason: &str) {
        warn!("❌ Publishing error: {}", reason);
        if self.state == PublishState::Publishing {
            self.disable_stats();
            self.set_state(PublishState::Connected);
        }
        self.events.emit(SessionEvent::Error {
            operation: "publish".to_string(),
            error: reason.to_string(),
            recoverable: true,
        });
    }

    /// Record a statistics report
    pub fn handle_stats(&mut self, report: StatsReport) {
        if self.stats.record(report.clone()) {
            self.events.emit(SessionEvent::Stats {
                side: SessionSide::Publish,
                report,
            });
        }
    }

    /// Record the viewer count of the published stream
    pub fn handle_viewer_count(&mut self, count: u32) {
        debug!("👀 Publish viewers: {}", count);
        self.viewers.set_viewer_count(count);
        self.events.emit(SessionEvent::ViewerCount {
            side: SessionSide::Publish,
            count,
        });
    }

    /// Record an active/inactive notification
    pub fn handle_activity(&mut self, active: bool) {
        self.viewers.set_active(active);
        self.events.emit(SessionEvent::StreamActivity {
            side: SessionSide::Publish,
            active,
        });
    }

    /// Stop and disconnect whatever is running, dropping the publisher
    pub fn release(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Publisher release incomplete: {}", e);
        }
        if self.transport.is_some() || self.state != PublishState::Disconnected {
            self.disable_stats();
            self.release_transport();
            self.set_state(PublishState::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtskit_core::testing::FakeTransportFactory;
    use rtskit_core::MediaKind;

    fn connected() -> (
        PublishController,
        FakeTransportFactory,
        mpsc::UnboundedReceiver<TransportEnvelope>,
    ) {
        let mut factory = FakeTransportFactory::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut publisher = PublishController::new(
            PublishCredentials::default(),
            BitrateSettings::default(),
            10_000,
            8,
            EventHub::new(),
        );
        assert!(publisher.connect(&mut factory, &tx).unwrap());
        assert!(publisher.handle_connected());
        (publisher, factory, rx)
    }

    #[test]
    fn test_start_without_tracks_keeps_connected() {
        let (mut publisher, factory, _rx) = connected();
        let error = publisher.start(&[], None, None).unwrap_err();
        assert_eq!(error.error_code(), "PRECONDITION_FAILED");
        assert_eq!(publisher.state(), PublishState::Connected);
        assert!(!factory.log().contains("publisher.publish"));
    }

    #[test]
    fn test_credentials_locked_while_connected() {
        let (mut publisher, _factory, _rx) = connected();
        assert!(publisher
            .update_credentials(|c| c.stream_name = "other".into())
            .is_err());
        assert_eq!(publisher.credentials().stream_name, "");
    }

    #[test]
    fn test_negative_bitrate_rejected() {
        let (mut publisher, _factory, _rx) = connected();
        assert!(publisher.set_bitrate(BitrateKind::Max, -1).is_err());
        publisher.set_bitrate(BitrateKind::Max, 4000).unwrap();
        assert_eq!(publisher.bitrate().max_kbps, 4000);
    }

    #[test]
    fn test_failed_unpublish_stays_publishing() {
        let (mut publisher, factory, _rx) = connected();
        let track = LocalTrack::new(MediaKind::Audio, "mic");
        publisher.start(&[track], None, None).unwrap();

        factory.script(|b| b.fail_unpublish = true);
        assert!(publisher.stop().is_err());
        assert_eq!(publisher.state(), PublishState::Publishing);
        assert!(!factory.log().contains("publisher.disconnect"));
    }

    #[test]
    fn test_generation_changes_on_release() {
        let (mut publisher, _factory, _rx) = connected();
        let generation = publisher.generation();
        publisher.disconnect().unwrap();
        assert_eq!(publisher.state(), PublishState::Disconnected);
        assert!(publisher.generation() > generation);
        assert!(!publisher.has_transport());
    }
}
