//! Boundary with the real-time streaming SDK
//!
//! The SDK owns connection establishment, SDP negotiation and media encoding.
//! This module defines the narrow surface the session consumes from it
//! ([`PublisherTransport`], [`SubscriberTransport`], [`TransportFactory`]) and
//! the callback surface the session exposes to it ([`TransportEventSink`]).
//!
//! Transport callbacks arrive on SDK threads. The sink never touches session
//! state directly: every callback is stamped with the side and generation of
//! the transport instance that produced it and queued as a
//! [`TransportEnvelope`] for the single consumer that owns the session.

use crate::credentials::{PublishCredentials, PublishOptions, SubscribeCredentials, SubscribeOptions};
use crate::error::RtsResult;
use crate::state::MediaKind;
use crate::track::{LayerDescriptor, LocalTrack, ProjectionData, RemoteTrack, SourceTrack};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Which session a transport instance or event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionSide {
    /// Publishing session
    Publish,
    /// Subscribing session
    Subscribe,
}

impl fmt::Display for SessionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionSide::Publish => f.write_str("publish"),
            SessionSide::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// A statistics report delivered by the transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Metric name to value (e.g. "rtt_ms", "bitrate_kbps")
    pub values: BTreeMap<String, f64>,
}

impl StatsReport {
    /// Build a report from name/value pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    /// Look up one metric
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Callbacks raised by the transport, as data
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection to the streaming edge established
    Connected,
    /// Connection attempt failed or the connection dropped
    ConnectionError {
        /// Reason reported by the transport
        reason: String,
    },
    /// Publisher started sending
    Publishing,
    /// Publisher failed to start sending
    PublishingError {
        /// Reason reported by the transport
        reason: String,
    },
    /// Subscriber started receiving
    Subscribed,
    /// Subscriber failed to start receiving
    SubscribingError {
        /// Reason reported by the transport
        reason: String,
    },
    /// Periodic statistics report
    StatsReport(StatsReport),
    /// Current viewer count of the stream
    ViewerCount(u32),
    /// Stream became active
    Active,
    /// Stream became inactive
    Inactive,
    /// A playout track was created by the subscriber
    Track {
        /// The playout track
        track: RemoteTrack,
        /// Media id of the track, when negotiated
        mid: Option<String>,
    },
    /// A remote source started publishing
    SourceAdded {
        /// Source ID, empty for the default source
        source_id: String,
        /// Tracks offered by the source
        tracks: Vec<SourceTrack>,
    },
    /// A remote source stopped publishing
    SourceRemoved {
        /// Source ID, empty for the default source
        source_id: String,
    },
    /// Simulcast layers changed for a media id
    Layers {
        /// Media id the layers belong to
        mid: String,
        /// Layers currently being sent
        active: Vec<LayerDescriptor>,
        /// Encoding ids currently not being sent
        inactive: Vec<String>,
    },
}

impl TransportEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            TransportEvent::Connected => "connected",
            TransportEvent::ConnectionError { .. } => "connection_error",
            TransportEvent::Publishing => "publishing",
            TransportEvent::PublishingError { .. } => "publishing_error",
            TransportEvent::Subscribed => "subscribed",
            TransportEvent::SubscribingError { .. } => "subscribing_error",
            TransportEvent::StatsReport(_) => "stats_report",
            TransportEvent::ViewerCount(_) => "viewer_count",
            TransportEvent::Active => "active",
            TransportEvent::Inactive => "inactive",
            TransportEvent::Track { .. } => "track",
            TransportEvent::SourceAdded { .. } => "source_added",
            TransportEvent::SourceRemoved { .. } => "source_removed",
            TransportEvent::Layers { .. } => "layers",
        }
    }
}

/// A transport event stamped with its origin
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEnvelope {
    /// Side of the transport that raised the event
    pub side: SessionSide,
    /// Generation of the transport instance that raised the event
    pub generation: u64,
    /// The event itself
    pub event: TransportEvent,
}

/// Callback surface handed to a transport instance.
///
/// Cheap to clone; every clone queues into the same session.
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    side: SessionSide,
    generation: u64,
    tx: mpsc::UnboundedSender<TransportEnvelope>,
}

impl TransportEventSink {
    /// Create a sink for one transport instance
    pub fn new(
        side: SessionSide,
        generation: u64,
        tx: mpsc::UnboundedSender<TransportEnvelope>,
    ) -> Self {
        Self {
            side,
            generation,
            tx,
        }
    }

    /// Side this sink reports for
    pub fn side(&self) -> SessionSide {
        self.side
    }

    /// Generation stamped on every event
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event. Returns false if the session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        debug!(
            "📡 Queueing {} event {} (generation {})",
            self.side,
            event.event_type(),
            self.generation
        );
        let envelope = TransportEnvelope {
            side: self.side,
            generation: self.generation,
            event,
        };
        if self.tx.send(envelope).is_err() {
            warn!("Session dropped, discarding {} transport event", self.side);
            return false;
        }
        true
    }

    /// Connection established
    pub fn on_connected(&self) -> bool {
        self.emit(TransportEvent::Connected)
    }

    /// Connection failed
    pub fn on_connection_error(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::ConnectionError {
            reason: reason.into(),
        })
    }

    /// Publisher is sending
    pub fn on_publishing(&self) -> bool {
        self.emit(TransportEvent::Publishing)
    }

    /// Publisher failed to send
    pub fn on_publishing_error(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::PublishingError {
            reason: reason.into(),
        })
    }

    /// Subscriber is receiving
    pub fn on_subscribed(&self) -> bool {
        self.emit(TransportEvent::Subscribed)
    }

    /// Subscriber failed to receive
    pub fn on_subscribing_error(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::SubscribingError {
            reason: reason.into(),
        })
    }

    /// Statistics report
    pub fn on_stats_report(&self, report: StatsReport) -> bool {
        self.emit(TransportEvent::StatsReport(report))
    }

    /// Viewer count changed
    pub fn on_viewer_count(&self, count: u32) -> bool {
        self.emit(TransportEvent::ViewerCount(count))
    }

    /// Stream became active
    pub fn on_active(&self) -> bool {
        self.emit(TransportEvent::Active)
    }

    /// Stream became inactive
    pub fn on_inactive(&self) -> bool {
        self.emit(TransportEvent::Inactive)
    }

    /// Playout track created
    pub fn on_track(&self, track: RemoteTrack, mid: Option<String>) -> bool {
        self.emit(TransportEvent::Track { track, mid })
    }

    /// Remote source appeared
    pub fn on_source_added(&self, source_id: impl Into<String>, tracks: Vec<SourceTrack>) -> bool {
        self.emit(TransportEvent::SourceAdded {
            source_id: source_id.into(),
            tracks,
        })
    }

    /// Remote source disappeared
    pub fn on_source_removed(&self, source_id: impl Into<String>) -> bool {
        self.emit(TransportEvent::SourceRemoved {
            source_id: source_id.into(),
        })
    }

    /// Layers changed for a media id
    pub fn on_layers(
        &self,
        mid: impl Into<String>,
        active: Vec<LayerDescriptor>,
        inactive: Vec<String>,
    ) -> bool {
        self.emit(TransportEvent::Layers {
            mid: mid.into(),
            active,
            inactive,
        })
    }
}

/// Operations shared by publisher and subscriber instances
pub trait SessionTransport: Send + fmt::Debug {
    /// Request a connection. Accept/reject is synchronous, the outcome is
    /// reported later through the sink.
    fn connect(&mut self) -> bool;

    /// Close the connection
    fn disconnect(&mut self) -> RtsResult<()>;

    /// Whether the transport reports an open connection
    fn is_connected(&self) -> bool;

    /// Enable periodic statistics every `interval_ms`; `0` disables them
    fn get_stats(&mut self, interval_ms: u64);
}

/// Publishing side of the SDK
pub trait PublisherTransport: SessionTransport {
    /// Apply credentials before connecting
    fn set_credentials(&mut self, credentials: &PublishCredentials);

    /// Apply options before publishing
    fn set_options(&mut self, options: &PublishOptions);

    /// Attach a captured track
    fn add_track(&mut self, track: &LocalTrack);

    /// Start sending
    fn publish(&mut self) -> RtsResult<()>;

    /// Stop sending
    fn unpublish(&mut self) -> RtsResult<()>;

    /// Whether the transport is sending
    fn is_publishing(&self) -> bool;
}

/// Subscribing side of the SDK
pub trait SubscriberTransport: SessionTransport {
    /// Apply credentials before connecting
    fn set_credentials(&mut self, credentials: &SubscribeCredentials);

    /// Apply options before subscribing
    fn set_options(&mut self, options: &SubscribeOptions);

    /// Start receiving
    fn subscribe(&mut self) -> RtsResult<()>;

    /// Stop receiving
    fn unsubscribe(&mut self) -> RtsResult<()>;

    /// Whether the transport is receiving
    fn is_subscribed(&self) -> bool;

    /// Ask for an additional empty playout track; it arrives through `on_track`
    fn add_remote_track(&mut self, kind: MediaKind) -> bool;

    /// Map tracks of a remote source onto playout media ids
    fn project(&mut self, source_id: &str, projection: &[ProjectionData]) -> bool;

    /// Forward one layer of the projected video, `None` for automatic
    fn select(&mut self, layer: Option<&LayerDescriptor>) -> bool;

    /// Enable (with a name) or disable NDI output of a playout track
    fn set_ndi_output(&mut self, track_id: &str, name: Option<&str>) -> RtsResult<()>;
}

/// Creates fresh transport instances for each connection attempt
pub trait TransportFactory: Send + fmt::Debug {
    /// New publisher reporting through `sink`
    fn create_publisher(&mut self, sink: TransportEventSink) -> Box<dyn PublisherTransport>;

    /// New subscriber reporting through `sink`
    fn create_subscriber(&mut self, sink: TransportEventSink) -> Box<dyn SubscriberTransport>;
}
