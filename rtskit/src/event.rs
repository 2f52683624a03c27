//! Event system for session observers

use crate::subscribe::NdiOutput;
use futures::Stream;
use parking_lot::Mutex;
use rtskit_core::{
    CaptureState, MediaKind, PublishState, RemoteTrack, SessionSide, StatsReport, SubscribeState,
};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Events observers can receive from a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionEvent {
    /// Local capture of a medium changed state
    CaptureStateChanged {
        /// Medium
        kind: MediaKind,
        /// New state
        state: CaptureState,
    },
    /// Local preview mirroring changed
    MirrorChanged {
        /// Whether the preview is mirrored
        mirrored: bool,
    },
    /// Publish session changed state
    PublishStateChanged {
        /// Previous state
        from: PublishState,
        /// New state
        to: PublishState,
    },
    /// Subscribe session changed state
    SubscribeStateChanged {
        /// Previous state
        from: SubscribeState,
        /// New state
        to: SubscribeState,
    },
    /// Statistics report recorded
    Stats {
        /// Session the report belongs to
        side: SessionSide,
        /// The report
        report: StatsReport,
    },
    /// Viewer count of the stream changed
    ViewerCount {
        /// Session that reported it
        side: SessionSide,
        /// Viewer count
        count: u32,
    },
    /// Stream became active or inactive
    StreamActivity {
        /// Session that reported it
        side: SessionSide,
        /// Whether the stream is active
        active: bool,
    },
    /// A playout track was installed
    PlayoutTrack {
        /// The track
        track: RemoteTrack,
        /// Media id of the track
        mid: Option<String>,
    },
    /// A remote source was discovered
    SourceAdded {
        /// Source id, empty for the default source
        source_id: String,
    },
    /// A remote source went away
    SourceRemoved {
        /// Source id, empty for the default source
        source_id: String,
    },
    /// The source projected onto a playout track changed
    ProjectionChanged {
        /// Playout medium
        kind: MediaKind,
        /// Projected source, `None` when the slot is empty
        source_id: Option<String>,
    },
    /// Layers of the projected video source changed
    LayersChanged {
        /// Projected video source
        source_id: String,
        /// Selectable layer ids, `""` (automatic) first
        layer_ids: Vec<String>,
        /// Pinned layer, `""` for automatic
        active_layer_id: String,
    },
    /// NDI output of a subscribed medium changed
    NdiOutputChanged {
        /// Medium
        kind: MediaKind,
        /// New output state
        output: NdiOutput,
    },
    /// An operation failed outside a direct call
    Error {
        /// Operation that failed
        operation: String,
        /// Error message
        error: String,
        /// Whether the session can retry
        recoverable: bool,
    },
}

impl SessionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::CaptureStateChanged { .. } => "capture_state_changed",
            SessionEvent::MirrorChanged { .. } => "mirror_changed",
            SessionEvent::PublishStateChanged { .. } => "publish_state_changed",
            SessionEvent::SubscribeStateChanged { .. } => "subscribe_state_changed",
            SessionEvent::Stats { .. } => "stats",
            SessionEvent::ViewerCount { .. } => "viewer_count",
            SessionEvent::StreamActivity { .. } => "stream_activity",
            SessionEvent::PlayoutTrack { .. } => "playout_track",
            SessionEvent::SourceAdded { .. } => "source_added",
            SessionEvent::SourceRemoved { .. } => "source_removed",
            SessionEvent::ProjectionChanged { .. } => "projection_changed",
            SessionEvent::LayersChanged { .. } => "layers_changed",
            SessionEvent::NdiOutputChanged { .. } => "ndi_output_changed",
            SessionEvent::Error { .. } => "error",
        }
    }

    /// Check if this is a local capture event
    pub fn is_capture_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::CaptureStateChanged { .. } | SessionEvent::MirrorChanged { .. }
        )
    }

    /// Check if this is a publish session event
    pub fn is_publish_event(&self) -> bool {
        matches!(self, SessionEvent::PublishStateChanged { .. })
            || matches!(
                self,
                SessionEvent::ViewerCount { side: SessionSide::Publish, .. }
                    | SessionEvent::StreamActivity { side: SessionSide::Publish, .. }
            )
    }

    /// Check if this is a subscribe session event
    pub fn is_subscribe_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::SubscribeStateChanged { .. }
                | SessionEvent::PlayoutTrack { .. }
                | SessionEvent::NdiOutputChanged { .. }
                | SessionEvent::ViewerCount { side: SessionSide::Subscribe, .. }
                | SessionEvent::StreamActivity { side: SessionSide::Subscribe, .. }
        )
    }

    /// Check if this is a remote source event
    pub fn is_source_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::SourceAdded { .. }
                | SessionEvent::SourceRemoved { .. }
                | SessionEvent::ProjectionChanged { .. }
                | SessionEvent::LayersChanged { .. }
        )
    }

    /// Check if this is a statistics event
    pub fn is_stats_event(&self) -> bool {
        matches!(self, SessionEvent::Stats { .. })
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, SessionEvent::Error { .. })
    }
}

/// Fan-out of session events to every open [`EventStream`].
///
/// Clones share the same subscriber list.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>>,
}

impl EventHub {
    /// Create a hub without subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new stream receiving every later event
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        EventStream::new(rx)
    }

    /// Deliver an event to every open stream; closed streams are dropped
    pub fn emit(&self, event: SessionEvent) {
        let mut senders = self.senders.lock();
        debug!(
            "📡 Emitting {} to {} observers",
            event.event_type(),
            senders.len()
        );
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of streams still attached
    pub fn subscriber_count(&self) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }
}

/// Stream of session events for async iteration
#[derive(Debug)]
pub struct EventStream {
    /// Receiver for events
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<SessionEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Every event already queued
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Only yield events matching `filter`
    pub fn filtered(self, filter: EventFilter) -> FilteredEventStream {
        FilteredEventStream::new(self, filter)
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Stream for EventStream {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Event filter for selective event processing
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Whether to include capture events
    pub include_capture_events: bool,
    /// Whether to include publish events
    pub include_publish_events: bool,
    /// Whether to include subscribe events
    pub include_subscribe_events: bool,
    /// Whether to include source events
    pub include_source_events: bool,
    /// Whether to include statistics events
    pub include_stats_events: bool,
    /// Whether to include error events
    pub include_error_events: bool,
    /// Specific event types to include (if specified, overrides other filters)
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    fn none() -> Self {
        Self {
            include_capture_events: false,
            include_publish_events: false,
            include_subscribe_events: false,
            include_source_events: false,
            include_stats_events: false,
            include_error_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes all events
    pub fn all() -> Self {
        Self {
            include_capture_events: true,
            include_publish_events: true,
            include_subscribe_events: true,
            include_source_events: true,
            include_stats_events: true,
            include_error_events: true,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes only capture events
    pub fn capture_only() -> Self {
        Self {
            include_capture_events: true,
            ..Self::none()
        }
    }

    /// Create a filter that includes only publish events
    pub fn publish_only() -> Self {
        Self {
            include_publish_events: true,
            ..Self::none()
        }
    }

    /// Create a filter that includes only subscribe events
    pub fn subscribe_only() -> Self {
        Self {
            include_subscribe_events: true,
            ..Self::none()
        }
    }

    /// Create a filter that includes only source events
    pub fn source_only() -> Self {
        Self {
            include_source_events: true,
            ..Self::none()
        }
    }

    /// Create a filter that includes only statistics events
    pub fn stats_only() -> Self {
        Self {
            include_stats_events: true,
            ..Self::none()
        }
    }

    /// Create a filter that includes only error events
    pub fn errors_only() -> Self {
        Self {
            include_error_events: true,
            ..Self::none()
        }
    }

    /// Create a filter for specific event types
    pub fn specific(event_types: Vec<String>) -> Self {
        Self {
            specific_event_types: Some(event_types),
            ..Self::none()
        }
    }

    /// Check if an event should be included based on this filter
    pub fn should_include(&self, event: &SessionEvent) -> bool {
        if let Some(ref specific_types) = self.specific_event_types {
            return specific_types.iter().any(|t| t == event.event_type());
        }

        (self.include_capture_events && event.is_capture_event())
            || (self.include_publish_events && event.is_publish_event())
            || (self.include_subscribe_events && event.is_subscribe_event())
            || (self.include_source_events && event.is_source_event())
            || (self.include_stats_events && event.is_stats_event())
            || (self.include_error_events && event.is_error_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Filtered event stream that only yields events matching a filter
#[derive(Debug)]
pub struct FilteredEventStream {
    /// Underlying event stream
    stream: EventStream,
    /// Event filter
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Create a new filtered event stream
    pub fn new(stream: EventStream, filter: EventFilter) -> Self {
        Self { stream, filter }
    }

    /// Get the next event that matches the filter
    pub async fn next(&mut self) -> Option<SessionEvent> {
        while let Some(event) = self.stream.next().await {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Try to get the next filtered event without blocking
    pub fn try_next(&mut self) -> Result<Option<SessionEvent>, mpsc::error::TryRecvError> {
        while let Some(event) = self.stream.try_next()? {
            if self.filter.should_include(&event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Update the filter
    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
    }

    /// Get the current filter
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_added(id: &str) -> SessionEvent {
        SessionEvent::SourceAdded {
            source_id: id.to_string(),
        }
    }

    #[test]
    fn test_event_type_classification() {
        let capture = SessionEvent::CaptureStateChanged {
            kind: MediaKind::Video,
            state: CaptureState::IsCaptured,
        };
        assert!(capture.is_capture_event());
        assert!(!capture.is_source_event());

        let viewers = SessionEvent::ViewerCount {
            side: SessionSide::Subscribe,
            count: 4,
        };
        assert!(viewers.is_subscribe_event());
        assert!(!viewers.is_publish_event());

        assert!(source_added("cam").is_source_event());
        let error = SessionEvent::Error {
            operation: "start publishing".to_string(),
            error: "boom".to_string(),
            recoverable: true,
        };
        assert!(error.is_error_event());
        assert_eq!(error.event_type(), "error");
    }

    #[test]
    fn test_event_filter() {
        let publish = SessionEvent::PublishStateChanged {
            from: PublishState::Connected,
            to: PublishState::Publishing,
        };
        let source = source_added("");

        assert!(EventFilter::all().should_include(&publish));
        assert!(EventFilter::publish_only().should_include(&publish));
        assert!(!EventFilter::publish_only().should_include(&source));

        let specific = EventFilter::specific(vec!["source_added".to_string()]);
        assert!(specific.should_include(&source));
        assert!(!specific.should_include(&publish));
    }

    #[tokio::test]
    async fn test_hub_fans_out() {
        let hub = EventHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.emit(source_added("a"));
        assert_eq!(first.next().await, Some(source_added("a")));
        assert_eq!(second.next().await, Some(source_added("a")));

        drop(second);
        hub.emit(source_added("b"));
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(first.drain(), vec![source_added("b")]);
    }

    #[tokio::test]
    async fn test_filtered_event_stream() {
        let hub = EventHub::new();
        let mut filtered = hub.subscribe().filtered(EventFilter::source_only());

        hub.emit(SessionEvent::MirrorChanged { mirrored: true });
        hub.emit(source_added("cam"));

        assert_eq!(filtered.next().await, Some(source_added("cam")));

        hub.emit(SessionEvent::MirrorChanged { mirrored: false });
        assert!(filtered.try_next().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_stream_is_a_stream() {
        use futures::StreamExt;

        let hub = EventHub::new();
        let stream = hub.subscribe();
        hub.emit(source_added("x"));
        hub.emit(source_added("y"));
        drop(hub);

        let ids: Vec<_> = stream
            .map(|event| match event {
                SessionEvent::SourceAdded { source_id } => source_id,
                other => other.event_type().to_string(),
            })
            .collect()
            .await;
        assert_eq!(ids, vec!["x".to_string(), "y".to_string()]);
    }
}
