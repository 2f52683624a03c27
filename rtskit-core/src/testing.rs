//! Scriptable in-memory transports for tests
//!
//! [`FakeTransportFactory`] hands out [`FakePublisher`] / [`FakeSubscriber`]
//! instances that record every call into a shared [`CallLog`] and answer
//! according to a [`FakeBehavior`] script. The sinks handed to the most
//! recent instances are kept so tests can raise transport callbacks.

use crate::credentials::{PublishCredentials, PublishOptions, SubscribeCredentials, SubscribeOptions};
use crate::error::{RtsError, RtsResult};
use crate::state::MediaKind;
use crate::track::{LayerDescriptor, LocalTrack, ProjectionData};
use crate::transport::{
    PublisherTransport, SessionSide, SessionTransport, SubscriberTransport, TransportEvent,
    TransportEventSink, TransportFactory,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered record of calls made on fake transports
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call
    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    /// Copy of every call so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Whether a call was recorded
    pub fn contains(&self, call: &str) -> bool {
        self.calls.lock().iter().any(|c| c == call)
    }

    /// Number of times a call was recorded
    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Forget every call
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// How fake transports answer requests
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    /// `connect()` accepts the request
    pub accept_connect: bool,
    /// Raise `on_connected` as soon as a connect request is accepted
    pub auto_connect: bool,
    /// `publish()` fails
    pub fail_publish: bool,
    /// `unpublish()` fails
    pub fail_unpublish: bool,
    /// `subscribe()` fails
    pub fail_subscribe: bool,
    /// `unsubscribe()` fails
    pub fail_unsubscribe: bool,
    /// `disconnect()` fails
    pub fail_disconnect: bool,
    /// `project()` succeeds
    pub accept_project: bool,
    /// `select()` succeeds
    pub accept_select: bool,
    /// `add_remote_track()` succeeds
    pub accept_remote_track: bool,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            accept_connect: true,
            auto_connect: false,
            fail_publish: false,
            fail_unpublish: false,
            fail_subscribe: false,
            fail_unsubscribe: false,
            fail_disconnect: false,
            accept_project: true,
            accept_select: true,
            accept_remote_track: true,
        }
    }
}

/// Everything the fakes observed, shared with the test
#[derive(Debug, Default)]
pub struct FakeTransportState {
    /// Current script
    pub behavior: FakeBehavior,
    /// Sink of the most recent publisher
    pub publisher_sink: Option<TransportEventSink>,
    /// Sink of the most recent subscriber
    pub subscriber_sink: Option<TransportEventSink>,
    /// Publishers created so far
    pub publishers_created: usize,
    /// Subscribers created so far
    pub subscribers_created: usize,
    /// Last credentials applied to a publisher
    pub publish_credentials: Option<PublishCredentials>,
    /// Last options applied to a publisher
    pub publish_options: Option<PublishOptions>,
    /// Last credentials applied to a subscriber
    pub subscribe_credentials: Option<SubscribeCredentials>,
    /// Last options applied to a subscriber
    pub subscribe_options: Option<SubscribeOptions>,
    /// Tracks attached to the current publisher
    pub published_tracks: Vec<LocalTrack>,
    /// Every projection request, in order
    pub projections: Vec<(String, Vec<ProjectionData>)>,
    /// Every layer selection request, in order
    pub selected_layers: Vec<Option<LayerDescriptor>>,
    /// Every NDI output request, in order
    pub ndi_outputs: Vec<(String, Option<String>)>,
    /// Every statistics interval request, in order
    pub stats_requests: Vec<(SessionSide, u64)>,
    /// Every extra playout track request, in order
    pub remote_track_requests: Vec<MediaKind>,
}

/// Factory for fake transports
#[derive(Debug, Clone, Default)]
pub struct FakeTransportFactory {
    state: Arc<Mutex<FakeTransportState>>,
    log: CallLog,
}

impl FakeTransportFactory {
    /// Create a factory with the default (always succeeding) script
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared call log
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Change the script
    pub fn script(&self, f: impl FnOnce(&mut FakeBehavior)) {
        f(&mut self.state.lock().behavior);
    }

    /// Inspect what the fakes observed
    pub fn inspect<R>(&self, f: impl FnOnce(&FakeTransportState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Sink of the most recent publisher
    pub fn publisher_sink(&self) -> Option<TransportEventSink> {
        self.state.lock().publisher_sink.clone()
    }

    /// Sink of the most recent subscriber
    pub fn subscriber_sink(&self) -> Option<TransportEventSink> {
        self.state.lock().subscriber_sink.clone()
    }

    /// Raise an event from the most recent publisher
    pub fn emit_publisher(&self, event: TransportEvent) -> bool {
        self.publisher_sink().is_some_and(|sink| sink.emit(event))
    }

    /// Raise an event from the most recent subscriber
    pub fn emit_subscriber(&self, event: TransportEvent) -> bool {
        self.subscriber_sink().is_some_and(|sink| sink.emit(event))
    }
}

impl TransportFactory for FakeTransportFactory {
    fn create_publisher(&mut self, sink: TransportEventSink) -> Box<dyn PublisherTransport> {
        self.log.record("factory.create_publisher");
        let mut state = self.state.lock();
        state.publishers_created += 1;
        state.published_tracks.clear();
        state.publisher_sink = Some(sink.clone());
        Box::new(FakePublisher {
            state: Arc::clone(&self.state),
            log: self.log.clone(),
            sink,
            connected: false,
            publishing: false,
        })
    }

    fn create_subscriber(&mut self, sink: TransportEventSink) -> Box<dyn SubscriberTransport> {
        self.log.record("factory.create_subscriber");
        let mut state = self.state.lock();
        state.subscribers_created += 1;
        state.subscriber_sink = Some(sink.clone());
        Box::new(FakeSubscriber {
            state: Arc::clone(&self.state),
            log: self.log.clone(),
            sink,
            connected: false,
            subscribed: false,
        })
    }
}

fn scripted_failure(operation: &str) -> RtsError {
    RtsError::transport(operation, "scripted failure")
}

/// Fake publisher instance
#[derive(Debug)]
pub struct FakePublisher {
    state: Arc<Mutex<FakeTransportState>>,
    log: CallLog,
    sink: TransportEventSink,
    connected: bool,
    publishing: bool,
}

impl SessionTransport for FakePublisher {
    fn connect(&mut self) -> bool {
        self.log.record("publisher.connect");
        let behavior = self.state.lock().behavior.clone();
        if !behavior.accept_connect {
            return false;
        }
        self.connected = true;
        if behavior.auto_connect {
            self.sink.on_connected();
        }
        true
    }

    fn disconnect(&mut self) -> RtsResult<()> {
        self.log.record("publisher.disconnect");
        if self.state.lock().behavior.fail_disconnect {
            return Err(scripted_failure("disconnect"));
        }
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_stats(&mut self, interval_ms: u64) {
        self.log.record(format!("publisher.get_stats({interval_ms})"));
        self.state
            .lock()
            .stats_requests
            .push((SessionSide::Publish, interval_ms));
    }
}

impl PublisherTransport for FakePublisher {
    fn set_credentials(&mut self, credentials: &PublishCredentials) {
        self.log.record("publisher.set_credentials");
        self.state.lock().publish_credentials = Some(credentials.clone());
    }

    fn set_options(&mut self, options: &PublishOptions) {
        self.log.record("publisher.set_options");
        self.state.lock().publish_options = Some(options.clone());
    }

    fn add_track(&mut self, track: &LocalTrack) {
        self.log.record(format!("publisher.add_track({})", track.kind()));
        self.state.lock().published_tracks.push(track.clone());
    }

    fn publish(&mut self) -> RtsResult<()> {
        self.log.record("publisher.publish");
        if self.state.lock().behavior.fail_publish {
            return Err(scripted_failure("publish"));
        }
        self.publishing = true;
        Ok(())
    }

    fn unpublish(&mut self) -> RtsResult<()> {
        self.log.record("publisher.unpublish");
        if self.state.lock().behavior.fail_unpublish {
            return Err(scripted_failure("unpublish"));
        }
        self.publishing = false;
        Ok(())
    }

    fn is_publishing(&self) -> bool {
        self.publishing
    }
}

/// Fake subscriber instance
#[derive(Debug)]
pub struct FakeSubscriber {
    state: Arc<Mutex<FakeTransportState>>,
    log: CallLog,
    sink: TransportEventSink,
    connected: bool,
    subscribed: bool,
}

impl SessionTransport for FakeSubscriber {
    fn connect(&mut self) -> bool {
        self.log.record("subscriber.connect");
        let behavior = self.state.lock().behavior.clone();
        if !behavior.accept_connect {
            return false;
        }
        self.connected = true;
        if behavior.auto_connect {
            self.sink.on_connected();
        }
        true
    }

    fn disconnect(&mut self) -> RtsResult<()> {
        self.log.record("subscriber.disconnect");
        if self.state.lock().behavior.fail_disconnect {
            return Err(scripted_failure("disconnect"));
        }
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn get_stats(&mut self, interval_ms: u64) {
        self.log.record(format!("subscriber.get_stats({interval_ms})"));
        self.state
            .lock()
            .stats_requests
            .push((SessionSide::Subscribe, interval_ms));
    }
}

impl SubscriberTransport for FakeSubscriber {
    fn set_credentials(&mut self, credentials: &SubscribeCredentials) {
        self.log.record("subscriber.set_credentials");
        self.state.lock().subscribe_credentials = Some(credentials.clone());
    }

    fn set_options(&mut self, options: &SubscribeOptions) {
        self.log.record("subscriber.set_options");
        self.state.lock().subscribe_options = Some(options.clone());
    }

    fn subscribe(&mut self) -> RtsResult<()> {
        self.log.record("subscriber.subscribe");
        if self.state.lock().behavior.fail_subscribe {
            return Err(scripted_failure("subscribe"));
        }
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) -> RtsResult<()> {
        self.log.record("subscriber.unsubscribe");
        if self.state.lock().behavior.fail_unsubscribe {
            return Err(scripted_failure("unsubscribe"));
        }
        self.subscribed = false;
        Ok(())
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    fn add_remote_track(&mut self, kind: MediaKind) -> bool {
        self.log.record(format!("subscriber.add_remote_track({kind})"));
        let mut state = self.state.lock();
        state.remote_track_requests.push(kind);
        state.behavior.accept_remote_track
    }

    fn project(&mut self, source_id: &str, projection: &[ProjectionData]) -> bool {
        self.log.record(format!("subscriber.project({source_id:?})"));
        let mut state = self.state.lock();
        state
            .projections
            .push((source_id.to_string(), projection.to_vec()));
        state.behavior.accept_project
    }

    fn select(&mut self, layer: Option<&LayerDescriptor>) -> bool {
        let id = layer.map(LayerDescriptor::id).unwrap_or_default();
        self.log.record(format!("subscriber.select({id:?})"));
        let mut state = self.state.lock();
        state.selected_layers.push(layer.cloned());
        state.behavior.accept_select
    }

    fn set_ndi_output(&mut self, track_id: &str, name: Option<&str>) -> RtsResult<()> {
        self.log.record(format!("subscriber.set_ndi_output({track_id})"));
        self.state
            .lock()
            .ndi_outputs
            .push((track_id.to_string(), name.map(str::to_string)));
        Ok(())
    }
}
