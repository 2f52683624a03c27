//! # RTS Kit Core
//!
//! Shared building blocks for the RTS Kit session: the error taxonomy, the
//! closed state machines, the generic cyclic selection used by every device
//! and codec list, credential/option value types and the boundary traits of
//! the real-time streaming SDK.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod credentials;
pub mod error;
pub mod selection;
pub mod state;
pub mod track;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use credentials::{
    BitrateKind, BitrateSettings, PublishCredentials, PublishOptions, SubscribeCredentials,
    SubscribeOptions,
};
pub use error::{ErrorCategory, RtsError, RtsResult};
pub use selection::{clamp_index, next_index, next_index_matching, CyclicSelection};
pub use state::{CaptureState, MediaKind, PublishState, SessionState, SubscribeState};
pub use track::{LayerDescriptor, LocalTrack, ProjectionData, RemoteTrack, SourceTrack};
pub use transport::{
    PublisherTransport, SessionSide, SessionTransport, StatsReport, SubscriberTransport,
    TransportEnvelope, TransportEvent, TransportEventSink, TransportFactory,
};
