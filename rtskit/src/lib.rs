//! # RTS Kit - Real-Time Streaming Session Kit
//!
//! RTS Kit coordinates one real-time streaming session on top of a WebRTC
//! streaming SDK: picking capture devices, publishing local audio and video,
//! and subscribing to a stream made of several remote sources with simulcast
//! layer selection.
//!
//! ## Key Features
//!
//! - **Guarded state machines**: capture, publish and subscribe transitions are
//!   closed enums; every mutation is checked against the current state
//! - **Multi-source subscribe**: remote sources are tracked in a registry and
//!   projected onto the audio and video playout tracks
//! - **Layer selection**: simulcast layers of the projected video are reduced to
//!   one entry per quality and can be pinned or left automatic
//! - **Persisted settings**: credentials and every list selection survive restarts
//! - **Serialised control**: one control task applies caller commands and
//!   transport callbacks in order, late callbacks of released transports are dropped
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rtskit::{spawn_session, MediaSession, PublishState};
//! use rtskit_core::testing::FakeTransportFactory;
//! use rtskit_media::testing::FakeMediaBackend;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = MediaSession::builder()
//!         .transport(FakeTransportFactory::new())
//!         .media(FakeMediaBackend::standard())
//!         .build()?;
//!     let handle = spawn_session(session);
//!
//!     // Capture, connect, and publish as soon as the edge accepts us
//!     handle.call(|s| s.start_capture(true, true)).await??;
//!     handle.call(|s| s.connect_publisher()).await??;
//!     handle
//!         .wait_for_state(|state| state.publish == PublishState::Publishing)
//!         .await?;
//!
//!     let mut events = handle.events();
//!     while let Some(event) = events.next().await {
//!         println!("Session event: {:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use rtskit_core::{
    BitrateKind, BitrateSettings, CaptureState, CyclicSelection, ErrorCategory, LayerDescriptor,
    LocalTrack, MediaKind, ProjectionData, PublishCredentials, PublishOptions, PublishState,
    PublisherTransport, RemoteTrack, RtsError, RtsResult, SessionSide, SessionState,
    SessionTransport, SourceTrack, StatsReport, SubscribeCredentials, SubscribeOptions,
    SubscribeState, SubscriberTransport, TransportEnvelope, TransportEvent, TransportEventSink,
    TransportFactory,
};

pub use rtskit_media::{
    AudioCapture, AudioDevice, CameraFacing, Capability, CaptureController, CodecName,
    DeviceCatalog, MediaBackend, MediaError, PlaybackDevice, SelectionIndices, VideoCapture,
    VideoDevice,
};

pub use rtskit_diagnostics::{init_logging, StatsHistory, TimestampedStats, ViewerActivity};

// Public API modules
pub mod config;
pub mod event;
pub mod layer;
pub mod publish;
pub mod runtime;
pub mod session;
pub mod source;
pub mod subscribe;

// Re-export main API types
pub use config::{
    JsonFileSettings, MemorySettings, SessionConfig, SettingKey, SettingValue, SettingsStore,
    ValueSource,
};
pub use event::{EventFilter, EventHub, EventStream, FilteredEventStream, SessionEvent};
pub use layer::{filter_active_layers, LayerSelector};
pub use publish::PublishController;
pub use runtime::{spawn_session, SessionHandle};
pub use session::{MediaSession, MediaSessionBuilder, SessionSnapshot};
pub use source::{RegistrySnapshot, SourceInfo, SourceRegistry};
pub use subscribe::{NdiOutput, PlayoutTrack, SubscribeController};
