//! Closed state machines for capture, publish and subscribe
//!
//! Each machine is a small enum with an explicit transition table. The
//! session holds one value per machine in [`SessionState`], so a machine can
//! only ever be in one of its enumerated states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media carried by a device, track or projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MediaKind {
    /// Audio media
    Audio,
    /// Video media
    Video,
}

impl MediaKind {
    /// Lower-case name as used by the transport ("audio" / "video")
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local capture lifecycle for one medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureState {
    /// No capture running
    #[default]
    NotCaptured,
    /// Capture requested, prerequisites being checked
    TryCapture,
    /// Capture running
    IsCaptured,
}

impl CaptureState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: CaptureState) -> bool {
        use CaptureState::*;
        matches!(
            (self, next),
            (NotCaptured, TryCapture)
                | (TryCapture, IsCaptured)
                | (TryCapture, NotCaptured)
                | (IsCaptured, NotCaptured)
        )
    }
}

/// Publish session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PublishState {
    /// No connection
    #[default]
    Disconnected,
    /// Connect requested, waiting for the transport
    Connecting,
    /// Connected to the streaming edge, not sending
    Connected,
    /// Sending local media
    Publishing,
}

impl PublishState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: PublishState) -> bool {
        use PublishState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Publishing)
                | (Connected, Disconnected)
                | (Publishing, Connected)
                | (Publishing, Disconnected)
        )
    }
}

/// Subscribe session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubscribeState {
    /// No connection
    #[default]
    Disconnected,
    /// Connect requested, waiting for the transport
    Connecting,
    /// Connected to the streaming edge, not receiving
    Connected,
    /// Receiving remote media
    Subscribing,
}

impl SubscribeState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: SubscribeState) -> bool {
        use SubscribeState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Subscribing)
                | (Connected, Disconnected)
                | (Subscribing, Connected)
                | (Subscribing, Disconnected)
        )
    }
}

macro_rules! impl_state_display {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        })*
    };
}

impl_state_display!(CaptureState, PublishState, SubscribeState);

/// Combined state of every machine in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Audio capture state
    pub audio_capture: CaptureState,
    /// Video capture state
    pub video_capture: CaptureState,
    /// Publish state
    pub publish: PublishState,
    /// Subscribe state
    pub subscribe: SubscribeState,
}

impl SessionState {
    /// Capture state for the given medium
    pub fn capture(&self, kind: MediaKind) -> CaptureState {
        match kind {
            MediaKind::Audio => self.audio_capture,
            MediaKind::Video => self.video_capture,
        }
    }

    /// Whether any local capture is running
    pub fn is_capturing(&self) -> bool {
        self.audio_capture == CaptureState::IsCaptured
            || self.video_capture == CaptureState::IsCaptured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_transitions() {
        use PublishState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Disconnected));
        assert!(Publishing.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Publishing));
        assert!(!Connecting.can_transition_to(Publishing));
    }

    #[test]
    fn test_capture_transitions() {
        use CaptureState::*;
        assert!(NotCaptured.can_transition_to(TryCapture));
        assert!(TryCapture.can_transition_to(IsCaptured));
        assert!(!NotCaptured.can_transition_to(IsCaptured));
    }

    #[test]
    fn test_session_state_capture_lookup() {
        let state = SessionState {
            video_capture: CaptureState::IsCaptured,
            ..Default::default()
        };
        assert_eq!(state.capture(MediaKind::Video), CaptureState::IsCaptured);
        assert_eq!(state.capture(MediaKind::Audio), CaptureState::NotCaptured);
        assert!(state.is_capturing());
    }
}
