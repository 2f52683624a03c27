//! Error types for RTS Kit

use crate::transport::SessionSide;
use thiserror::Error;

/// Main error type for RTS Kit operations
#[derive(Error, Debug)]
pub enum RtsError {
    /// A state guard rejected the operation; nothing was mutated
    #[error("Cannot {operation}: {reason}")]
    Precondition {
        /// Operation that was rejected
        operation: String,
        /// Guard that rejected it
        reason: String,
    },

    /// A device, capability or codec list was empty
    #[error("Resource not available: {resource}")]
    ResourceUnavailable {
        /// Resource that was missing
        resource: String,
    },

    /// The transport rejected or failed a request
    #[error("Transport error during {operation}: {reason}")]
    Transport {
        /// Operation that failed
        operation: String,
        /// Reason reported by the transport
        reason: String,
    },

    /// A transport event arrived for a session instance that no longer exists
    #[error("Stale {side} event (generation {event_generation}, current {current_generation})")]
    StaleEvent {
        /// Session side the event was addressed to
        side: SessionSide,
        /// Generation stamped on the event
        event_generation: u64,
        /// Generation of the live session instance
        current_generation: u64,
    },

    /// Remote source is not known to the registry
    #[error("Source not found: {source_id:?}")]
    SourceNotFound {
        /// Source ID that was requested
        source_id: String,
    },

    /// Layer is not active on the projected video source
    #[error("Layer not found: {layer_id:?}")]
    LayerNotFound {
        /// Layer ID that was requested
        layer_id: String,
    },

    /// Media capture or device error
    #[error("Media error: {reason}")]
    Media {
        /// Reason for media error
        reason: String,
    },

    /// Settings persistence failed
    #[error("Settings error: {reason}")]
    Settings {
        /// Reason for failure
        reason: String,
    },

    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        /// Underlying error
        #[from]
        source: std::io::Error,
    },

    /// (De)serialization failed
    #[error("Serialization error: {source}")]
    Serialization {
        /// Underlying error
        #[from]
        source: serde_json::Error,
    },

    /// The session control loop has shut down
    #[error("Session control loop is closed")]
    ControlLoopClosed,
}

/// Result type alias for RTS Kit operations
pub type RtsResult<T> = Result<T, RtsError>;

impl RtsError {
    /// Shorthand for a [`RtsError::Precondition`]
    pub fn precondition(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        RtsError::Precondition {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`RtsError::Transport`]
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        RtsError::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`RtsError::ResourceUnavailable`]
    pub fn unavailable(resource: impl Into<String>) -> Self {
        RtsError::ResourceUnavailable {
            resource: resource.into(),
        }
    }

    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            RtsError::Precondition { .. } => "PRECONDITION_FAILED",
            RtsError::ResourceUnavailable { .. } => "RESOURCE_UNAVAILABLE",
            RtsError::Transport { .. } => "TRANSPORT_ERROR",
            RtsError::StaleEvent { .. } => "STALE_EVENT",
            RtsError::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            RtsError::LayerNotFound { .. } => "LAYER_NOT_FOUND",
            RtsError::Media { .. } => "MEDIA_ERROR",
            RtsError::Settings { .. } => "SETTINGS_ERROR",
            RtsError::Io { .. } => "IO_ERROR",
            RtsError::Serialization { .. } => "SERIALIZATION_ERROR",
            RtsError::ControlLoopClosed => "CONTROL_LOOP_CLOSED",
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            RtsError::Precondition { .. }
            | RtsError::SourceNotFound { .. }
            | RtsError::LayerNotFound { .. } => ErrorCategory::Precondition,
            RtsError::ResourceUnavailable { .. } | RtsError::Media { .. } => {
                ErrorCategory::ResourceUnavailable
            }
            RtsError::Transport { .. } => ErrorCategory::Transport,
            RtsError::StaleEvent { .. } => ErrorCategory::Stale,
            RtsError::Settings { .. } | RtsError::Io { .. } | RtsError::Serialization { .. } => {
                ErrorCategory::Storage
            }
            RtsError::ControlLoopClosed => ErrorCategory::Runtime,
        }
    }

    /// Check if error is recoverable
    ///
    /// Every error leaves the session in a well-defined state, so only a dead
    /// control loop is not retryable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RtsError::ControlLoopClosed)
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// State guard violations
    Precondition,
    /// Empty device, capability or codec lists
    ResourceUnavailable,
    /// Connect, publish, subscribe or layer selection failures
    Transport,
    /// Late results for superseded operations
    Stale,
    /// Settings persistence failures
    Storage,
    /// Control loop failures
    Runtime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let error = RtsError::precondition("set url", "publisher is connected");
        assert_eq!(error.category(), ErrorCategory::Precondition);
        assert_eq!(error.error_code(), "PRECONDITION_FAILED");
        assert!(error.is_recoverable());

        let stale = RtsError::StaleEvent {
            side: SessionSide::Subscribe,
            event_generation: 1,
            current_generation: 2,
        };
        assert_eq!(stale.category(), ErrorCategory::Stale);

        assert!(!RtsError::ControlLoopClosed.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = RtsError::transport("connect", "bad token");
        assert_eq!(error.to_string(), "Transport error during connect: bad token");

        let error = RtsError::SourceNotFound {
            source_id: String::new(),
        };
        assert_eq!(error.to_string(), "Source not found: \"\"");
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = RtsError::from(io_error);
        assert_eq!(error.category(), ErrorCategory::Storage);
    }
}
