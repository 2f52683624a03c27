//! Media error types
//!
//! Capture and device failures. Guard rejections convert into
//! [`RtsError::Precondition`] so callers see one taxonomy across crates.

use rtskit_core::{MediaKind, RtsError};
use thiserror::Error;

/// Main error type for device and capture operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// Device list was empty
    #[error("No {list} available")]
    EmptyList {
        /// Which list was empty
        list: String,
    },

    /// Device not found error
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// A live video switch would involve an NDI source
    #[error("Cannot switch video source from {from} to {to} while video is capturing (NDI)")]
    NdiSwitchWhileCapturing {
        /// Active device
        from: String,
        /// Requested device
        to: String,
    },

    /// Operation is locked while the medium is capturing
    #[error("Cannot {operation} while {medium} is capturing")]
    CaptureBusy {
        /// Medium that is capturing
        medium: MediaKind,
        /// Rejected operation
        operation: String,
    },

    /// No source is selected for the medium
    #[error("No {medium} source selected")]
    MissingSource {
        /// Medium without a source
        medium: MediaKind,
    },

    /// A non-NDI video device needs a capability to capture
    #[error("No capability selected for video source {device}")]
    MissingCapability {
        /// Device that needs a capability
        device: String,
    },

    /// The backend could not switch the live capture to another device
    #[error("Camera switch to {device} failed: {reason}")]
    SwitchFailed {
        /// Requested device
        device: String,
        /// Failure reason
        reason: String,
    },

    /// The platform backend failed
    #[error("Media backend error: {reason}")]
    Backend {
        /// Failure reason
        reason: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Shorthand for a [`MediaError::EmptyList`]
    pub fn empty(list: impl Into<String>) -> Self {
        MediaError::EmptyList { list: list.into() }
    }

    /// Shorthand for a [`MediaError::Backend`]
    pub fn backend(reason: impl Into<String>) -> Self {
        MediaError::Backend {
            reason: reason.into(),
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::EmptyList { .. } => true,
            MediaError::DeviceNotFound { .. } => true,
            MediaError::NdiSwitchWhileCapturing { .. } => true,
            MediaError::CaptureBusy { .. } => true,
            MediaError::MissingSource { .. } => true,
            MediaError::MissingCapability { .. } => true,
            MediaError::SwitchFailed { .. } => true,
            MediaError::Backend { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::EmptyList { .. } | MediaError::DeviceNotFound { .. } => {
                ErrorCategory::Device
            }
            MediaError::NdiSwitchWhileCapturing { .. }
            | MediaError::CaptureBusy { .. }
            | MediaError::MissingSource { .. }
            | MediaError::MissingCapability { .. } => ErrorCategory::State,
            MediaError::SwitchFailed { .. } | MediaError::Backend { .. } => ErrorCategory::Backend,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Device lists and lookup
    Device,
    /// Capture state guards
    State,
    /// Platform backend failures
    Backend,
}

impl From<MediaError> for RtsError {
    fn from(error: MediaError) -> Self {
        match error.category() {
            ErrorCategory::State => {
                let operation = match &error {
                    MediaError::CaptureBusy { operation, .. } => operation.clone(),
                    MediaError::NdiSwitchWhileCapturing { .. } => "switch video source".to_string(),
                    _ => "start capture".to_string(),
                };
                RtsError::Precondition {
                    operation,
                    reason: error.to_string(),
                }
            }
            ErrorCategory::Device => RtsError::ResourceUnavailable {
                resource: error.to_string(),
            },
            ErrorCategory::Backend => RtsError::Media {
                reason: error.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtskit_core::ErrorCategory as RtsCategory;

    #[test]
    fn test_guard_errors_convert_to_precondition() {
        let error = MediaError::NdiSwitchWhileCapturing {
            from: "Camera:Front".to_string(),
            to: "NDI:Studio".to_string(),
        };
        assert_eq!(error.category(), ErrorCategory::State);
        let rts: RtsError = error.into();
        assert_eq!(rts.category(), RtsCategory::Precondition);

        let busy = MediaError::CaptureBusy {
            medium: MediaKind::Audio,
            operation: "change audio source".to_string(),
        };
        assert_eq!(busy.to_string(), "Cannot change audio source while audio is capturing");
        match RtsError::from(busy) {
            RtsError::Precondition { operation, .. } => assert_eq!(operation, "change audio source"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_other_errors_convert() {
        let rts: RtsError = MediaError::empty("video sources").into();
        assert_eq!(rts.category(), RtsCategory::ResourceUnavailable);

        let rts: RtsError = MediaError::backend("camera service died").into();
        assert!(matches!(rts, RtsError::Media { .. }));
        assert!(!MediaError::backend("x").is_recoverable());
    }
}
