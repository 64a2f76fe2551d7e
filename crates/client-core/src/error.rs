//! Error types for the connection manager

use thiserror::Error;

use crate::media::MediaError;
use crate::signaling::SignalingError;

/// Result type for connection manager operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Broad grouping used by presentation layers to pick a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Capture permission or device problems
    Media,
    /// Rendezvous or negotiation problems
    Signaling,
    /// Caller passed something invalid
    Usage,
    /// Operation raced with teardown or disposal
    Lifecycle,
}

/// Errors surfaced by the connection manager
///
/// Every error is terminal for the attempt that produced it. Nothing is
/// retried internally; the manager stays usable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Media capture failed
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Rendezvous or negotiation failed
    #[error(transparent)]
    Signaling(#[from] SignalingError),

    /// Target identifier was empty after trimming
    #[error("Invalid target: identifier must not be empty")]
    InvalidTarget,

    /// Operation not allowed in the current state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// What was wrong
        message: String,
    },

    /// The attempt was cancelled by `disconnect()` before it completed
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// A negotiation step did not finish in time
    #[error("{operation} timed out after {duration_ms}ms")]
    NegotiationTimeout {
        /// Step that timed out
        operation: String,
        /// Configured limit
        duration_ms: u64,
    },
}

impl ConnectionError {
    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether this came from media capture
    pub fn is_media_error(&self) -> bool {
        matches!(self, ConnectionError::Media(_))
    }

    /// Whether this came from the rendezvous service or negotiation
    pub fn is_signaling_error(&self) -> bool {
        matches!(
            self,
            ConnectionError::Signaling(_) | ConnectionError::NegotiationTimeout { .. }
        )
    }

    /// Error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConnectionError::Media(_) => ErrorCategory::Media,
            ConnectionError::Signaling(_) | ConnectionError::NegotiationTimeout { .. } => {
                ErrorCategory::Signaling
            }
            ConnectionError::InvalidTarget => ErrorCategory::Usage,
            ConnectionError::InvalidState { .. } | ConnectionError::Cancelled => ErrorCategory::Lifecycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::signaling::SessionIdentifier;

    #[test]
    fn categories() {
        let denied: ConnectionError = MediaError::PermissionDenied { kind: MediaKind::Camera }.into();
        assert!(denied.is_media_error());
        assert_eq!(denied.category(), ErrorCategory::Media);
        assert_eq!(denied.to_string(), "Permission denied for camera capture");

        let unreachable: ConnectionError = SignalingError::PeerUnreachable {
            target: SessionIdentifier::new("peerB"),
        }
        .into();
        assert!(unreachable.is_signaling_error());
        assert_eq!(unreachable.category(), ErrorCategory::Signaling);

        assert_eq!(ConnectionError::InvalidTarget.category(), ErrorCategory::Usage);
        assert_eq!(ConnectionError::Cancelled.category(), ErrorCategory::Lifecycle);
        assert_eq!(
            ConnectionError::invalid_state("busy").to_string(),
            "Invalid state: busy"
        );
    }
}
