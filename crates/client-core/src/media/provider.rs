//! Media source provider abstraction
//!
//! This module defines the trait the connection manager uses to obtain local
//! media from the host platform. A provider wraps the platform's
//! camera/microphone and screen-capture facilities.

use async_trait::async_trait;
use thiserror::Error;

use super::handle::{MediaHandle, MediaKind};

/// Media capture errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The user (or platform policy) refused access
    #[error("Permission denied for {kind} capture")]
    PermissionDenied {
        /// Requested kind
        kind: MediaKind,
    },

    /// No usable device, or the device is held by someone else
    #[error("{kind} device unavailable: {reason}")]
    DeviceUnavailable {
        /// Requested kind
        kind: MediaKind,
        /// Platform reason
        reason: String,
    },
}

impl MediaError {
    /// Kind of media the failed request was for
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaError::PermissionDenied { kind } => *kind,
            MediaError::DeviceUnavailable { kind, .. } => *kind,
        }
    }
}

/// Result type for media operations
pub type MediaResult<T> = std::result::Result<T, MediaError>;

/// Acquires local media handles from the host platform
///
/// The first acquisition of each kind may trigger a platform permission
/// prompt. That prompt is user-mediated: callers must never retry a denied
/// acquisition automatically.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSourceProvider: Send + Sync {
    /// Acquire a new media handle of the given kind
    async fn acquire(&self, kind: MediaKind) -> MediaResult<MediaHandle>;

    /// Stop every track in `handle`. Idempotent.
    fn release(&self, handle: &MediaHandle) {
        handle.release();
    }
}
