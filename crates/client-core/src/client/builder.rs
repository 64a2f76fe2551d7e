//! Builder for creating connection managers
//!
//! # Examples
//!
//! ```rust
//! use peerlink_client_core::{ConnectionManagerBuilder, ConnectionStatus};
//! use peerlink_client_core::media::MockMediaProvider;
//! use peerlink_client_core::signaling::LoopbackRendezvous;
//! use std::sync::Arc;
//!
//! let rendezvous = LoopbackRendezvous::new();
//! let manager = ConnectionManagerBuilder::new()
//!     .label("alice")
//!     .auto_answer(false)
//!     .media_provider(Arc::new(MockMediaProvider::new()))
//!     .signaling(Arc::new(rendezvous.identity()))
//!     .build()
//!     .expect("valid configuration");
//!
//! assert_eq!(manager.status(), ConnectionStatus::Disconnected);
//! ```

use std::sync::Arc;

use tracing::warn;

use super::config::ManagerConfig;
use super::manager::ConnectionManager;
use crate::error::{ConnectionError, ConnectionResult};
use crate::media::{create_platform_provider, MediaKind, MediaSourceProvider};
use crate::signaling::SignalingIdentity;

/// Fluent builder for [`ConnectionManager`]
///
/// A signaling identity is required. The media provider falls back to
/// [`create_platform_provider`] when none is given.
#[derive(Default)]
pub struct ConnectionManagerBuilder {
    config: ManagerConfig,
    media: Option<Arc<dyn MediaSourceProvider>>,
    identity: Option<Arc<dyn SignalingIdentity>>,
}

impl ConnectionManagerBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the endpoint label used in logs
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    /// Set the media kind `connect()` acquires
    pub fn default_media_kind(mut self, kind: MediaKind) -> Self {
        self.config.default_media_kind = kind;
        self
    }

    /// Answer inbound offers automatically
    pub fn auto_answer(mut self, enable: bool) -> Self {
        self.config.auto_answer = enable;
        self
    }

    /// Bound how long a call may stay negotiating
    pub fn negotiation_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.config.negotiation_timeout_ms = timeout_ms;
        self
    }

    /// Set the event channel capacity
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    /// Set the local media provider
    pub fn media_provider(mut self, provider: Arc<dyn MediaSourceProvider>) -> Self {
        self.media = Some(provider);
        self
    }

    /// Set the signaling identity (required)
    pub fn signaling(mut self, identity: Arc<dyn SignalingIdentity>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Validate and build the manager
    pub fn build(self) -> ConnectionResult<ConnectionManager> {
        let identity = self
            .identity
            .ok_or_else(|| ConnectionError::invalid_state("a signaling identity is required"))?;
        let media = match self.media {
            Some(media) => media,
            None => {
                warn!(
                    endpoint = %self.config.label,
                    "No media provider configured, falling back to the platform default"
                );
                create_platform_provider()
            }
        };
        ConnectionManager::new(self.config, media, identity)
    }
}
