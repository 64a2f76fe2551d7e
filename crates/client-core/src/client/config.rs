//! Connection manager configuration
//!
//! # Examples
//!
//! ```rust
//! use peerlink_client_core::client::config::ManagerConfig;
//! use peerlink_client_core::media::MediaKind;
//!
//! let config = ManagerConfig::new()
//!     .with_label("front-desk")
//!     .with_default_media_kind(MediaKind::Screen)
//!     .with_negotiation_timeout_ms(Some(10_000));
//!
//! assert_eq!(config.default_media_kind, MediaKind::Screen);
//! assert!(config.auto_answer);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectionError, ConnectionResult};
use crate::media::MediaKind;

/// Default limit for a call to leave `Negotiating`
pub const DEFAULT_NEGOTIATION_TIMEOUT_MS: u64 = 30_000;

/// Default broadcast channel capacity
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Endpoint label used in logs
    pub label: String,
    /// Media kind used by `connect()` when none is given
    pub default_media_kind: MediaKind,
    /// Answer inbound offers automatically
    ///
    /// When disabled, offers are announced with an `IncomingCall` event and
    /// then dropped, leaving the caller to time out.
    pub auto_answer: bool,
    /// How long a call may stay `Negotiating`, `None` for no limit
    pub negotiation_timeout_ms: Option<u64>,
    /// Capacity of the event broadcast channel
    pub event_channel_capacity: usize,
}

impl ManagerConfig {
    /// Configuration with default values
    pub fn new() -> Self {
        Self {
            label: "peerlink".to_string(),
            default_media_kind: MediaKind::Camera,
            auto_answer: true,
            negotiation_timeout_ms: Some(DEFAULT_NEGOTIATION_TIMEOUT_MS),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    /// Set the log label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the default media kind for outbound calls
    pub fn with_default_media_kind(mut self, kind: MediaKind) -> Self {
        self.default_media_kind = kind;
        self
    }

    /// Enable or disable automatic answering
    pub fn with_auto_answer(mut self, auto_answer: bool) -> Self {
        self.auto_answer = auto_answer;
        self
    }

    /// Set the negotiation timeout
    pub fn with_negotiation_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.negotiation_timeout_ms = timeout_ms;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> ConnectionResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConnectionError::invalid_state(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Negotiation timeout as a `Duration`
    pub fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout_ms.map(Duration::from_millis)
    }

    /// Check the configuration for values the manager cannot work with
    pub fn validate(&self) -> ConnectionResult<()> {
        if self.event_channel_capacity == 0 {
            return Err(ConnectionError::invalid_state(
                "event_channel_capacity must be greater than zero",
            ));
        }
        if self.negotiation_timeout_ms == Some(0) {
            return Err(ConnectionError::invalid_state(
                "negotiation_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}
