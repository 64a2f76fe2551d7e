//! Signaling identity and rendezvous integration
//!
//! A [`SignalingIdentity`] owns one registration with an external rendezvous
//! service. Once registered it has a [`SessionIdentifier`] that remote peers
//! use to reach it, it can originate calls to other identifiers, and it
//! surfaces inbound offers to a registered [`IncomingCallHandler`].
//!
//! Media never flows through the rendezvous service; it only relays offers,
//! answers and close signals.
//!
//! # Key Components
//!
//! - **SessionIdentifier** - opaque identifier assigned at registration
//! - **SignalingIdentity** - registration lifecycle and call origination
//! - **IncomingOffer** - an inbound negotiation attempt to answer or ignore
//! - **PeerLink** - backend side of one negotiated call
//! - **LoopbackRendezvous** - in-process rendezvous for tests and demos

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod identity;
pub mod loopback;

pub use identity::{
    IncomingCallHandler, IncomingOffer, LinkEvent, OfferResponder, PeerLink, SignalingIdentity,
};
pub use loopback::{LoopbackIdentity, LoopbackRendezvous};

/// Identifier assigned by the rendezvous service at registration
///
/// Immutable once assigned and only meaningful while the registration is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentifier(String);

impl SessionIdentifier {
    /// Wrap an identifier issued by a rendezvous service
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a user-supplied target identifier
    ///
    /// Surrounding whitespace is trimmed; an empty result is rejected.
    pub fn parse_target(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Rendezvous and negotiation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    /// Registration with the rendezvous service failed
    #[error("Registration failed: {reason}")]
    RegistrationFailed {
        /// Service or network reason
        reason: String,
    },

    /// The target is not currently registered
    #[error("Peer unreachable: {target}")]
    PeerUnreachable {
        /// Identifier that could not be reached
        target: SessionIdentifier,
    },

    /// Offer/answer negotiation failed
    #[error("Negotiation failed: {reason}")]
    NegotiationError {
        /// Failure reason
        reason: String,
    },

    /// Operation needs an open registration
    #[error("Signaling identity is not registered")]
    NotRegistered,
}

/// Result type for signaling operations
pub type SignalingResult<T> = std::result::Result<T, SignalingError>;
