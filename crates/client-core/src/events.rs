//! Event delivery for the presentation layer
//!
//! The manager publishes every observable change as a [`ConnectionEvent`] on a
//! broadcast channel. Consumers either read the channel directly
//! ([`ConnectionManager::subscribe`](crate::ConnectionManager::subscribe) /
//! [`events`](crate::ConnectionManager::events)) or implement
//! [`ConnectionEventHandler`] and let the manager dispatch to it.
//!
//! # Example
//!
//! ```rust
//! use peerlink_client_core::events::ConnectionEventHandler;
//! use peerlink_client_core::ConnectionStatus;
//! use async_trait::async_trait;
//!
//! struct StatusLabel;
//!
//! #[async_trait]
//! impl ConnectionEventHandler for StatusLabel {
//!     async fn on_status_changed(&self, _previous: ConnectionStatus, current: ConnectionStatus) {
//!         println!("status: {}", current);
//!     }
//! }
//! ```

use async_trait::async_trait;
use tokio_stream::wrappers::BroadcastStream;

use crate::call::{CallId, CloseReason};
use crate::client::types::ConnectionStatus;
use crate::error::ConnectionError;
use crate::media::MediaHandle;
use crate::signaling::SessionIdentifier;

/// Events emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Registration completed
    IdentityReady {
        /// Assigned identifier
        session_id: SessionIdentifier,
    },

    /// Registration was torn down
    IdentityClosed,

    /// Status changed
    StatusChanged {
        /// Status before the change
        previous: ConnectionStatus,
        /// Status after the change
        current: ConnectionStatus,
    },

    /// Local media was acquired for the current attempt
    LocalStreamAvailable {
        /// Local handle, owned by the manager
        handle: MediaHandle,
    },

    /// Local media was released
    LocalStreamReleased,

    /// An inbound offer arrived
    IncomingCall {
        /// Offer identifier
        offer_id: uuid::Uuid,
        /// Calling peer
        from: SessionIdentifier,
    },

    /// Remote media is available
    RemoteStreamAvailable {
        /// Call the stream belongs to
        call_id: CallId,
        /// Remote handle, owned by the call session
        handle: MediaHandle,
    },

    /// The active call closed
    CallClosed {
        /// Call that closed
        call_id: CallId,
        /// Why it closed
        reason: CloseReason,
    },

    /// An attempt failed
    Error {
        /// What went wrong
        error: ConnectionError,
    },
}

/// Event stream type
pub type EventStream = BroadcastStream<ConnectionEvent>;

/// Observer interface for presentation layers
///
/// Every method has an empty default so implementors only override what they
/// render.
#[async_trait]
pub trait ConnectionEventHandler: Send + Sync {
    /// Registration completed
    async fn on_identity_ready(&self, _session_id: SessionIdentifier) {}

    /// Status changed
    async fn on_status_changed(&self, _previous: ConnectionStatus, _current: ConnectionStatus) {}

    /// Local preview is available
    async fn on_local_stream(&self, _handle: MediaHandle) {}

    /// Remote media is available
    async fn on_remote_stream(&self, _call_id: CallId, _handle: MediaHandle) {}

    /// The active call closed
    async fn on_call_closed(&self, _call_id: CallId, _reason: CloseReason) {}

    /// An attempt failed
    async fn on_error(&self, _error: ConnectionError) {}

    /// Raw event, called before the typed callback
    async fn on_event(&self, _event: &ConnectionEvent) {}
}

/// Route one event to the matching handler callback
pub(crate) async fn dispatch(handler: &dyn ConnectionEventHandler, event: ConnectionEvent) {
    handler.on_event(&event).await;
    match event {
        ConnectionEvent::IdentityReady { session_id } => handler.on_identity_ready(session_id).await,
        ConnectionEvent::StatusChanged { previous, current } => {
            handler.on_status_changed(previous, current).await
        }
        ConnectionEvent::LocalStreamAvailable { handle } => handler.on_local_stream(handle).await,
        ConnectionEvent::RemoteStreamAvailable { call_id, handle } => {
            handler.on_remote_stream(call_id, handle).await
        }
        ConnectionEvent::CallClosed { call_id, reason } => handler.on_call_closed(call_id, reason).await,
        ConnectionEvent::Error { error } => handler.on_error(error).await,
        ConnectionEvent::IdentityClosed
        | ConnectionEvent::LocalStreamReleased
        | ConnectionEvent::IncomingCall { .. } => {}
    }
}
