//! Call sessions
//!
//! A [`CallSession`] is one negotiated link to a remote peer. It is a plain
//! state machine: the backend feeds it [`LinkEvent`]s, the owner calls
//! [`close`](CallSession::close), and every transition returns the
//! [`CallEvent`] (if any) that the owner should publish.
//!
//! ```text
//!              remote stream
//! Negotiating ──────────────▶ Active
//!      │                        │
//!      │ error / close          │ close / remote close / error
//!      ▼                        ▼
//!    Closed ◀────────────────────
//! ```
//!
//! `RemoteStreamAvailable` is produced at most once, `Closed` exactly once,
//! and nothing is produced after `Closed`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::media::MediaHandle;
use crate::signaling::{LinkEvent, PeerLink, SessionIdentifier, SignalingError};

/// Unique call identifier
pub type CallId = Uuid;

/// Which side started the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Originated locally
    Outgoing,
    /// Answered from an inbound offer
    Incoming,
}

/// Call session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Offer/answer exchange in progress
    Negotiating,
    /// Remote media is flowing
    Active,
    /// Call is over
    Closed,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Negotiating => write!(f, "negotiating"),
            CallState::Active => write!(f, "active"),
            CallState::Closed => write!(f, "closed"),
        }
    }
}

/// Why a call closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    /// Local `close()` call
    UserInitiated,
    /// Remote side hung up
    RemoteClosed,
    /// Negotiation failed or timed out
    NegotiationError,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::UserInitiated => write!(f, "user initiated"),
            CloseReason::RemoteClosed => write!(f, "remote closed"),
            CloseReason::NegotiationError => write!(f, "negotiation error"),
        }
    }
}

/// Notifications produced by session transitions
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Session became active; the handle stays owned by the session
    RemoteStreamAvailable(MediaHandle),
    /// Session closed
    Closed(CloseReason),
}

/// Snapshot of a call for display and diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInfo {
    /// Call identifier
    pub call_id: CallId,
    /// Outgoing or incoming
    pub direction: CallDirection,
    /// Remote peer identifier
    pub remote_id: SessionIdentifier,
    /// Current state
    pub state: CallState,
    /// Close reason once closed
    pub close_reason: Option<CloseReason>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// When the remote stream arrived
    pub connected_at: Option<DateTime<Utc>>,
    /// When the session closed
    pub ended_at: Option<DateTime<Utc>>,
}

/// One negotiated peer link
pub struct CallSession {
    id: CallId,
    direction: CallDirection,
    remote_id: SessionIdentifier,
    state: CallState,
    close_reason: Option<CloseReason>,
    local_media: Option<MediaHandle>,
    remote_media: Option<MediaHandle>,
    link: Box<dyn PeerLink>,
    link_events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    link_error: Option<SignalingError>,
    created_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl CallSession {
    /// Create a session in `Negotiating`
    ///
    /// `local_media` is borrowed for display only: the session never releases
    /// it. `link_events` carries backend notifications for this call.
    pub fn new(
        direction: CallDirection,
        remote_id: SessionIdentifier,
        local_media: Option<MediaHandle>,
        link: Box<dyn PeerLink>,
        link_events: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        let id = CallId::new_v4();
        tracing::debug!(call_id = %id, ?direction, remote = %remote_id, "Call session negotiating");
        Self {
            id,
            direction,
            remote_id,
            state: CallState::Negotiating,
            close_reason: None,
            local_media,
            remote_media: None,
            link,
            link_events: Some(link_events),
            link_error: None,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
        }
    }

    /// Call identifier
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Call direction
    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    /// Remote peer identifier
    pub fn remote_id(&self) -> &SessionIdentifier {
        &self.remote_id
    }

    /// Current state
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Close reason, once closed
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Whether the session has closed
    pub fn is_closed(&self) -> bool {
        self.state == CallState::Closed
    }

    /// Local media attached to this call
    pub fn local_media(&self) -> Option<&MediaHandle> {
        self.local_media.as_ref()
    }

    /// Remote media, available while `Active`
    pub fn remote_media(&self) -> Option<&MediaHandle> {
        self.remote_media.as_ref()
    }

    /// Take the backend event receiver so it can be pumped elsewhere
    pub fn take_link_events(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.link_events.take()
    }

    /// Take the error reported by the link while closing, if any
    pub fn take_link_error(&mut self) -> Option<SignalingError> {
        self.link_error.take()
    }

    /// Snapshot for display
    pub fn info(&self) -> CallInfo {
        CallInfo {
            call_id: self.id,
            direction: self.direction,
            remote_id: self.remote_id.clone(),
            state: self.state,
            close_reason: self.close_reason,
            created_at: self.created_at,
            connected_at: self.connected_at,
            ended_at: self.ended_at,
        }
    }

    /// Apply a backend event
    pub fn handle_link_event(&mut self, event: LinkEvent) -> Option<CallEvent> {
        match event {
            LinkEvent::RemoteStream(handle) => self.on_remote_stream(handle),
            LinkEvent::RemoteClosed => self.on_remote_closed(),
            LinkEvent::NegotiationFailed { reason } => self.fail_negotiation(&reason),
        }
    }

    /// The remote track arrived
    ///
    /// The session takes ownership of `handle`. Only the first stream while
    /// `Negotiating` activates the call; any other handle is released at once.
    pub fn on_remote_stream(&mut self, handle: MediaHandle) -> Option<CallEvent> {
        if self.state != CallState::Negotiating {
            tracing::debug!(call_id = %self.id, state = %self.state, "Dropping unexpected remote stream");
            handle.release();
            return None;
        }

        self.state = CallState::Active;
        self.connected_at = Some(Utc::now());
        self.remote_media = Some(handle.clone());
        tracing::info!(call_id = %self.id, remote = %self.remote_id, "Call session active");
        Some(CallEvent::RemoteStreamAvailable(handle))
    }

    /// The remote side closed the call
    pub fn on_remote_closed(&mut self) -> Option<CallEvent> {
        self.transition_closed(CloseReason::RemoteClosed)
    }

    /// Negotiation failed, locally or on the backend
    pub fn fail_negotiation(&mut self, reason: &str) -> Option<CallEvent> {
        if !self.is_closed() {
            tracing::warn!(call_id = %self.id, reason, "Call negotiation failed");
        }
        self.transition_closed(CloseReason::NegotiationError)
    }

    /// Close the call locally. No-op when already closed.
    pub fn close(&mut self) -> Option<CallEvent> {
        self.transition_closed(CloseReason::UserInitiated)
    }

    fn transition_closed(&mut self, reason: CloseReason) -> Option<CallEvent> {
        if self.is_closed() {
            return None;
        }

        self.state = CallState::Closed;
        self.close_reason = Some(reason);
        self.ended_at = Some(Utc::now());

        if reason != CloseReason::RemoteClosed {
            if let Err(e) = self.link.close() {
                tracing::warn!(call_id = %self.id, error = %e, "Failed to signal close to remote");
                self.link_error = Some(e);
            }
        }

        if let Some(remote) = self.remote_media.take() {
            remote.release();
        }

        tracing::info!(call_id = %self.id, %reason, "Call session closed");
        Some(CallEvent::Closed(reason))
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::debug!(call_id = %self.id, "Closing call session on drop");
            self.close();
        }
    }
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("remote_id", &self.remote_id)
            .field("state", &self.state)
            .field("close_reason", &self.close_reason)
            .finish()
    }
}
