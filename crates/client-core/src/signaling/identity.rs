//! Signaling identity contract
//!
//! These traits are the only surface the connection manager needs from a
//! rendezvous backend. Backends translate their wire-level offer/answer and
//! candidate exchange into [`LinkEvent`]s delivered to the [`CallSession`]
//! they created.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{SessionIdentifier, SignalingResult};
use crate::call::CallSession;
use crate::media::MediaHandle;

/// Events a backend reports for one negotiated call
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The remote media track became available
    RemoteStream(MediaHandle),
    /// The remote side closed the call
    RemoteClosed,
    /// Negotiation failed on the backend side
    NegotiationFailed {
        /// Failure reason
        reason: String,
    },
}

/// Backend side of one call
///
/// The [`CallSession`] owns its link and calls [`close`](PeerLink::close)
/// exactly once when it closes for any reason other than a remote close.
pub trait PeerLink: Send + Sync + fmt::Debug {
    /// Signal the remote side that this call is over
    fn close(&self) -> SignalingResult<()>;
}

/// Backend-specific way to answer an inbound offer
#[async_trait]
pub trait OfferResponder: Send {
    /// Answer with local media, producing the inbound call session
    async fn answer(self: Box<Self>, local_media: MediaHandle) -> SignalingResult<CallSession>;
}

/// An inbound negotiation attempt
///
/// Answer it with [`answer`](IncomingOffer::answer) or drop it. There is no
/// explicit reject: a dropped offer leaves the remote side to time out.
pub struct IncomingOffer {
    id: Uuid,
    from: SessionIdentifier,
    received_at: DateTime<Utc>,
    responder: Box<dyn OfferResponder>,
}

impl IncomingOffer {
    /// Wrap a backend responder
    pub fn new(from: SessionIdentifier, responder: Box<dyn OfferResponder>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            received_at: Utc::now(),
            responder,
        }
    }

    /// Offer identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Identifier of the calling peer
    pub fn from(&self) -> &SessionIdentifier {
        &self.from
    }

    /// When the offer arrived
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Answer the offer with local media
    pub async fn answer(self, local_media: MediaHandle) -> SignalingResult<CallSession> {
        self.responder.answer(local_media).await
    }
}

impl fmt::Debug for IncomingOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingOffer")
            .field("id", &self.id)
            .field("from", &self.from)
            .field("received_at", &self.received_at)
            .finish()
    }
}

/// Receives inbound offers from a signaling identity
///
/// Invoked once per inbound negotiation attempt. Implementations must not
/// block; long-running work belongs on a spawned task.
pub trait IncomingCallHandler: Send + Sync {
    /// Called for every inbound offer
    fn on_incoming_call(&self, offer: IncomingOffer);
}

/// Registration with an external rendezvous service
#[async_trait]
pub trait SignalingIdentity: Send + Sync {
    /// Register and wait for the assigned identifier
    ///
    /// Fails with `RegistrationFailed` on a network or service error. The
    /// failure is reported, never retried.
    async fn open(&self) -> SignalingResult<SessionIdentifier>;

    /// Identifier of the open registration, if any
    fn session_id(&self) -> Option<SessionIdentifier>;

    /// Install the inbound offer handler, replacing any previous one
    fn on_incoming_call(&self, handler: Arc<dyn IncomingCallHandler>);

    /// Start negotiating a call with `target`
    ///
    /// Fails with `PeerUnreachable` if `target` is not registered.
    async fn originate(
        &self,
        target: &SessionIdentifier,
        local_media: MediaHandle,
    ) -> SignalingResult<CallSession>;

    /// Tear down the registration
    ///
    /// Call sessions created earlier are owned elsewhere and stay untouched.
    async fn close(&self) -> SignalingResult<()>;
}
