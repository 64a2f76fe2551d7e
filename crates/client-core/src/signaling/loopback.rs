//! In-process rendezvous service
//!
//! `LoopbackRendezvous` plays the role of the external signaling provider for
//! endpoints living in the same process. Each [`LoopbackIdentity`] registers
//! with it, gets a fresh identifier, and can call any other registered
//! identity. Offers, answers and close signals are relayed through channels;
//! each side receives its own remote handle mirroring the other side's tracks.
//!
//! # Example
//!
//! ```rust
//! use peerlink_client_core::signaling::{LoopbackRendezvous, SignalingIdentity};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rendezvous = LoopbackRendezvous::new();
//! let alice = rendezvous.identity();
//! let id = alice.open().await?;
//! assert!(rendezvous.is_registered(&id));
//!
//! alice.close().await?;
//! assert!(!rendezvous.is_registered(&id));
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::identity::{
    IncomingCallHandler, IncomingOffer, LinkEvent, OfferResponder, PeerLink, SignalingIdentity,
};
use super::{SessionIdentifier, SignalingError, SignalingResult};
use crate::call::{CallDirection, CallSession};
use crate::media::{MediaHandle, MediaSource, MediaTrack, SyntheticTrack};

type HandlerSlot = Arc<RwLock<Option<Arc<dyn IncomingCallHandler>>>>;

/// In-process rendezvous service
pub struct LoopbackRendezvous {
    endpoints: DashMap<SessionIdentifier, HandlerSlot>,
    fail_registrations: AtomicBool,
}

impl LoopbackRendezvous {
    /// Create an empty rendezvous service
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: DashMap::new(),
            fail_registrations: AtomicBool::new(false),
        })
    }

    /// Create a new, unregistered identity attached to this service
    pub fn identity(self: &Arc<Self>) -> LoopbackIdentity {
        LoopbackIdentity {
            rendezvous: self.clone(),
            id: Mutex::new(None),
            handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Make every following registration fail
    pub fn fail_registrations(&self, fail: bool) {
        self.fail_registrations.store(fail, Ordering::SeqCst);
    }

    /// Whether `id` is currently registered
    pub fn is_registered(&self, id: &SessionIdentifier) -> bool {
        self.endpoints.contains_key(id)
    }

    /// Number of open registrations
    pub fn registered_count(&self) -> usize {
        self.endpoints.len()
    }
}

/// Identity registered with a [`LoopbackRendezvous`]
pub struct LoopbackIdentity {
    rendezvous: Arc<LoopbackRendezvous>,
    id: Mutex<Option<SessionIdentifier>>,
    handler: HandlerSlot,
}

#[async_trait]
impl SignalingIdentity for LoopbackIdentity {
    async fn open(&self) -> SignalingResult<SessionIdentifier> {
        let mut current = self.id.lock();
        if let Some(id) = current.as_ref() {
            return Ok(id.clone());
        }

        if self.rendezvous.fail_registrations.load(Ordering::SeqCst) {
            return Err(SignalingError::RegistrationFailed {
                reason: "rendezvous service unavailable".to_string(),
            });
        }

        let id = SessionIdentifier::new(Uuid::new_v4().simple().to_string());
        self.rendezvous.endpoints.insert(id.clone(), self.handler.clone());
        *current = Some(id.clone());
        tracing::debug!(session_id = %id, "Loopback identity registered");
        Ok(id)
    }

    fn session_id(&self) -> Option<SessionIdentifier> {
        self.id.lock().clone()
    }

    fn on_incoming_call(&self, handler: Arc<dyn IncomingCallHandler>) {
        *self.handler.write() = Some(handler);
    }

    async fn originate(
        &self,
        target: &SessionIdentifier,
        local_media: MediaHandle,
    ) -> SignalingResult<CallSession> {
        let own_id = self.session_id().ok_or(SignalingError::NotRegistered)?;
        if &own_id == target {
            return Err(SignalingError::PeerUnreachable { target: target.clone() });
        }

        let slot = self
            .rendezvous
            .endpoints
            .get(target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SignalingError::PeerUnreachable { target: target.clone() })?;

        let (caller_tx, caller_rx) = mpsc::unbounded_channel();
        let wire = Arc::new(Wire {
            caller_tx,
            callee_tx: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let offer = IncomingOffer::new(
            own_id.clone(),
            Box::new(LoopbackOffer {
                wire: wire.clone(),
                caller_id: own_id,
                caller_media: local_media.clone(),
                answered: false,
            }),
        );

        let handler = slot.read().clone();
        match handler {
            Some(handler) => handler.on_incoming_call(offer),
            // nobody listening: dropping the offer reports it unanswered
            None => drop(offer),
        }

        Ok(CallSession::new(
            CallDirection::Outgoing,
            target.clone(),
            Some(local_media),
            Box::new(LoopbackLink { wire, side: Side::Caller }),
            caller_rx,
        ))
    }

    async fn close(&self) -> SignalingResult<()> {
        if let Some(id) = self.id.lock().take() {
            self.rendezvous.endpoints.remove(&id);
            tracing::debug!(session_id = %id, "Loopback identity unregistered");
        }
        Ok(())
    }
}

impl Drop for LoopbackIdentity {
    fn drop(&mut self) {
        if let Some(id) = self.id.get_mut().take() {
            self.rendezvous.endpoints.remove(&id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Caller,
    Callee,
}

/// Shared relay between the two ends of one call
#[derive(Debug)]
struct Wire {
    caller_tx: mpsc::UnboundedSender<LinkEvent>,
    callee_tx: Mutex<Option<mpsc::UnboundedSender<LinkEvent>>>,
    closed: AtomicBool,
}

impl Wire {
    fn send_to(&self, side: Side, event: LinkEvent) {
        // the receiving session may already be gone
        match side {
            Side::Caller => {
                let _ = self.caller_tx.send(event);
            }
            Side::Callee => {
                if let Some(tx) = self.callee_tx.lock().as_ref() {
                    let _ = tx.send(event);
                }
            }
        }
    }
}

#[derive(Debug)]
struct LoopbackLink {
    wire: Arc<Wire>,
    side: Side,
}

impl PeerLink for LoopbackLink {
    fn close(&self) -> SignalingResult<()> {
        if self.wire.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let other = match self.side {
            Side::Caller => Side::Callee,
            Side::Callee => Side::Caller,
        };
        self.wire.send_to(other, LinkEvent::RemoteClosed);
        Ok(())
    }
}

struct LoopbackOffer {
    wire: Arc<Wire>,
    caller_id: SessionIdentifier,
    caller_media: MediaHandle,
    answered: bool,
}

#[async_trait]
impl OfferResponder for LoopbackOffer {
    async fn answer(self: Box<Self>, local_media: MediaHandle) -> SignalingResult<CallSession> {
        let mut this = self;
        this.answered = true;
        if this.wire.closed.load(Ordering::SeqCst) {
            return Err(SignalingError::NegotiationError {
                reason: "caller hung up before answer".to_string(),
            });
        }

        let (callee_tx, callee_rx) = mpsc::unbounded_channel();
        *this.wire.callee_tx.lock() = Some(callee_tx);

        let session = CallSession::new(
            CallDirection::Incoming,
            this.caller_id.clone(),
            Some(local_media.clone()),
            Box::new(LoopbackLink {
                wire: this.wire.clone(),
                side: Side::Callee,
            }),
            callee_rx,
        );

        this.wire.send_to(Side::Caller, LinkEvent::RemoteStream(mirror(&local_media)));
        this.wire.send_to(Side::Callee, LinkEvent::RemoteStream(mirror(&this.caller_media)));
        Ok(session)
    }
}

impl Drop for LoopbackOffer {
    fn drop(&mut self) {
        if !self.answered && !self.wire.closed.swap(true, Ordering::SeqCst) {
            self.wire.send_to(
                Side::Caller,
                LinkEvent::NegotiationFailed {
                    reason: "offer was not answered".to_string(),
                },
            );
        }
    }
}

/// Build the receiving side's view of a local stream
fn mirror(local: &MediaHandle) -> MediaHandle {
    let tracks: Vec<Arc<dyn MediaTrack>> = local
        .tracks()
        .iter()
        .map(|t| Arc::new(SyntheticTrack::new(t.kind(), format!("remote {}", t.label()))) as Arc<dyn MediaTrack>)
        .collect();
    MediaHandle::new(MediaSource::Remote, tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallEvent, CallState, CloseReason};
    use crate::media::{MediaKind, TrackKind};
    use std::time::Duration;

    struct Collect(mpsc::UnboundedSender<IncomingOffer>);

    impl IncomingCallHandler for Collect {
        fn on_incoming_call(&self, offer: IncomingOffer) {
            let _ = self.0.send(offer);
        }
    }

    async fn next_event(session: &mut CallSession, rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> Option<CallEvent> {
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for link event")
            .expect("link channel closed");
        session.handle_link_event(event)
    }

    #[tokio::test]
    async fn registration_lifecycle() {
        let rendezvous = LoopbackRendezvous::new();
        let identity = rendezvous.identity();
        assert!(identity.session_id().is_none());

        let id = identity.open().await.unwrap();
        assert_eq!(identity.open().await.unwrap(), id);
        assert_eq!(rendezvous.registered_count(), 1);

        identity.close().await.unwrap();
        identity.close().await.unwrap();
        assert_eq!(rendezvous.registered_count(), 0);
        assert!(identity.session_id().is_none());
    }

    #[tokio::test]
    async fn registration_failure_is_reported() {
        let rendezvous = LoopbackRendezvous::new();
        rendezvous.fail_registrations(true);
        let identity = rendezvous.identity();
        assert!(matches!(
            identity.open().await,
            Err(SignalingError::RegistrationFailed { .. })
        ));
        assert!(identity.session_id().is_none());
    }

    #[tokio::test]
    async fn originate_requires_registration_and_known_target() {
        let rendezvous = LoopbackRendezvous::new();
        let alice = rendezvous.identity();
        let media = MediaHandle::synthetic(MediaSource::Local(MediaKind::Camera));
        let nobody = SessionIdentifier::new("nobody");

        assert_eq!(
            alice.originate(&nobody, media.clone()).await.unwrap_err(),
            SignalingError::NotRegistered
        );

        alice.open().await.unwrap();
        assert_eq!(
            alice.originate(&nobody, media).await.unwrap_err(),
            SignalingError::PeerUnreachable { target: nobody }
        );
    }

    #[tokio::test]
    async fn answered_offer_delivers_streams_both_ways() {
        let rendezvous = LoopbackRendezvous::new();
        let alice = rendezvous.identity();
        let bob = rendezvous.identity();
        alice.open().await.unwrap();
        let bob_id = bob.open().await.unwrap();

        let (offer_tx, mut offer_rx) = mpsc::unbounded_channel();
        bob.on_incoming_call(Arc::new(Collect(offer_tx)));

        let alice_media = MediaHandle::synthetic(MediaSource::Local(MediaKind::Screen));
        let mut alice_call = alice.originate(&bob_id, alice_media.clone()).await.unwrap();
        let mut alice_rx = alice_call.take_link_events().unwrap();

        let offer = offer_rx.recv().await.unwrap();
        assert_eq!(Some(offer.from().clone()), alice.session_id());

        let bob_media = MediaHandle::synthetic(MediaSource::Local(MediaKind::Camera));
        let mut bob_call = offer.answer(bob_media.clone()).await.unwrap();
        let mut bob_rx = bob_call.take_link_events().unwrap();

        match next_event(&mut alice_call, &mut alice_rx).await {
            Some(CallEvent::RemoteStreamAvailable(remote)) => {
                assert_eq!(remote.source(), MediaSource::Remote);
                assert_eq!(remote.tracks()[0].kind(), TrackKind::Video);
                assert_eq!(remote.tracks()[0].label(), "remote camera");
            }
            other => panic!("expected remote stream, got {:?}", other),
        }
        assert!(matches!(
            next_event(&mut bob_call, &mut bob_rx).await,
            Some(CallEvent::RemoteStreamAvailable(_))
        ));

        // hanging up on one side closes the other
        assert!(alice_call.close().is_some());
        assert!(matches!(
            next_event(&mut bob_call, &mut bob_rx).await,
            Some(CallEvent::Closed(CloseReason::RemoteClosed))
        ));

        // local capture of either side is untouched by the remote teardown
        assert!(!alice_media.is_released());
        assert!(!bob_media.is_released());
    }

    #[tokio::test]
    async fn ignored_offer_fails_caller_negotiation() {
        let rendezvous = LoopbackRendezvous::new();
        let alice = rendezvous.identity();
        let bob = rendezvous.identity();
        alice.open().await.unwrap();
        let bob_id = bob.open().await.unwrap();

        let (offer_tx, mut offer_rx) = mpsc::unbounded_channel();
        bob.on_incoming_call(Arc::new(Collect(offer_tx)));

        let media = MediaHandle::synthetic(MediaSource::Local(MediaKind::Camera));
        let mut call = alice.originate(&bob_id, media).await.unwrap();
        let mut rx = call.take_link_events().unwrap();

        drop(offer_rx.recv().await.unwrap());

        assert!(matches!(
            next_event(&mut call, &mut rx).await,
            Some(CallEvent::Closed(CloseReason::NegotiationError))
        ));
        assert_eq!(call.state(), CallState::Closed);
    }

    #[tokio::test]
    async fn answer_after_caller_hung_up_fails() {
        let rendezvous = LoopbackRendezvous::new();
        let alice = rendezvous.identity();
        let bob = rendezvous.identity();
        alice.open().await.unwrap();
        let bob_id = bob.open().await.unwrap();

        let (offer_tx, mut offer_rx) = mpsc::unbounded_channel();
        bob.on_incoming_call(Arc::new(Collect(offer_tx)));

        let mut call = alice
            .originate(&bob_id, MediaHandle::synthetic(MediaSource::Local(MediaKind::Camera)))
            .await
            .unwrap();
        call.close();

        let offer = offer_rx.recv().await.unwrap();
        let err = offer
            .answer(MediaHandle::synthetic(MediaSource::Local(MediaKind::Camera)))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalingError::NegotiationError { .. }));
    }

    #[tokio::test]
    async fn closing_identity_leaves_sessions_alone() {
        let rendezvous = LoopbackRendezvous::new();
        let alice = rendezvous.identity();
        let bob = rendezvous.identity();
        alice.open().await.unwrap();
        let bob_id = bob.open().await.unwrap();

        let (offer_tx, _offer_rx) = mpsc::unbounded_channel();
        bob.on_incoming_call(Arc::new(Collect(offer_tx)));

        let call = alice
            .originate(&bob_id, MediaHandle::synthetic(MediaSource::Local(MediaKind::Camera)))
            .await
            .unwrap();
        alice.close().await.unwrap();
        assert_eq!(call.state(), CallState::Negotiating);
    }
}
