//! Shared fakes for integration tests
//!
//! `ScriptedSignaling` is a signaling identity whose calls are driven by the
//! test: every originated or answered call hands a [`LinkController`] to the
//! test, which then decides when the remote stream shows up or the remote
//! side hangs up.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, Notify};

use peerlink_client_core::call::{CallDirection, CallSession};
use peerlink_client_core::media::{
    MediaHandle, MediaKind, MediaResult, MediaSource, MediaSourceProvider, MockMediaProvider,
};
use peerlink_client_core::signaling::{
    IncomingCallHandler, IncomingOffer, LinkEvent, OfferResponder, PeerLink, SessionIdentifier,
    SignalingError, SignalingIdentity,
};
use peerlink_client_core::{ConnectionEvent, ConnectionManager, ConnectionManagerBuilder, ConnectionStatus};

pub const WAIT: Duration = Duration::from_secs(2);

/// Ordered record of teardown steps across collaborators
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Test side of one call
#[derive(Clone)]
pub struct LinkController {
    pub remote: SessionIdentifier,
    pub local_media: MediaHandle,
    tx: mpsc::UnboundedSender<LinkEvent>,
    closes: Arc<AtomicUsize>,
}

impl LinkController {
    /// Deliver a remote stream and return the handle the session received
    pub fn send_remote_stream(&self) -> MediaHandle {
        let handle = MediaHandle::synthetic(MediaSource::Remote);
        let _ = self.tx.send(LinkEvent::RemoteStream(handle.clone()));
        handle
    }

    pub fn remote_close(&self) {
        let _ = self.tx.send(LinkEvent::RemoteClosed);
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(LinkEvent::NegotiationFailed {
            reason: reason.to_string(),
        });
    }

    /// Times the session signalled close to the remote side
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct ScriptedLink {
    closes: Arc<AtomicUsize>,
    journal: Journal,
    fail_close: Arc<AtomicBool>,
}

impl PeerLink for ScriptedLink {
    fn close(&self) -> Result<(), SignalingError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.journal.record("link closed");
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(SignalingError::NegotiationError {
                reason: "link close failed".to_string(),
            });
        }
        Ok(())
    }
}

fn scripted_session(
    direction: CallDirection,
    remote: SessionIdentifier,
    local_media: MediaHandle,
    journal: Journal,
    fail_close: Arc<AtomicBool>,
) -> (CallSession, LinkController) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closes = Arc::new(AtomicUsize::new(0));
    let session = CallSession::new(
        direction,
        remote.clone(),
        Some(local_media.clone()),
        Box::new(ScriptedLink {
            closes: closes.clone(),
            journal,
            fail_close,
        }),
        rx,
    );
    (
        session,
        LinkController {
            remote,
            local_media,
            tx,
            closes,
        },
    )
}

/// Signaling identity driven by the test
pub struct ScriptedSignaling {
    id: SessionIdentifier,
    registered: AtomicBool,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    fail_link_close: Arc<AtomicBool>,
    hold_originate: AtomicBool,
    originate_gate: Notify,
    handler: Mutex<Option<Arc<dyn IncomingCallHandler>>>,
    links_tx: mpsc::UnboundedSender<LinkController>,
    links_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<LinkController>>,
    journal: Journal,
}

impl ScriptedSignaling {
    pub fn new(id: &str, journal: Journal) -> Arc<Self> {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: SessionIdentifier::new(id),
            registered: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            fail_link_close: Arc::new(AtomicBool::new(false)),
            hold_originate: AtomicBool::new(false),
            originate_gate: Notify::new(),
            handler: Mutex::new(None),
            links_tx,
            links_rx: tokio::sync::Mutex::new(links_rx),
            journal,
        })
    }

    pub fn fail_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    /// Make `close()` report a failure after unregistering
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Make every call link report a failure when closed
    pub fn fail_link_close(&self) {
        self.fail_link_close.store(true, Ordering::SeqCst);
    }

    /// Keep `originate` from returning until [`release_originate`](Self::release_originate)
    ///
    /// The link is still handed to the test before the wait.
    pub fn hold_originate(&self) {
        self.hold_originate.store(true, Ordering::SeqCst);
    }

    pub fn release_originate(&self) {
        self.hold_originate.store(false, Ordering::SeqCst);
        self.originate_gate.notify_one();
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Wait for the next originated or answered call
    pub async fn next_link(&self) -> LinkController {
        let mut rx = self.links_rx.lock().await;
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a call link")
            .expect("link channel closed")
    }

    /// Push an inbound offer from `from` through the registered handler
    pub fn deliver_offer(&self, from: &str) -> OfferWatch {
        let ignored = Arc::new(AtomicBool::new(false));
        let offer = IncomingOffer::new(
            SessionIdentifier::new(from),
            Box::new(ScriptedResponder {
                from: SessionIdentifier::new(from),
                links_tx: self.links_tx.clone(),
                journal: self.journal.clone(),
                fail_link_close: self.fail_link_close.clone(),
                ignored: ignored.clone(),
                answered: false,
            }),
        );
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler.on_incoming_call(offer),
            None => drop(offer),
        }
        OfferWatch { ignored }
    }
}

#[async_trait]
impl SignalingIdentity for ScriptedSignaling {
    async fn open(&self) -> Result<SessionIdentifier, SignalingError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SignalingError::RegistrationFailed {
                reason: "scripted failure".to_string(),
            });
        }
        self.registered.store(true, Ordering::SeqCst);
        Ok(self.id.clone())
    }

    fn session_id(&self) -> Option<SessionIdentifier> {
        self.is_registered().then(|| self.id.clone())
    }

    fn on_incoming_call(&self, handler: Arc<dyn IncomingCallHandler>) {
        *self.handler.lock() = Some(handler);
    }

    async fn originate(
        &self,
        target: &SessionIdentifier,
        local_media: MediaHandle,
    ) -> Result<CallSession, SignalingError> {
        if !self.is_registered() {
            return Err(SignalingError::NotRegistered);
        }
        let (session, controller) = scripted_session(
            CallDirection::Outgoing,
            target.clone(),
            local_media,
            self.journal.clone(),
            self.fail_link_close.clone(),
        );
        let _ = self.links_tx.send(controller);
        if self.hold_originate.load(Ordering::SeqCst) {
            self.originate_gate.notified().await;
        }
        Ok(session)
    }

    async fn close(&self) -> Result<(), SignalingError> {
        self.registered.store(false, Ordering::SeqCst);
        self.journal.record("identity closed");
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(SignalingError::RegistrationFailed {
                reason: "unregister failed".to_string(),
            });
        }
        Ok(())
    }
}

/// Observes what happened to a delivered offer
pub struct OfferWatch {
    ignored: Arc<AtomicBool>,
}

impl OfferWatch {
    /// Whether the offer was dropped without an answer
    pub fn was_ignored(&self) -> bool {
        self.ignored.load(Ordering::SeqCst)
    }

    /// Wait until the offer has been dropped unanswered
    pub async fn wait_ignored(&self) {
        tokio::time::timeout(WAIT, async {
            while !self.was_ignored() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("offer was not dropped");
    }
}

struct ScriptedResponder {
    from: SessionIdentifier,
    links_tx: mpsc::UnboundedSender<LinkController>,
    journal: Journal,
    fail_link_close: Arc<AtomicBool>,
    ignored: Arc<AtomicBool>,
    answered: bool,
}

#[async_trait]
impl OfferResponder for ScriptedResponder {
    async fn answer(self: Box<Self>, local_media: MediaHandle) -> Result<CallSession, SignalingError> {
        let mut this = self;
        this.answered = true;
        let (session, controller) = scripted_session(
            CallDirection::Incoming,
            this.from.clone(),
            local_media,
            this.journal.clone(),
            this.fail_link_close.clone(),
        );
        let _ = this.links_tx.send(controller);
        Ok(session)
    }
}

impl Drop for ScriptedResponder {
    fn drop(&mut self) {
        if !self.answered {
            self.ignored.store(true, Ordering::SeqCst);
        }
    }
}

/// Media provider that journals releases before delegating
pub struct JournalingMedia {
    pub inner: Arc<MockMediaProvider>,
    journal: Journal,
}

impl JournalingMedia {
    pub fn new(inner: Arc<MockMediaProvider>, journal: Journal) -> Arc<Self> {
        Arc::new(Self { inner, journal })
    }
}

#[async_trait]
impl MediaSourceProvider for JournalingMedia {
    async fn acquire(&self, kind: MediaKind) -> MediaResult<MediaHandle> {
        self.inner.acquire(kind).await
    }

    fn release(&self, handle: &MediaHandle) {
        if !handle.is_released() {
            self.journal.record("media released");
        }
        self.inner.release(handle);
    }
}

/// Everything one scripted endpoint needs
pub struct Harness {
    pub manager: ConnectionManager,
    pub media: Arc<MockMediaProvider>,
    pub signaling: Arc<ScriptedSignaling>,
    pub journal: Journal,
    pub events: broadcast::Receiver<ConnectionEvent>,
}

impl Harness {
    pub async fn open(label: &str) -> Self {
        Self::open_with(label, |b| b).await
    }

    pub async fn open_with(
        label: &str,
        configure: impl FnOnce(ConnectionManagerBuilder) -> ConnectionManagerBuilder,
    ) -> Self {
        let journal = Journal::default();
        let media = Arc::new(MockMediaProvider::new());
        let signaling = ScriptedSignaling::new(label, journal.clone());
        let builder = ConnectionManagerBuilder::new()
            .label(label)
            .media_provider(JournalingMedia::new(media.clone(), journal.clone()))
            .signaling(signaling.clone());
        let manager = configure(builder).build().expect("valid manager");
        let events = manager.subscribe();
        manager.open().await.expect("open scripted identity");

        Self {
            manager,
            media,
            signaling,
            journal,
            events,
        }
    }

    /// Wait for the next event matching `pred`, skipping others
    pub async fn wait_for(&mut self, pred: impl Fn(&ConnectionEvent) -> bool) -> ConnectionEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                match self.events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) => continue,
                    Err(e) => panic!("event channel failed: {e}"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    pub async fn wait_for_status(&mut self, status: ConnectionStatus) {
        self.wait_for(|e| matches!(e, ConnectionEvent::StatusChanged { current, .. } if *current == status))
            .await;
    }

    /// Every event received so far that has not been consumed
    pub fn drain(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Status transitions contained in `events`
pub fn status_changes(events: &[ConnectionEvent]) -> Vec<(ConnectionStatus, ConnectionStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            ConnectionEvent::StatusChanged { previous, current } => Some((*previous, *current)),
            _ => None,
        })
        .collect()
}
