//! Connection manager
//!
//! [`ConnectionManager`] ties a [`SignalingIdentity`], a
//! [`MediaSourceProvider`] and at most one [`CallSession`] into a single
//! lifecycle:
//!
//! ```text
//!            connect()                 remote stream
//! Disconnected ───────▶ Connecting ──────────────────▶ Connected
//!      ▲                   │                              │
//!      │  error / cancel   │                              │
//!      ├───────────────────┘                              │
//!      │      call closed / disconnect()                  │
//!      └──────────────────────────────────────────────────┘
//! ```
//!
//! Inbound calls skip `Connecting`: the status goes straight from
//! `Disconnected` to `Connected` when the remote stream arrives.
//!
//! # State ownership
//!
//! All mutable state sits behind one mutex that is never held across an
//! `.await`. Every attempt carries a generation number; a result that comes
//! back after `disconnect()` finds its generation stale, releases what it
//! acquired and reports [`ConnectionError::Cancelled`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use super::config::ManagerConfig;
use super::timeout::with_timeout;
use super::types::{ConnectionStatus, ManagerStats};
use crate::call::{CallDirection, CallEvent, CallId, CallInfo, CallSession, CallState, CloseReason};
use crate::error::{ConnectionError, ConnectionResult};
use crate::events::{dispatch, ConnectionEvent, ConnectionEventHandler, EventStream};
use crate::media::{MediaHandle, MediaKind, MediaSourceProvider};
use crate::signaling::{
    IncomingCallHandler, IncomingOffer, LinkEvent, SessionIdentifier, SignalingError,
    SignalingIdentity,
};

/// Peer connection lifecycle manager
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager").finish_non_exhaustive()
    }
}

struct ManagerInner {
    config: ManagerConfig,
    media: Arc<dyn MediaSourceProvider>,
    identity: Arc<dyn SignalingIdentity>,
    state: Mutex<ManagerState>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

#[derive(Default)]
struct ManagerState {
    status: ConnectionStatus,
    generation: u64,
    pending: Option<PendingAttempt>,
    call: Option<ActiveCall>,
    local_media: Option<MediaHandle>,
    remote_media: Option<MediaHandle>,
    session_id: Option<SessionIdentifier>,
    disposed: bool,
    stats: ManagerStats,
}

impl ManagerState {
    fn is_busy(&self) -> bool {
        self.status != ConnectionStatus::Disconnected || self.pending.is_some() || self.call.is_some()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.pending.as_ref().is_some_and(|p| p.generation == generation)
    }
}

struct PendingAttempt {
    generation: u64,
    direction: CallDirection,
}

struct ActiveCall {
    generation: u64,
    session: CallSession,
    tasks: Vec<JoinHandle<()>>,
}

impl ActiveCall {
    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl ConnectionManager {
    /// Create a manager around the given collaborators
    ///
    /// The signaling identity is not opened yet; call [`open`](Self::open).
    pub fn new(
        config: ManagerConfig,
        media: Arc<dyn MediaSourceProvider>,
        identity: Arc<dyn SignalingIdentity>,
    ) -> ConnectionResult<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                media,
                identity,
                state: Mutex::new(ManagerState::default()),
                event_tx,
            }),
        })
    }

    /// Register with the rendezvous service
    ///
    /// Installs the inbound call handler and waits for the identifier.
    /// Registration failures are reported, not retried.
    pub async fn open(&self) -> ConnectionResult<SessionIdentifier> {
        let inner = &self.inner;
        if inner.state.lock().disposed {
            return Err(ConnectionError::invalid_state("manager has been disposed"));
        }

        inner.identity.on_incoming_call(Arc::new(ManagerCallHandler {
            inner: Arc::downgrade(inner),
        }));

        match inner.identity.open().await {
            Ok(id) => {
                inner.state.lock().session_id = Some(id.clone());
                info!(endpoint = %inner.config.label, session_id = %id, "Signaling identity ready");
                inner.emit(ConnectionEvent::IdentityReady { session_id: id.clone() });
                Ok(id)
            }
            Err(e) => {
                let error = ConnectionError::from(e);
                warn!(endpoint = %inner.config.label, error = %error, "Signaling registration failed");
                inner.emit(ConnectionEvent::Error { error: error.clone() });
                Err(error)
            }
        }
    }

    /// Call `target` with the configured default media kind
    pub async fn connect(&self, target: &str) -> ConnectionResult<CallId> {
        self.connect_with(target, self.inner.config.default_media_kind).await
    }

    /// Call `target` sending `kind` media
    ///
    /// Returns once the call session exists and is negotiating. The status
    /// moves to `Connected` later, when the remote stream arrives.
    pub async fn connect_with(&self, target: &str, kind: MediaKind) -> ConnectionResult<CallId> {
        let inner = &self.inner;
        let target = SessionIdentifier::parse_target(target).ok_or(ConnectionError::InvalidTarget)?;
        let generation = inner.begin_outbound()?;
        info!(endpoint = %inner.config.label, %target, %kind, "Connecting");

        let local = match inner.media.acquire(kind).await {
            Ok(handle) => handle,
            Err(e) => return Err(inner.fail_attempt(generation, e.into())),
        };
        if !inner.adopt_local_media(generation, &local) {
            return Err(ConnectionError::Cancelled);
        }

        let timeout = inner.config.negotiation_timeout();
        let originate = async {
            inner
                .identity
                .originate(&target, local.clone())
                .await
                .map_err(ConnectionError::from)
        };
        let session = match with_timeout("originate", timeout, originate).await {
            Ok(session) => session,
            Err(e) => return Err(inner.fail_attempt(generation, e)),
        };

        inner.install_session(generation, session)
    }

    /// Answer an inbound offer
    ///
    /// Invoked by the signaling identity's callback. Returns `Ok(None)` when
    /// the offer is deliberately left unanswered (busy, or auto-answer off);
    /// the caller then times out on its side.
    pub async fn handle_incoming_call(&self, offer: IncomingOffer) -> ConnectionResult<Option<CallId>> {
        let inner = &self.inner;
        let generation = match inner.begin_inbound(&offer)? {
            Some(generation) => generation,
            None => return Ok(None),
        };
        info!(endpoint = %inner.config.label, from = %offer.from(), "Answering incoming call");

        let local = match inner.media.acquire(MediaKind::Camera).await {
            Ok(handle) => handle,
            Err(e) => return Err(inner.fail_attempt(generation, e.into())),
        };
        if !inner.adopt_local_media(generation, &local) {
            return Err(ConnectionError::Cancelled);
        }

        let timeout = inner.config.negotiation_timeout();
        let answer_media = local.clone();
        let answer = async move { offer.answer(answer_media).await.map_err(ConnectionError::from) };
        let session = match with_timeout("answer", timeout, answer).await {
            Ok(session) => session,
            Err(e) => return Err(inner.fail_attempt(generation, e)),
        };

        inner.install_session(generation, session).map(Some)
    }

    /// End the current call or attempt
    ///
    /// Always safe to call. Closes the call session, releases local media and
    /// returns to `Disconnected`. The signaling registration stays open.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        let mut st = inner.state.lock();
        if st.call.is_some() || st.pending.is_some() || st.local_media.is_some() {
            info!(endpoint = %inner.config.label, "Disconnecting");
        }
        if let Some(e) = inner.teardown(&mut st) {
            debug!(error = %e, "Remote close signal failed during disconnect");
        }
    }

    /// Tear everything down
    ///
    /// Closes the call session, releases local media, then closes the
    /// signaling registration. Every step runs even if an earlier one failed;
    /// the first failure is returned afterwards. The manager rejects further
    /// operations once disposed.
    pub async fn dispose(&self) -> ConnectionResult<()> {
        let inner = &self.inner;
        let link_error = {
            let mut st = inner.state.lock();
            if st.disposed {
                return Ok(());
            }
            st.disposed = true;
            info!(endpoint = %inner.config.label, "Disposing connection manager");
            inner.teardown(&mut st)
        };

        let close_result = inner.identity.close().await;
        if let Err(e) = &close_result {
            warn!(endpoint = %inner.config.label, error = %e, "Failed to close signaling identity");
        }
        inner.state.lock().session_id = None;
        inner.emit(ConnectionEvent::IdentityClosed);

        match link_error {
            Some(e) => Err(e.into()),
            None => close_result.map_err(ConnectionError::from),
        }
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status
    }

    /// Identifier of the open registration
    pub fn session_id(&self) -> Option<SessionIdentifier> {
        self.inner.state.lock().session_id.clone()
    }

    /// Local media currently held
    pub fn local_media(&self) -> Option<MediaHandle> {
        self.inner.state.lock().local_media.clone()
    }

    /// Remote media of the active call
    pub fn remote_media(&self) -> Option<MediaHandle> {
        self.inner.state.lock().remote_media.clone()
    }

    /// Snapshot of the current call, if any
    pub fn active_call(&self) -> Option<CallInfo> {
        self.inner.state.lock().call.as_ref().map(|c| c.session.info())
    }

    /// Activity counters
    pub fn stats(&self) -> ManagerStats {
        self.inner.state.lock().stats.clone()
    }

    /// Whether [`dispose`](Self::dispose) has run
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Configuration in use
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Subscribe to manager events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Manager events as a stream
    pub fn events(&self) -> EventStream {
        BroadcastStream::new(self.subscribe())
    }

    /// Forward every event to `handler` on a background task
    pub fn set_event_handler(&self, handler: Arc<dyn ConnectionEventHandler>) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => dispatch(handler.as_ref(), event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event handler lagging, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl ManagerInner {
    fn emit(&self, event: ConnectionEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn set_status(&self, st: &mut ManagerState, status: ConnectionStatus) {
        if st.status == status {
            return;
        }
        let previous = std::mem::replace(&mut st.status, status);
        debug!(endpoint = %self.config.label, %previous, current = %status, "Status changed");
        self.emit(ConnectionEvent::StatusChanged {
            previous,
            current: status,
        });
    }

    fn begin_outbound(&self) -> ConnectionResult<u64> {
        let mut st = self.state.lock();
        if st.disposed {
            return Err(ConnectionError::invalid_state("manager has been disposed"));
        }
        if st.is_busy() {
            return Err(ConnectionError::invalid_state(format!(
                "cannot connect while {}",
                if st.call.is_some() || st.pending.is_some() {
                    "a call is in progress".to_string()
                } else {
                    st.status.to_string()
                }
            )));
        }
        if st.session_id.is_none() {
            return Err(SignalingError::NotRegistered.into());
        }

        st.generation += 1;
        let generation = st.generation;
        st.pending = Some(PendingAttempt {
            generation,
            direction: CallDirection::Outgoing,
        });
        st.stats.total_attempts += 1;
        st.stats.outbound_attempts += 1;
        self.set_status(&mut st, ConnectionStatus::Connecting);
        Ok(generation)
    }

    fn begin_inbound(&self, offer: &IncomingOffer) -> ConnectionResult<Option<u64>> {
        let mut st = self.state.lock();
        if st.disposed {
            st.stats.ignored_offers += 1;
            debug!(endpoint = %self.config.label, from = %offer.from(), "Disposed, dropping incoming offer");
            return Err(ConnectionError::invalid_state("manager has been disposed"));
        }
        self.emit(ConnectionEvent::IncomingCall {
            offer_id: offer.id(),
            from: offer.from().clone(),
        });

        if !self.config.auto_answer {
            st.stats.ignored_offers += 1;
            info!(endpoint = %self.config.label, from = %offer.from(), "Auto-answer disabled, leaving offer unanswered");
            return Ok(None);
        }
        if st.is_busy() {
            st.stats.ignored_offers += 1;
            warn!(endpoint = %self.config.label, from = %offer.from(), status = %st.status, "Busy, ignoring incoming call");
            return Ok(None);
        }

        st.generation += 1;
        let generation = st.generation;
        st.pending = Some(PendingAttempt {
            generation,
            direction: CallDirection::Incoming,
        });
        st.stats.total_attempts += 1;
        st.stats.inbound_calls += 1;
        Ok(Some(generation))
    }

    /// Record a failed attempt and return the error to hand to the caller
    fn fail_attempt(&self, generation: u64, error: ConnectionError) -> ConnectionError {
        let mut st = self.state.lock();
        if !st.is_current(generation) {
            debug!(generation, error = %error, "Attempt failed after it was cancelled");
            return ConnectionError::Cancelled;
        }

        let direction = st.pending.take().map(|p| p.direction);
        st.stats.failed_attempts += 1;
        self.release_local(&mut st);
        self.set_status(&mut st, ConnectionStatus::Disconnected);
        warn!(endpoint = %self.config.label, ?direction, error = %error, "Connection attempt failed");
        self.emit(ConnectionEvent::Error { error: error.clone() });
        error
    }

    /// Take ownership of freshly acquired media, or release it if stale
    fn adopt_local_media(&self, generation: u64, handle: &MediaHandle) -> bool {
        let mut st = self.state.lock();
        if !st.is_current(generation) {
            drop(st);
            debug!(generation, "Discarding media acquired for a cancelled attempt");
            self.media.release(handle);
            return false;
        }

        if let Some(previous) = st.local_media.replace(handle.clone()) {
            self.media.release(&previous);
        }
        self.emit(ConnectionEvent::LocalStreamAvailable {
            handle: handle.clone(),
        });
        true
    }

    fn install_session(self: &Arc<Self>, generation: u64, mut session: CallSession) -> ConnectionResult<CallId> {
        let link_events = session.take_link_events();
        let mut st = self.state.lock();
        if !st.is_current(generation) {
            drop(st);
            debug!(generation, call_id = %session.id(), "Closing call session created for a cancelled attempt");
            session.close();
            return Err(ConnectionError::Cancelled);
        }

        st.pending = None;
        let call_id = session.id();
        let mut tasks = Vec::new();
        if let Some(rx) = link_events {
            tasks.push(spawn_link_pump(Arc::downgrade(self), generation, rx));
        }
        if let Some(duration_ms) = self.config.negotiation_timeout_ms {
            let weak = Arc::downgrade(self);
            tasks.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                if let Some(inner) = weak.upgrade() {
                    inner.on_negotiation_timeout(generation, duration_ms);
                }
            }));
        }

        info!(
            endpoint = %self.config.label,
            %call_id,
            remote = %session.remote_id(),
            direction = ?session.direction(),
            "Call session negotiating"
        );
        st.call = Some(ActiveCall {
            generation,
            session,
            tasks,
        });
        Ok(call_id)
    }

    /// Apply a backend event; returns `false` once the pump should stop
    fn on_link_event(&self, generation: u64, event: LinkEvent) -> bool {
        let mut st = self.state.lock();
        let failure = match &event {
            LinkEvent::NegotiationFailed { reason } => Some(reason.clone()),
            _ => None,
        };

        let (outcome, call_id) = match st.call.as_mut() {
            Some(call) if call.generation == generation => {
                (call.session.handle_link_event(event), call.session.id())
            }
            _ => {
                debug!(generation, "Ignoring link event for a call that is gone");
                return false;
            }
        };

        match outcome {
            Some(CallEvent::RemoteStreamAvailable(handle)) => {
                st.remote_media = Some(handle.clone());
                st.stats.connected_calls += 1;
                info!(endpoint = %self.config.label, %call_id, "Remote stream available");
                self.emit(ConnectionEvent::RemoteStreamAvailable { call_id, handle });
                self.set_status(&mut st, ConnectionStatus::Connected);
                true
            }
            Some(CallEvent::Closed(reason)) => {
                self.emit(ConnectionEvent::CallClosed { call_id, reason });
                if reason == CloseReason::NegotiationError {
                    st.stats.failed_attempts += 1;
                    let reason = failure.unwrap_or_else(|| "negotiation failed".to_string());
                    self.emit(ConnectionEvent::Error {
                        error: SignalingError::NegotiationError { reason }.into(),
                    });
                }
                self.teardown(&mut st);
                false
            }
            None => true,
        }
    }

    fn on_negotiation_timeout(&self, generation: u64, duration_ms: u64) {
        let mut st = self.state.lock();
        let call_id = match st.call.as_mut() {
            Some(call) if call.generation == generation && call.session.state() == CallState::Negotiating => {
                call.session.fail_negotiation("negotiation timed out");
                call.session.id()
            }
            _ => return,
        };

        warn!(endpoint = %self.config.label, %call_id, duration_ms, "Call did not become active in time");
        st.stats.failed_attempts += 1;
        self.emit(ConnectionEvent::CallClosed {
            call_id,
            reason: CloseReason::NegotiationError,
        });
        self.emit(ConnectionEvent::Error {
            error: ConnectionError::NegotiationTimeout {
                operation: "negotiation".to_string(),
                duration_ms,
            },
        });
        self.teardown(&mut st);
    }

    fn release_local(&self, st: &mut ManagerState) {
        if let Some(local) = st.local_media.take() {
            self.media.release(&local);
            self.emit(ConnectionEvent::LocalStreamReleased);
        }
    }

    /// Close the call, release local media and return to `Disconnected`
    ///
    /// Returns the error the link reported while signalling the close.
    fn teardown(&self, st: &mut ManagerState) -> Option<SignalingError> {
        if let Some(pending) = st.pending.take() {
            debug!(generation = pending.generation, direction = ?pending.direction, "Cancelling pending attempt");
            st.stats.cancelled_attempts += 1;
        }

        let mut link_error = None;
        if let Some(mut call) = st.call.take() {
            call.abort_tasks();
            let call_id = call.session.id();
            if let Some(CallEvent::Closed(reason)) = call.session.close() {
                self.emit(ConnectionEvent::CallClosed { call_id, reason });
            }
            link_error = call.session.take_link_error();
        }
        st.remote_media = None;

        self.release_local(st);
        self.set_status(st, ConnectionStatus::Disconnected);
        link_error
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        if st.disposed {
            return;
        }
        if st.call.is_some() || st.local_media.is_some() || st.session_id.is_some() {
            warn!(endpoint = %self.config.label, "Connection manager dropped without dispose()");
        }
        if let Some(mut call) = st.call.take() {
            call.abort_tasks();
            call.session.close();
        }
        if let Some(local) = st.local_media.take() {
            self.media.release(&local);
        }
    }
}

fn spawn_link_pump(
    inner: Weak<ManagerInner>,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<LinkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if !inner.on_link_event(generation, event) {
                return;
            }
        }

        // backend dropped its side without a close signal
        if let Some(inner) = inner.upgrade() {
            debug!(generation, "Link channel closed, treating as remote close");
            inner.on_link_event(generation, LinkEvent::RemoteClosed);
        }
    })
}

/// Bridges the signaling identity's callback to the manager
struct ManagerCallHandler {
    inner: Weak<ManagerInner>,
}

impl IncomingCallHandler for ManagerCallHandler {
    fn on_incoming_call(&self, offer: IncomingOffer) {
        let Some(inner) = self.inner.upgrade() else {
            debug!(from = %offer.from(), "Manager gone, dropping incoming offer");
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(from = %offer.from(), "No async runtime available, dropping incoming offer");
            return;
        };

        let manager = ConnectionManager { inner };
        runtime.spawn(async move {
            match manager.handle_incoming_call(offer).await {
                Ok(Some(call_id)) => debug!(%call_id, "Incoming call answered"),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Incoming call not established"),
            }
        });
    }
}
