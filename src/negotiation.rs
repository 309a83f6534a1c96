use crate::candidate::ConnectivityCandidate;
use crate::config::Config;
use crate::description::SessionDescription;
use crate::error::{CandidateApplicationError, DescriptionError, DescriptionStage, Error};
use crate::lifecycle::SessionLifecycleManager;
use crate::media::MediaSource;
use crate::router::{self, SignalingEventRouter};
use crate::session::{CandidateDisposition, Role, Session};
use crate::signal::RelayMessage;
use crate::transport::{
    IceConnectionState, RemoteTrack, SessionId, TransportEngine, TransportEvent,
};
use arc_swap::{ArcSwap, ArcSwapOption};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

/// Everything that can move the negotiation forward. All of them go through a single ingress and
/// are handled strictly one after another.
#[derive(Debug)]
pub enum Event {
    Local(LocalIntent),
    Relay(RelayMessage),
    /// Relay message which has not been decoded yet.
    RelayText(String),
    /// Engine callback, tagged with the session it was registered for.
    Transport {
        session: SessionId,
        event: TransportEvent,
    },
}

#[derive(Debug)]
pub enum LocalIntent {
    Join,
    MediaReady(Option<MediaSource>),
    Leave,
    /// Leave and stop the driver.
    Shutdown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    /// No active session.
    Idle,
    AwaitingLocalMedia,
    Negotiating(Stage),
    /// Local description has been sent, waiting for the answer and/or ICE connectivity.
    Connecting,
    Connected,
    Closing,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Session exists but its role is not known yet: neither `newpeer` nor an offer arrived.
    AwaitingPeer,
    Offering,
    Answering,
}

#[derive(Debug)]
enum LocalMedia {
    Pending,
    Ready(Option<MediaSource>),
}

/// Receiving ends of the state machine's outputs.
#[derive(Debug)]
pub struct Outputs {
    /// Messages to be delivered to the remote participant over the relay, in production order.
    pub signals: UnboundedReceiver<RelayMessage>,
    pub tracks: UnboundedReceiver<RemoteTrack>,
}

/// Drives a two-party offer/answer negotiation.
///
/// The participant which is told by the relay that a new peer has joined the room becomes the
/// caller and sends an offer, the other one answers it. Connectivity candidates which arrive
/// before a remote description could be applied are queued and flushed right after it. When the
/// remote peer leaves, the session is torn down and (if configured) a fresh one is prepared
/// immediately, so that the peer can join again.
///
/// Engine callbacks reach the state machine as [Event::Transport] tagged with the session that
/// registered them; events of sessions which have been closed meanwhile are discarded.
pub struct NegotiationStateMachine {
    config: Config,
    lifecycle: SessionLifecycleManager,
    router: SignalingEventRouter,
    status: NegotiationStatus,
    state: NegotiationState,
    session: Option<Session>,
    media: LocalMedia,
    in_room: bool,
    announced: bool,
    signals: UnboundedSender<RelayMessage>,
    tracks: UnboundedSender<RemoteTrack>,
}

impl NegotiationStateMachine {
    /// Creates a new state machine. `events` is the ingress the engine callbacks will post to.
    pub fn new(
        engine: Arc<dyn TransportEngine>,
        config: Config,
        events: UnboundedSender<Event>,
    ) -> (Self, Outputs) {
        let (signals, signals_rx) = unbounded_channel();
        let (tracks, tracks_rx) = unbounded_channel();
        let machine = NegotiationStateMachine {
            config,
            lifecycle: SessionLifecycleManager::new(engine, events),
            router: SignalingEventRouter::default(),
            status: NegotiationStatus::default(),
            state: NegotiationState::Idle,
            session: None,
            media: LocalMedia::Pending,
            in_room: false,
            announced: false,
            signals,
            tracks,
        };
        let outputs = Outputs {
            signals: signals_rx,
            tracks: tracks_rx,
        };
        (machine, outputs)
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn status(&self) -> NegotiationStatus {
        self.status.clone()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn router(&self) -> &SignalingEventRouter {
        &self.router
    }

    pub async fn handle(&mut self, event: Event) {
        match event {
            Event::Local(LocalIntent::Join) => self.join().await,
            Event::Local(LocalIntent::MediaReady(media)) => self.media_ready(media).await,
            Event::Local(LocalIntent::Leave) | Event::Local(LocalIntent::Shutdown) => {
                self.leave().await
            }
            Event::Relay(message) => {
                if let Some(inbound) = self.router.route(message) {
                    router::dispatch(self, inbound).await;
                }
            }
            Event::RelayText(text) => {
                if let Some(inbound) = self.router.decode(&text) {
                    router::dispatch(self, inbound).await;
                }
            }
            Event::Transport { session, event } => self.on_transport_event(session, event).await,
        }
    }

    /// Local intent to join the room.
    pub async fn join(&mut self) {
        if self.state != NegotiationState::Idle {
            self.violation(format!("join requested while {:?}", self.state));
            return;
        }
        self.in_room = true;
        match self.media {
            LocalMedia::Pending if self.config.require_local_media => {
                self.set_state(NegotiationState::AwaitingLocalMedia)
            }
            _ => self.open_session().await,
        }
    }

    /// Local media capture became ready. `None` means that the participant joins without media.
    pub async fn media_ready(&mut self, media: Option<MediaSource>) {
        self.media = LocalMedia::Ready(media);
        if self.state == NegotiationState::AwaitingLocalMedia {
            self.open_session().await;
        } else {
            log::debug!("local media updated while {:?}", self.state);
        }
    }

    /// Local intent to leave the room. Safe to call in any state, repeated calls are no-ops.
    pub async fn leave(&mut self) {
        self.in_room = false;
        self.teardown("local leave").await;
        if self.announced {
            self.announced = false;
            let msg = RelayMessage::leave(self.config.user_id.clone(), self.config.room_id.clone());
            self.emit(msg);
        }
    }

    /// The relay acknowledged our presence in the room.
    pub fn on_join_ack(&mut self) {
        log::debug!("relay acknowledged join");
    }

    /// The relay reports a participant that was already present in the room.
    pub fn on_peer(&mut self) {
        log::debug!("remote peer already present in the room");
    }

    /// The relay reports a newly joined participant: this side becomes the caller.
    pub async fn on_new_peer(&mut self) {
        if !self.assign_role(Role::Caller) {
            return;
        }
        self.set_state(NegotiationState::Negotiating(Stage::Offering));
        match self.offer().await {
            Ok(offer) => {
                self.emit(RelayMessage::description(offer));
                self.set_state(NegotiationState::Connecting);
            }
            Err(e) => self.fail(e).await,
        }
    }

    /// Remote participant sent an offer: this side becomes the callee.
    pub async fn on_offer(&mut self, offer: SessionDescription) {
        if !self.assign_role(Role::Callee) {
            return;
        }
        self.set_state(NegotiationState::Negotiating(Stage::Answering));
        match self.answer(offer).await {
            Ok(answer) => {
                self.emit(RelayMessage::description(answer));
                self.set_state(NegotiationState::Connecting);
            }
            Err(e) => self.fail(e).await,
        }
    }

    pub async fn on_answer(&mut self, answer: SessionDescription) {
        let expected = match &self.session {
            Some(session) => {
                self.state == NegotiationState::Connecting
                    && session.role() == Some(Role::Caller)
                    && !session.remote_description_set()
            }
            None => false,
        };
        if !expected {
            self.violation(format!("unexpected answer while {:?}", self.state));
            return;
        }
        let result = match self.session.as_mut() {
            Some(session) => session.apply_remote(answer).await,
            None => return,
        };
        match result {
            Ok(rejected) => report_rejected(rejected),
            Err(e) => self.fail(e).await,
        }
    }

    pub async fn on_candidate(&mut self, candidate: ConnectivityCandidate) {
        let accepting = matches!(
            self.state,
            NegotiationState::Negotiating(_)
                | NegotiationState::Connecting
                | NegotiationState::Connected
        );
        if !accepting {
            self.violation(format!("candidate received while {:?}", self.state));
            return;
        }
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return,
        };
        match session.add_candidate(candidate).await {
            Ok(CandidateDisposition::Applied) => {
                log::debug!("{}: remote candidate applied", session.id())
            }
            Ok(CandidateDisposition::Queued) => log::debug!(
                "{}: remote candidate queued ({} pending)",
                session.id(),
                session.pending_candidates()
            ),
            Err(e) => log::warn!("{}: {}", session.id(), e),
        }
    }

    /// The remote participant left the room (`leave` or `bye`).
    pub async fn on_peer_left(&mut self) {
        if self.session.is_none() {
            log::debug!("remote peer left while {:?}", self.state);
            return;
        }
        self.teardown("remote peer left").await;
        self.rejoin().await;
    }

    pub async fn on_transport_event(&mut self, id: SessionId, event: TransportEvent) {
        let session = match self.session.as_mut() {
            Some(session) if session.id() == id => session,
            _ => {
                log::debug!("{}: discarding {:?} of a closed session", id, event);
                return;
            }
        };
        match event {
            TransportEvent::IceCandidate(Some(candidate)) => {
                self.emit(RelayMessage::candidate(candidate));
            }
            TransportEvent::IceCandidate(None) => {
                log::debug!("{}: local candidate gathering complete", id);
            }
            TransportEvent::IceConnectionStateChange(ice) => {
                log::debug!("{}: ICE connection state {:?}", id, ice);
                if ice.is_connected() {
                    if !session.mark_connected() {
                        return;
                    }
                    if self.state == NegotiationState::Connecting {
                        log::info!("{}: connected", id);
                        self.set_state(NegotiationState::Connected);
                    } else {
                        log::warn!("{}: ICE connected while {:?}", id, self.state);
                    }
                } else if ice == IceConnectionState::Failed {
                    log::warn!("{}: ICE connectivity failed", id);
                }
            }
            TransportEvent::Track(track) => {
                log::info!("{}: remote track {}", id, track.id());
                if self.tracks.send(track).is_err() {
                    log::debug!("{}: remote track dropped, nobody listens", id);
                }
            }
        }
    }

    fn assign_role(&mut self, role: Role) -> bool {
        let awaiting = self.state == NegotiationState::Negotiating(Stage::AwaitingPeer);
        let result = match self.session.as_mut() {
            Some(session) if awaiting => session.assign_role(role),
            _ => Err(Error::protocol_violation(format!(
                "cannot act as {:?} while {:?}",
                role, self.state
            ))),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        }
    }

    async fn offer(&mut self) -> Result<SessionDescription, DescriptionError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| DescriptionError::new(DescriptionStage::CreateOffer, Error::SessionClosed))?;
        let offer = session.create_offer().await?;
        session.set_local(offer.clone()).await?;
        Ok(offer)
    }

    async fn answer(
        &mut self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, DescriptionError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| DescriptionError::new(DescriptionStage::SetRemote, Error::SessionClosed))?;
        let rejected = session.apply_remote(offer).await?;
        report_rejected(rejected);
        let answer = session.create_answer().await?;
        session.set_local(answer.clone()).await?;
        Ok(answer)
    }

    async fn open_session(&mut self) {
        let media = match &self.media {
            LocalMedia::Ready(media) => media.as_ref(),
            LocalMedia::Pending => None,
        };
        match self.lifecycle.open(media).await {
            Ok(session) => {
                log::info!("{}: session opened", session.id());
                self.session = Some(session);
                self.set_state(NegotiationState::Negotiating(Stage::AwaitingPeer));
                if !self.announced {
                    self.announced = true;
                    let msg =
                        RelayMessage::join(self.config.user_id.clone(), self.config.room_id.clone());
                    self.emit(msg);
                }
            }
            Err(e) => {
                log::error!("failed to open transport handle: {}", e);
                self.in_room = false;
                self.status.fail(e);
                self.set_state(NegotiationState::Idle);
            }
        }
    }

    /// Prepares a fresh session for a participant that stays in the room.
    async fn rejoin(&mut self) {
        if self.in_room && self.config.rejoin_after_peer_leave && self.state == NegotiationState::Idle
        {
            self.open_session().await;
        }
    }

    async fn fail(&mut self, err: DescriptionError) {
        log::error!("{}", err);
        self.status.fail(err.into());
        self.teardown("negotiation failed").await;
        self.rejoin().await;
    }

    async fn teardown(&mut self, reason: &str) {
        if self.session.is_none() && self.state == NegotiationState::Idle {
            return;
        }
        self.set_state(NegotiationState::Closing);
        if let Some(session) = self.session.take() {
            log::info!("{}: closing ({})", session.id(), reason);
            self.lifecycle.release(session).await;
        }
        self.set_state(NegotiationState::Idle);
    }

    fn set_state(&mut self, state: NegotiationState) {
        if self.state != state {
            log::debug!("negotiation state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.status.set(state);
        }
    }

    fn emit(&self, msg: RelayMessage) {
        if self.signals.send(msg).is_err() {
            log::warn!("{}: outbound message dropped", Error::RelayClosed);
        }
    }

    fn violation(&self, msg: String) {
        log::warn!("{}", Error::protocol_violation(msg));
    }
}

fn report_rejected(rejected: Vec<CandidateApplicationError>) {
    for e in rejected {
        log::warn!("{}", e);
    }
}

/// Observable state of a [NegotiationStateMachine], shared with the tasks that wait on it.
#[derive(Debug, Clone)]
pub struct NegotiationStatus(Arc<StatusInner>);

#[derive(Debug)]
struct StatusInner {
    state: ArcSwap<NegotiationState>,
    last_error: ArcSwapOption<Error>,
    changed: Notify,
    stopped: AtomicBool,
}

impl NegotiationStatus {
    pub fn get(&self) -> NegotiationState {
        **self.0.state.load()
    }

    /// The most recent failure which closed a session, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.0.last_error.load_full().map(|e| (*e).clone())
    }

    pub fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::Acquire)
    }

    /// Waits until the state satisfies a given predicate. Fails when the state machine stops
    /// before that happens.
    pub async fn wait_until<F>(&self, predicate: F) -> Result<NegotiationState, Error>
    where
        F: Fn(NegotiationState) -> bool,
    {
        loop {
            let notified = self.0.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let state = self.get();
            if predicate(state) {
                return Ok(state);
            }
            if self.is_stopped() {
                return Err(Error::SessionClosed);
            }
            notified.await;
        }
    }

    fn set(&self, state: NegotiationState) {
        self.0.state.store(Arc::new(state));
        self.0.changed.notify_waiters();
    }

    fn fail(&self, err: Error) {
        self.0.last_error.store(Some(Arc::new(err)));
    }

    pub(crate) fn stop(&self) {
        self.0.stopped.store(true, Ordering::Release);
        self.0.changed.notify_waiters();
    }
}

impl Default for NegotiationStatus {
    fn default() -> Self {
        NegotiationStatus(Arc::new(StatusInner {
            state: ArcSwap::from_pointee(NegotiationState::Idle),
            last_error: ArcSwapOption::empty(),
            changed: Notify::new(),
            stopped: AtomicBool::new(false),
        }))
    }
}
