//! Boundary between the negotiation core and the engine which actually moves media packets.
//!
//! The core never talks to `webrtc` types directly: it drives a [TransportHandle] through its
//! offer/answer/candidate primitives and learns about the engine's progress through
//! [TransportEvent]s posted by [TransportCallbacks]. Every callback is bound to the [SessionId]
//! it was registered for, so events of a torn down session can be told apart from the current one.

use crate::candidate::ConnectivityCandidate;
use crate::description::SessionDescription;
use crate::error::Error;
use crate::media::MediaSource;
use crate::negotiation::Event;
use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use webrtc::track::track_remote::TrackRemote;

/// Identity of a single negotiation attempt. Never reused within a process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn new(id: u64) -> Self {
        SessionId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// Both `Connected` and `Completed` mean that a working candidate pair has been selected.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            IceConnectionState::Connected | IceConnectionState::Completed
        )
    }
}

/// Media track received from the remote participant.
#[derive(Clone)]
pub struct RemoteTrack(Arc<TrackRemote>);

impl RemoteTrack {
    pub fn new(track: Arc<TrackRemote>) -> Self {
        RemoteTrack(track)
    }

    pub fn id(&self) -> String {
        self.0.id()
    }
}

impl AsRef<TrackRemote> for RemoteTrack {
    fn as_ref(&self) -> &TrackRemote {
        &self.0
    }
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RemoteTrack").field(&self.0.id()).finish()
    }
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Locally gathered candidate. `None` marks the end of gathering.
    IceCandidate(Option<ConnectivityCandidate>),
    IceConnectionStateChange(IceConnectionState),
    Track(RemoteTrack),
}

/// Sink given to the engine when a handle is opened. Engine callbacks must only post events here
/// and never reach into negotiation state themselves.
#[derive(Debug, Clone)]
pub struct TransportCallbacks {
    session: SessionId,
    events: UnboundedSender<Event>,
}

impl TransportCallbacks {
    pub(crate) fn new(session: SessionId, events: UnboundedSender<Event>) -> Self {
        TransportCallbacks { session, events }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn emit(&self, event: TransportEvent) {
        let event = Event::Transport {
            session: self.session,
            event,
        };
        if self.events.send(event).is_err() {
            log::debug!("{}: dropping transport event, driver is gone", self.session);
        }
    }

    pub fn ice_candidate(&self, candidate: Option<ConnectivityCandidate>) {
        self.emit(TransportEvent::IceCandidate(candidate))
    }

    pub fn ice_connection_state(&self, state: IceConnectionState) {
        self.emit(TransportEvent::IceConnectionStateChange(state))
    }

    pub fn track(&self, track: RemoteTrack) {
        self.emit(TransportEvent::Track(track))
    }
}

/// Factory of transport handles. Every session gets its own, freshly opened handle.
#[async_trait]
pub trait TransportEngine: Send + Sync {
    async fn open(
        &self,
        callbacks: TransportCallbacks,
        media: Option<&MediaSource>,
    ) -> Result<Box<dyn TransportHandle>, Error>;
}

#[async_trait]
pub trait TransportHandle: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, Error>;

    async fn create_answer(&self) -> Result<SessionDescription, Error>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), Error>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), Error>;

    async fn add_ice_candidate(&self, candidate: ConnectivityCandidate) -> Result<(), Error>;

    /// Unregisters all lifecycle callbacks. Called before [TransportHandle::close].
    async fn detach(&self);

    async fn close(&self) -> Result<(), Error>;
}
