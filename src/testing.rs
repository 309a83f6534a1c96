//! Recording transport engine used by the unit tests.

use crate::candidate::ConnectivityCandidate;
use crate::description::SessionDescription;
use crate::error::{DescriptionStage, Error};
use crate::media::MediaSource;
use crate::negotiation::Event;
use crate::transport::{
    SessionId, TransportCallbacks, TransportEngine, TransportEvent, TransportHandle,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open(SessionId),
    CreateOffer(SessionId),
    CreateAnswer(SessionId),
    SetLocal(SessionId, SessionDescription),
    SetRemote(SessionId, SessionDescription),
    AddCandidate(SessionId, ConnectivityCandidate),
    Detach(SessionId),
    Close(SessionId),
}

#[derive(Default)]
struct Shared {
    calls: Vec<Call>,
    applied: Vec<(SessionId, ConnectivityCandidate)>,
    callbacks: HashMap<SessionId, TransportCallbacks>,
    detached: HashSet<SessionId>,
    failing: HashSet<DescriptionStage>,
    rejected: HashSet<String>,
    media: HashMap<SessionId, usize>,
    next_detached_id: u64,
}

#[derive(Clone, Default)]
pub struct MockEngine(Arc<Mutex<Shared>>);

impl MockEngine {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, session: SessionId) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.session() == session)
            .collect()
    }

    pub fn applied_candidates(&self, session: SessionId) -> Vec<ConnectivityCandidate> {
        let shared = self.0.lock().unwrap();
        shared
            .applied
            .iter()
            .filter(|(s, _)| *s == session)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn fail_at(&self, stage: DescriptionStage) {
        self.0.lock().unwrap().failing.insert(stage);
    }

    pub fn reject_candidate(&self, sdp: &str) {
        self.0.lock().unwrap().rejected.insert(sdp.to_owned());
    }

    pub fn media_tracks(&self, session: SessionId) -> Option<usize> {
        self.0.lock().unwrap().media.get(&session).copied()
    }

    pub fn is_detached(&self, session: SessionId) -> bool {
        self.0.lock().unwrap().detached.contains(&session)
    }

    /// Fires an engine callback the way a real engine would. Callbacks of detached handles are
    /// swallowed, unless `force` is set to emulate a callback already in flight during teardown.
    pub fn fire(&self, session: SessionId, event: TransportEvent, force: bool) -> bool {
        let callbacks = {
            let shared = self.0.lock().unwrap();
            if shared.detached.contains(&session) && !force {
                return false;
            }
            shared.callbacks.get(&session).cloned()
        };
        match callbacks {
            Some(callbacks) => {
                callbacks.emit(event);
                true
            }
            None => false,
        }
    }

    /// Opens a handle outside of any state machine, for testing the building blocks in isolation.
    pub async fn open_detached(
        &self,
    ) -> (SessionId, Box<dyn TransportHandle>, UnboundedReceiver<Event>) {
        let (tx, rx) = unbounded_channel();
        let session = {
            let mut shared = self.0.lock().unwrap();
            shared.next_detached_id += 1;
            SessionId::new(1000 + shared.next_detached_id)
        };
        let handle = self
            .open(TransportCallbacks::new(session, tx), None)
            .await
            .unwrap();
        (session, handle, rx)
    }

    fn record(&self, call: Call) {
        self.0.lock().unwrap().calls.push(call);
    }

    fn check(&self, stage: DescriptionStage) -> Result<(), Error> {
        if self.0.lock().unwrap().failing.contains(&stage) {
            Err(webrtc::Error::ErrConnectionClosed.into())
        } else {
            Ok(())
        }
    }
}

impl Call {
    fn session(&self) -> SessionId {
        match self {
            Call::Open(s)
            | Call::CreateOffer(s)
            | Call::CreateAnswer(s)
            | Call::SetLocal(s, _)
            | Call::SetRemote(s, _)
            | Call::AddCandidate(s, _)
            | Call::Detach(s)
            | Call::Close(s) => *s,
        }
    }
}

#[async_trait]
impl TransportEngine for MockEngine {
    async fn open(
        &self,
        callbacks: TransportCallbacks,
        media: Option<&MediaSource>,
    ) -> Result<Box<dyn TransportHandle>, Error> {
        let session = callbacks.session();
        self.record(Call::Open(session));
        {
            let mut shared = self.0.lock().unwrap();
            shared.callbacks.insert(session, callbacks);
            if let Some(media) = media {
                shared.media.insert(session, media.tracks().len());
            }
        }
        Ok(Box::new(MockHandle {
            session,
            engine: self.clone(),
        }))
    }
}

struct MockHandle {
    session: SessionId,
    engine: MockEngine,
}

#[async_trait]
impl TransportHandle for MockHandle {
    async fn create_offer(&self) -> Result<SessionDescription, Error> {
        self.engine.record(Call::CreateOffer(self.session));
        self.engine.check(DescriptionStage::CreateOffer)?;
        Ok(SessionDescription::offer(format!(
            "v=0\r\no=- {} 1 IN IP4 127.0.0.1\r\ns=offer\r\n",
            self.session.get()
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, Error> {
        self.engine.record(Call::CreateAnswer(self.session));
        self.engine.check(DescriptionStage::CreateAnswer)?;
        Ok(SessionDescription::answer(format!(
            "v=0\r\no=- {} 1 IN IP4 127.0.0.1\r\ns=answer\r\n",
            self.session.get()
        )))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), Error> {
        self.engine.record(Call::SetLocal(self.session, desc));
        self.engine.check(DescriptionStage::SetLocal)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), Error> {
        self.engine.record(Call::SetRemote(self.session, desc));
        self.engine.check(DescriptionStage::SetRemote)
    }

    async fn add_ice_candidate(&self, candidate: ConnectivityCandidate) -> Result<(), Error> {
        self.engine
            .record(Call::AddCandidate(self.session, candidate.clone()));
        let mut shared = self.engine.0.lock().unwrap();
        if shared.rejected.contains(&candidate.sdp) {
            Err(webrtc::Error::ErrConnectionClosed.into())
        } else {
            shared.applied.push((self.session, candidate));
            Ok(())
        }
    }

    async fn detach(&self) {
        self.engine.record(Call::Detach(self.session));
        self.engine.0.lock().unwrap().detached.insert(self.session);
    }

    async fn close(&self) -> Result<(), Error> {
        self.engine.record(Call::Close(self.session));
        Ok(())
    }
}
