use crate::candidate::{self, CandidateQueue, ConnectivityCandidate};
use crate::description::{SessionDescription, SessionDescriptionExchange};
use crate::error::{CandidateApplicationError, DescriptionError, Error};
use crate::transport::{SessionId, TransportHandle};
use std::fmt::Formatter;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    /// Creates the offer. Assigned to the participant which learns about a newly joined peer.
    Caller,
    /// Answers the offer it received.
    Callee,
}

/// What happened to a connectivity candidate handed over to a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CandidateDisposition {
    Applied,
    /// Held until the remote description is applied.
    Queued,
}

/// A single negotiation attempt: its identity, role, description progress, candidates waiting
/// for the remote description and the transport handle it exclusively owns.
pub struct Session {
    id: SessionId,
    role: Option<Role>,
    connected: bool,
    exchange: SessionDescriptionExchange,
    pending: CandidateQueue,
    handle: Box<dyn TransportHandle>,
}

impl Session {
    pub(crate) fn new(id: SessionId, handle: Box<dyn TransportHandle>) -> Self {
        Session {
            id,
            role: None,
            connected: false,
            exchange: SessionDescriptionExchange::default(),
            pending: CandidateQueue::default(),
            handle,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_description_set(&self) -> bool {
        self.exchange.local_description_set()
    }

    pub fn remote_description_set(&self) -> bool {
        self.exchange.remote_description_set()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn assign_role(&mut self, role: Role) -> Result<(), Error> {
        match self.role {
            None => {
                self.role = Some(role);
                Ok(())
            }
            Some(current) => Err(Error::protocol_violation(format!(
                "{} already acts as {:?}, refusing to become {:?}",
                self.id, current, role
            ))),
        }
    }

    /// Marks the transport as connected. Returns `false` if that already happened before.
    pub(crate) fn mark_connected(&mut self) -> bool {
        !std::mem::replace(&mut self.connected, true)
    }

    pub(crate) async fn create_offer(&mut self) -> Result<SessionDescription, DescriptionError> {
        self.exchange.create_offer(self.handle.as_ref()).await
    }

    pub(crate) async fn create_answer(&mut self) -> Result<SessionDescription, DescriptionError> {
        self.exchange.create_answer(self.handle.as_ref()).await
    }

    pub(crate) async fn set_local(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), DescriptionError> {
        self.exchange.set_local(self.handle.as_ref(), desc).await
    }

    /// Applies the remote description and flushes candidates which were waiting for it.
    /// Returned are the candidates the engine refused, which are not fatal for the session.
    pub(crate) async fn apply_remote(
        &mut self,
        desc: SessionDescription,
    ) -> Result<Vec<CandidateApplicationError>, DescriptionError> {
        self.exchange.set_remote(self.handle.as_ref(), desc).await?;
        if self.pending.is_empty() {
            Ok(Vec::new())
        } else {
            log::debug!(
                "{}: flushing {} queued candidates",
                self.id,
                self.pending.len()
            );
            Ok(self.pending.flush(self.handle.as_ref()).await)
        }
    }

    pub(crate) async fn add_candidate(
        &mut self,
        candidate: ConnectivityCandidate,
    ) -> Result<CandidateDisposition, CandidateApplicationError> {
        if self.remote_description_set() {
            candidate::apply(self.handle.as_ref(), candidate).await?;
            Ok(CandidateDisposition::Applied)
        } else if let Err(cause) = candidate.validate() {
            Err(CandidateApplicationError {
                mid: candidate.mid,
                index: candidate.index,
                cause: Box::new(cause),
            })
        } else {
            self.pending.enqueue(candidate);
            Ok(CandidateDisposition::Queued)
        }
    }

    /// Takes the transport handle out of a session that is being closed. Pending candidates are
    /// discarded without being applied.
    pub(crate) fn dismantle(mut self) -> (Box<dyn TransportHandle>, usize) {
        let dropped = self.pending.clear();
        (self.handle, dropped)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("connected", &self.connected)
            .field("exchange", &self.exchange)
            .field("pending", &self.pending.len())
            .finish()
    }
}
