use crate::error::Error;
use crate::media::MediaSource;
use crate::negotiation::Event;
use crate::session::Session;
use crate::transport::{SessionId, TransportCallbacks, TransportEngine};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Creates and releases the transport handles of consecutive sessions.
///
/// Handles are never reused: an engine can't be reset in the middle of its lifecycle, so every
/// session gets a newly opened one, with callbacks bound to that session's identity.
pub struct SessionLifecycleManager {
    engine: Arc<dyn TransportEngine>,
    events: UnboundedSender<Event>,
    last_id: u64,
}

impl SessionLifecycleManager {
    pub fn new(engine: Arc<dyn TransportEngine>, events: UnboundedSender<Event>) -> Self {
        SessionLifecycleManager {
            engine,
            events,
            last_id: 0,
        }
    }

    pub async fn open(&mut self, media: Option<&MediaSource>) -> Result<Session, Error> {
        self.last_id += 1;
        let id = SessionId::new(self.last_id);
        let callbacks = TransportCallbacks::new(id, self.events.clone());
        let handle = self.engine.open(callbacks, media).await?;
        log::debug!("{}: transport handle opened", id);
        Ok(Session::new(id, handle))
    }

    /// Detaches engine callbacks and only then closes the handle, so nothing fires against the
    /// session once it's gone.
    pub async fn release(&mut self, session: Session) {
        let id = session.id();
        let (handle, dropped) = session.dismantle();
        if dropped > 0 {
            log::debug!("{}: discarded {} pending candidates", id, dropped);
        }
        handle.detach().await;
        if let Err(e) = handle.close().await {
            log::warn!("{}: failed to close transport handle: {}", id, e);
        }
        log::debug!("{}: transport handle released", id);
    }
}
