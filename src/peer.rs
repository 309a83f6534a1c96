use crate::config::Config;
use crate::error::Error;
use crate::media::MediaSource;
use crate::negotiation::{
    Event, LocalIntent, NegotiationState, NegotiationStateMachine, NegotiationStatus,
};
use crate::signal::RelayMessage;
use crate::transport::{RemoteTrack, TransportEngine};
use std::fmt::Formatter;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A participant of a two-party call.
///
/// Owns a [NegotiationStateMachine] running on a background task. Local intents, relay messages
/// and engine callbacks are all posted to the same queue, so they are applied in the order they
/// arrived. Messages meant for the remote participant come out of [Peer::listen] and must be
/// passed to the relay, which is not part of this crate.
pub struct Peer {
    ingress: UnboundedSender<Event>,
    status: NegotiationStatus,
    signals: Mutex<UnboundedReceiver<RelayMessage>>,
    tracks: Mutex<UnboundedReceiver<RemoteTrack>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Peer {
    /// Starts the negotiation driver. Must be called from within a tokio runtime.
    pub fn start<E>(engine: E, config: Config) -> Self
    where
        E: TransportEngine + 'static,
    {
        Self::with_engine(Arc::new(engine), config)
    }

    pub fn with_engine(engine: Arc<dyn TransportEngine>, config: Config) -> Self {
        let (ingress, events) = unbounded_channel();
        let (machine, outputs) = NegotiationStateMachine::new(engine, config, ingress.clone());
        let status = machine.status();
        let driver = tokio::spawn(drive(machine, events));
        Peer {
            ingress,
            status,
            signals: Mutex::new(outputs.signals),
            tracks: Mutex::new(outputs.tracks),
            driver: Mutex::new(Some(driver)),
        }
    }

    pub fn join(&self) -> Result<(), Error> {
        self.post(Event::Local(LocalIntent::Join))
    }

    /// Reports local media capture as ready. `None` joins the call without sending media.
    pub fn media_ready(&self, media: Option<MediaSource>) -> Result<(), Error> {
        self.post(Event::Local(LocalIntent::MediaReady(media)))
    }

    pub fn leave(&self) -> Result<(), Error> {
        self.post(Event::Local(LocalIntent::Leave))
    }

    /// Applies a message received from the relay.
    pub fn deliver(&self, message: RelayMessage) -> Result<(), Error> {
        self.post(Event::Relay(message))
    }

    /// Applies a raw JSON message received from the relay. Undecodable messages are dropped by
    /// the driver and don't fail this call.
    pub fn deliver_json<S: Into<String>>(&self, text: S) -> Result<(), Error> {
        self.post(Event::RelayText(text.into()))
    }

    /// Next message which should be sent to the relay. Returns `None` once the driver stopped
    /// and all of its messages were consumed.
    pub async fn listen(&self) -> Option<RelayMessage> {
        let mut signals = self.signals.lock().await;
        signals.recv().await
    }

    /// Next media track received from the remote participant.
    pub async fn remote_track(&self) -> Option<RemoteTrack> {
        let mut tracks = self.tracks.lock().await;
        tracks.recv().await
    }

    pub fn state(&self) -> NegotiationState {
        self.status.get()
    }

    pub fn status(&self) -> &NegotiationStatus {
        &self.status
    }

    /// The most recent failure which closed a session, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.status.last_error()
    }

    /// Waits until transport connectivity with the remote participant is established.
    pub async fn connected(&self) -> Result<(), Error> {
        self.status
            .wait_until(|state| state == NegotiationState::Connected)
            .await?;
        Ok(())
    }

    /// Leaves the room, releases the active session and stops the driver.
    pub async fn close(&self) -> Result<(), Error> {
        let _ = self.ingress.send(Event::Local(LocalIntent::Shutdown));
        let driver = self.driver.lock().await.take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                log::error!("negotiation driver failed: {}", e);
                return Err(Error::SessionClosed);
            }
        }
        Ok(())
    }

    fn post(&self, event: Event) -> Result<(), Error> {
        if self.status.is_stopped() {
            return Err(Error::SessionClosed);
        }
        self.ingress.send(event).map_err(|_| Error::SessionClosed)
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        let _ = self.ingress.send(Event::Local(LocalIntent::Shutdown));
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("state", &self.status.get())
            .finish()
    }
}

async fn drive(mut machine: NegotiationStateMachine, mut events: UnboundedReceiver<Event>) {
    while let Some(event) = events.recv().await {
        let shutdown = matches!(event, Event::Local(LocalIntent::Shutdown));
        machine.handle(event).await;
        if shutdown {
            break;
        }
    }
    machine.leave().await;
    log::debug!(
        "negotiation driver stopped, {} relay anomalies",
        machine.router().anomalies()
    );
    machine.status().stop();
}

#[cfg(test)]
mod test {
    use crate::config::Config;
    use crate::error::Error;
    use crate::negotiation::{NegotiationState, Stage};
    use crate::peer::Peer;
    use crate::signal::{EventName, RelayMessage};
    use crate::testing::{Call, MockEngine};
    use crate::transport::{IceConnectionState, SessionId, TransportEvent};
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    fn config(user: &str) -> Config {
        Config {
            user_id: Some(user.into()),
            room_id: Some(1u64.into()),
            require_local_media: false,
            rejoin_after_peer_leave: true,
        }
    }

    /// Forwards everything `from` produces to `to`. When a participant other than the first one
    /// joins, introduces both of them to each other the way the relay does.
    fn relay(from: Arc<Peer>, to: Arc<Peer>, first: bool) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(async move {
            while let Some(signal) = from.listen().await {
                if signal.event == EventName::Join {
                    if !first {
                        to.deliver(RelayMessage::new(EventName::NewPeer, Default::default()))?;
                        from.deliver(RelayMessage::new(EventName::Peer, Default::default()))?;
                    }
                } else {
                    to.deliver(signal)?;
                }
            }
            Ok(())
        })
    }

    fn last_session(engine: &MockEngine) -> SessionId {
        engine
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Open(session) => Some(session),
                _ => None,
            })
            .last()
            .expect("no session opened")
    }

    #[tokio::test]
    async fn two_peers_negotiate_over_relay() -> Result<(), Error> {
        let _ = env_logger::builder().is_test(true).try_init();
        let e1 = MockEngine::default();
        let e2 = MockEngine::default();
        let p1 = Arc::new(Peer::start(e1.clone(), config("alice")));
        let p2 = Arc::new(Peer::start(e2.clone(), config("bob")));

        let _ = relay(p1.clone(), p2.clone(), true);
        let _ = relay(p2.clone(), p1.clone(), false);

        p1.join()?;
        p2.join()?;

        let connecting = |s: NegotiationState| s == NegotiationState::Connecting;
        p1.status().wait_until(connecting).await?;
        p2.status().wait_until(connecting).await?;

        // wait for the answer to reach the caller before reporting connectivity
        let s1 = last_session(&e1);
        while !e1.calls_of(s1).iter().any(|c| matches!(c, Call::SetRemote(..))) {
            tokio::task::yield_now().await;
        }

        let s2 = last_session(&e2);
        let connected = TransportEvent::IceConnectionStateChange(IceConnectionState::Connected);
        assert!(e1.fire(s1, connected.clone(), false));
        assert!(e2.fire(s2, connected, false));

        p1.connected().await?;
        p2.connected().await?;
        assert!(p1.last_error().is_none());

        p1.close().await?;
        p2.close().await?;
        assert!(e1.is_detached(s1));
        assert!(e2.is_detached(s2));
        Ok(())
    }

    #[tokio::test]
    async fn closed_peer_refuses_work() -> Result<(), Error> {
        let peer = Peer::start(MockEngine::default(), config("alice"));
        peer.join()?;
        peer.status()
            .wait_until(|s| s == NegotiationState::Negotiating(Stage::AwaitingPeer))
            .await?;
        peer.deliver_json("not even json")?;

        peer.close().await?;
        assert_eq!(peer.state(), NegotiationState::Idle);
        assert!(matches!(peer.join(), Err(Error::SessionClosed)));
        assert!(matches!(peer.connected().await, Err(Error::SessionClosed)));

        let mut sent = Vec::new();
        while let Some(msg) = peer.listen().await {
            sent.push(msg.event);
        }
        assert_eq!(sent, vec![EventName::Join, EventName::Leave]);

        // closing twice is fine
        peer.close().await?;
        Ok(())
    }
}
