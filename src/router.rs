use crate::candidate::ConnectivityCandidate;
use crate::description::SessionDescription;
use crate::error::Error;
use crate::negotiation::NegotiationStateMachine;
use crate::signal::{EventName, RelayMessage};

/// Decoded inbound relay message, ready to be applied to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Join,
    Peer,
    NewPeer,
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(ConnectivityCandidate),
    Leave,
}

/// Demultiplexes relay messages into state machine entry points.
///
/// Anything it can't make sense of (unknown event names, undecodable JSON, offers without SDP,
/// malformed candidates) is dropped and counted as an anomaly. None of them are fatal.
#[derive(Debug, Default)]
pub struct SignalingEventRouter {
    anomalies: u64,
}

impl SignalingEventRouter {
    /// Number of inbound messages dropped so far.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    pub fn decode(&mut self, text: &str) -> Option<Inbound> {
        match RelayMessage::from_json(text) {
            Ok(message) => self.route(message),
            Err(e) => {
                log::warn!("ignoring relay message `{}`: {}", text, e);
                self.anomalies += 1;
                None
            }
        }
    }

    pub fn route(&mut self, message: RelayMessage) -> Option<Inbound> {
        let inbound = match message.event {
            EventName::Join => Ok(Inbound::Join),
            EventName::Peer => Ok(Inbound::Peer),
            EventName::NewPeer => Ok(Inbound::NewPeer),
            EventName::Offer => message.session_description().map(Inbound::Offer),
            EventName::Answer => message.session_description().map(Inbound::Answer),
            EventName::Candidate => message.connectivity_candidate().map(Inbound::Candidate),
            EventName::Leave | EventName::Bye => Ok(Inbound::Leave),
            EventName::Unknown => Err(Error::protocol_violation("unknown relay event")),
        };
        match inbound {
            Ok(inbound) => Some(inbound),
            Err(e) => {
                log::warn!("ignoring relay message: {}", e);
                self.anomalies += 1;
                None
            }
        }
    }
}

/// Calls the state machine entry point corresponding to an inbound message.
pub(crate) async fn dispatch(machine: &mut NegotiationStateMachine, inbound: Inbound) {
    match inbound {
        Inbound::Join => machine.on_join_ack(),
        Inbound::Peer => machine.on_peer(),
        Inbound::NewPeer => machine.on_new_peer().await,
        Inbound::Offer(offer) => machine.on_offer(offer).await,
        Inbound::Answer(answer) => machine.on_answer(answer).await,
        Inbound::Candidate(candidate) => machine.on_candidate(candidate).await,
        Inbound::Leave => machine.on_peer_left().await,
    }
}
