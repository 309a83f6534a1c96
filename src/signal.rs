//! Relay wire format: one JSON object per message.
//!
//! ```json
//! {"eventName": "offer", "metaData": {"sdp": "v=0..."}}
//! {"eventName": "candidate", "metaData": {"candidate": {"sdp": "candidate:...", "index": 0, "mid": "0"}}}
//! {"eventName": "join", "metaData": {"userId": "alice", "roomId": 100}}
//! ```

use crate::candidate::ConnectivityCandidate;
use crate::description::{SdpKind, SessionDescription};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventName {
    Join,
    Peer,
    #[serde(rename = "newpeer", alias = "new-peer")]
    NewPeer,
    Offer,
    Answer,
    Candidate,
    Leave,
    Bye,
    #[serde(other)]
    Unknown,
}

/// Participant or room identifier. The relay accepts both strings and plain numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Number(u64),
    Text(String),
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Identifier::Number(n) => write!(f, "{}", n),
            Identifier::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::Text(value.to_owned())
    }
}

impl From<u64> for Identifier {
    fn from(value: u64) -> Self {
        Identifier::Number(value)
    }
}

/// Candidate payload as it was received: decoding of a bad candidate must not fail the whole
/// message, so anything that doesn't fit is kept around verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidatePayload {
    Valid(ConnectivityCandidate),
    Malformed(serde_json::Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<CandidatePayload>,
    /// Media line index of a candidate sent in flat form (`metaData: {sdp, index, mid}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u16>,
    /// Media id of a candidate sent in flat form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<Identifier>,
}

impl MetaData {
    pub fn is_empty(&self) -> bool {
        self == &MetaData::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    #[serde(rename = "eventName")]
    pub event: EventName,
    #[serde(rename = "metaData", default, skip_serializing_if = "MetaData::is_empty")]
    pub meta: MetaData,
}

impl RelayMessage {
    pub fn new(event: EventName, meta: MetaData) -> Self {
        RelayMessage { event, meta }
    }

    pub fn join(user_id: Option<Identifier>, room_id: Option<Identifier>) -> Self {
        RelayMessage::new(
            EventName::Join,
            MetaData {
                user_id,
                room_id,
                ..MetaData::default()
            },
        )
    }

    pub fn leave(user_id: Option<Identifier>, room_id: Option<Identifier>) -> Self {
        RelayMessage::new(
            EventName::Leave,
            MetaData {
                user_id,
                room_id,
                ..MetaData::default()
            },
        )
    }

    /// Wraps a local description into an `offer` or `answer` message.
    pub fn description(desc: SessionDescription) -> Self {
        let event = match desc.kind {
            SdpKind::Offer => EventName::Offer,
            SdpKind::Answer => EventName::Answer,
        };
        RelayMessage::new(
            event,
            MetaData {
                sdp: Some(desc.sdp),
                ..MetaData::default()
            },
        )
    }

    pub fn candidate(candidate: ConnectivityCandidate) -> Self {
        RelayMessage::new(
            EventName::Candidate,
            MetaData {
                candidate: Some(CandidatePayload::Valid(candidate)),
                ..MetaData::default()
            },
        )
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Extracts the SDP payload of an `offer` or `answer` message.
    pub fn session_description(&self) -> Result<SessionDescription, Error> {
        let kind = match self.event {
            EventName::Offer => SdpKind::Offer,
            EventName::Answer => SdpKind::Answer,
            other => {
                return Err(Error::protocol_violation(format!(
                    "{:?} message carries no session description",
                    other
                )))
            }
        };
        match &self.meta.sdp {
            Some(sdp) if !sdp.is_empty() => Ok(SessionDescription {
                kind,
                sdp: sdp.clone(),
            }),
            _ => Err(Error::protocol_violation(format!(
                "{} message without sdp payload",
                kind
            ))),
        }
    }

    /// Extracts the connectivity candidate of a `candidate` message. Both the nested
    /// `metaData.candidate` form and the flat `metaData: {sdp, index, mid}` one are understood.
    pub fn connectivity_candidate(self) -> Result<ConnectivityCandidate, Error> {
        let meta = self.meta;
        let candidate = match meta.candidate {
            Some(CandidatePayload::Valid(candidate)) => candidate,
            Some(CandidatePayload::Malformed(value)) => {
                return Err(Error::MalformedCandidate(value.to_string()))
            }
            None => match meta.sdp {
                Some(sdp) => ConnectivityCandidate::new(sdp, meta.index, meta.mid),
                None => return Err(Error::MalformedCandidate("missing candidate".into())),
            },
        };
        candidate.validate()?;
        Ok(candidate)
    }
}

#[cfg(test)]
mod test {
    use crate::candidate::ConnectivityCandidate;
    use crate::description::SessionDescription;
    use crate::signal::{EventName, Identifier, RelayMessage};
    use serde_json::json;

    #[test]
    fn decode_inbound_kinds() {
        let cases = [
            ("join", EventName::Join),
            ("peer", EventName::Peer),
            ("newpeer", EventName::NewPeer),
            ("new-peer", EventName::NewPeer),
            ("offer", EventName::Offer),
            ("answer", EventName::Answer),
            ("candidate", EventName::Candidate),
            ("leave", EventName::Leave),
            ("bye", EventName::Bye),
            ("renegotiate", EventName::Unknown),
        ];
        for (name, expected) in cases {
            let msg = RelayMessage::from_json(&json!({ "eventName": name }).to_string()).unwrap();
            assert_eq!(msg.event, expected, "event name {}", name);
        }
    }

    #[test]
    fn offer_payload() {
        let msg = RelayMessage::from_json(r#"{"eventName":"offer","metaData":{"sdp":"v=0"}}"#)
            .unwrap();
        assert_eq!(
            msg.session_description().unwrap(),
            SessionDescription::offer("v=0")
        );

        let empty = RelayMessage::from_json(r#"{"eventName":"answer","metaData":{}}"#).unwrap();
        assert!(empty.session_description().is_err());
    }

    #[test]
    fn nested_and_flat_candidates() {
        let expected = ConnectivityCandidate::new("candidate:1 1 udp 1 10.0.0.1 9 typ host", Some(0), Some("0".into()));
        let nested = json!({
            "eventName": "candidate",
            "metaData": { "candidate": { "sdp": expected.sdp, "index": 0, "mid": "0" } }
        });
        let flat = json!({
            "eventName": "candidate",
            "metaData": { "sdp": expected.sdp, "index": 0, "mid": "0" }
        });
        for value in [nested, flat] {
            let msg = RelayMessage::from_json(&value.to_string()).unwrap();
            assert_eq!(msg.connectivity_candidate().unwrap(), expected);
        }
    }

    #[test]
    fn malformed_candidate_keeps_message_decodable() {
        let value = json!({ "eventName": "candidate", "metaData": { "candidate": { "index": "zero" } } });
        let msg = RelayMessage::from_json(&value.to_string()).unwrap();
        assert_eq!(msg.event, EventName::Candidate);
        assert!(msg.connectivity_candidate().is_err());
    }

    #[test]
    fn outbound_encoding() {
        let join = RelayMessage::join(Some("alice".into()), Some(Identifier::Number(100)));
        let value: serde_json::Value = serde_json::from_str(&join.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "eventName": "join", "metaData": { "userId": "alice", "roomId": 100 } })
        );

        let candidate = RelayMessage::candidate(ConnectivityCandidate::new("candidate:2", Some(1), None));
        let value: serde_json::Value = serde_json::from_str(&candidate.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "eventName": "candidate", "metaData": { "candidate": { "sdp": "candidate:2", "index": 1 } } })
        );

        let answer = RelayMessage::description(SessionDescription::answer("v=0"));
        let value: serde_json::Value = serde_json::from_str(&answer.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({ "eventName": "answer", "metaData": { "sdp": "v=0" } }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(RelayMessage::from_json("not json").is_err());
        assert!(RelayMessage::from_json(r#"{"metaData":{}}"#).is_err());
    }
}
