use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Failure reported by the transport engine.
    #[error("transport engine: {0}")]
    Transport(Arc<webrtc::Error>),
    /// Offer/answer creation or application failed. Fatal to the session it happened in.
    #[error(transparent)]
    Description(#[from] DescriptionError),
    /// A single connectivity candidate could not be applied. Never fatal.
    #[error(transparent)]
    CandidateApplication(#[from] CandidateApplicationError),
    #[error("malformed connectivity candidate: {0}")]
    MalformedCandidate(String),
    #[error("malformed relay message: {0}")]
    MalformedMessage(Arc<serde_json::Error>),
    /// Message or intent that doesn't fit the current negotiation state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("relay channel closed")]
    RelayClosed,
    #[error("session driver has stopped")]
    SessionClosed,
}

impl Error {
    pub fn protocol_violation<S: Into<String>>(msg: S) -> Self {
        Error::ProtocolViolation(msg.into())
    }
}

impl From<webrtc::Error> for Error {
    fn from(value: webrtc::Error) -> Self {
        Error::Transport(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::MalformedMessage(Arc::new(value))
    }
}

/// Step of the offer/answer exchange at which a [DescriptionError] occurred.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DescriptionStage {
    CreateOffer,
    CreateAnswer,
    SetLocal,
    SetRemote,
}

impl Display for DescriptionStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            DescriptionStage::CreateOffer => "create offer",
            DescriptionStage::CreateAnswer => "create answer",
            DescriptionStage::SetLocal => "set local description",
            DescriptionStage::SetRemote => "set remote description",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("negotiation failed at {stage}: {cause}")]
pub struct DescriptionError {
    pub stage: DescriptionStage,
    pub cause: Box<Error>,
}

impl DescriptionError {
    pub fn new(stage: DescriptionStage, cause: Error) -> Self {
        DescriptionError {
            stage,
            cause: Box::new(cause),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("candidate (mid: {mid:?}, index: {index:?}) rejected: {cause}")]
pub struct CandidateApplicationError {
    pub mid: Option<String>,
    pub index: Option<u16>,
    pub cause: Box<Error>,
}
