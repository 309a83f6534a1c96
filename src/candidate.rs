use crate::error::{CandidateApplicationError, Error};
use crate::transport::TransportHandle;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Network path descriptor proposed by one of the participants (an ICE candidate).
///
/// Serialized in the relay wire format as `{"sdp": ..., "index": ..., "mid": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityCandidate {
    /// Candidate attribute line, ie. `candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host`.
    pub sdp: String,
    /// Index of the media line the candidate belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u16>,
    /// Media stream identification tag of the media line the candidate belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
}

impl ConnectivityCandidate {
    pub fn new<S: Into<String>>(sdp: S, index: Option<u16>, mid: Option<String>) -> Self {
        ConnectivityCandidate {
            sdp: sdp.into(),
            index,
            mid,
        }
    }

    /// Checks whether this candidate can be handed over to a transport engine at all.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sdp.trim().is_empty() {
            Err(Error::MalformedCandidate("empty candidate line".into()))
        } else if self.index.is_none() && self.mid.is_none() {
            Err(Error::MalformedCandidate(
                "candidate must name either media line index or mid".into(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Candidates received before a remote description was applied.
///
/// Applying a candidate without a remote description is invalid, yet the relay may deliver
/// candidates ahead of the offer/answer they belong to. Such candidates are held here and handed
/// over to the engine in their arrival order once the remote description is in place.
#[derive(Debug, Default)]
pub struct CandidateQueue {
    pending: VecDeque<ConnectivityCandidate>,
}

impl CandidateQueue {
    pub fn enqueue(&mut self, candidate: ConnectivityCandidate) {
        self.pending.push_back(candidate);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Discards all pending candidates without applying them. Returns the number of dropped ones.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Applies all pending candidates in FIFO order. Must be called only after the remote
    /// description has been set. A candidate rejected by the engine is dropped and reported, it
    /// doesn't stop the remaining ones from being applied.
    pub async fn flush(&mut self, handle: &dyn TransportHandle) -> Vec<CandidateApplicationError> {
        let mut failures = Vec::new();
        while let Some(candidate) = self.pending.pop_front() {
            if let Err(e) = apply(handle, candidate).await {
                log::warn!("dropping queued candidate: {}", e);
                failures.push(e);
            }
        }
        failures
    }
}

/// Hands a single candidate over to the engine.
pub(crate) async fn apply(
    handle: &dyn TransportHandle,
    candidate: ConnectivityCandidate,
) -> Result<(), CandidateApplicationError> {
    let mid = candidate.mid.clone();
    let index = candidate.index;
    let result = match candidate.validate() {
        Ok(()) => handle.add_ice_candidate(candidate).await,
        Err(e) => Err(e),
    };
    result.map_err(|cause| CandidateApplicationError {
        mid,
        index,
        cause: Box::new(cause),
    })
}
