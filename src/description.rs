use crate::error::{DescriptionError, DescriptionStage, Error};
use crate::transport::TransportHandle;
use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl Display for SdpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpKind::Offer => f.write_str("offer"),
            SdpKind::Answer => f.write_str("answer"),
        }
    }
}

/// Offer or answer with its opaque SDP payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer<S: Into<String>>(sdp: S) -> Self {
        SessionDescription {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer<S: Into<String>>(sdp: S) -> Self {
        SessionDescription {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Offer/answer steps of a single session.
///
/// Every operation wraps exactly one transport engine call and turns its failure into a
/// [DescriptionError] tagged with the stage it failed at. Each operation may succeed at most once
/// per session: there's no renegotiation, so a second attempt is refused before it reaches the
/// engine.
#[derive(Debug, Default)]
pub struct SessionDescriptionExchange {
    offer_created: bool,
    answer_created: bool,
    local_attempted: bool,
    remote_attempted: bool,
    local_set: bool,
    remote_set: bool,
}

impl SessionDescriptionExchange {
    pub fn local_description_set(&self) -> bool {
        self.local_set
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_set
    }

    pub async fn create_offer(
        &mut self,
        handle: &dyn TransportHandle,
    ) -> Result<SessionDescription, DescriptionError> {
        let stage = DescriptionStage::CreateOffer;
        Self::once(&mut self.offer_created, stage)?;
        let offer = handle
            .create_offer()
            .await
            .map_err(|e| DescriptionError::new(stage, e))?;
        Self::expect_kind(&offer, SdpKind::Offer, stage)?;
        Ok(offer)
    }

    pub async fn create_answer(
        &mut self,
        handle: &dyn TransportHandle,
    ) -> Result<SessionDescription, DescriptionError> {
        let stage = DescriptionStage::CreateAnswer;
        Self::once(&mut self.answer_created, stage)?;
        let answer = handle
            .create_answer()
            .await
            .map_err(|e| DescriptionError::new(stage, e))?;
        Self::expect_kind(&answer, SdpKind::Answer, stage)?;
        Ok(answer)
    }

    pub async fn set_local(
        &mut self,
        handle: &dyn TransportHandle,
        desc: SessionDescription,
    ) -> Result<(), DescriptionError> {
        let stage = DescriptionStage::SetLocal;
        Self::once(&mut self.local_attempted, stage)?;
        handle
            .set_local_description(desc)
            .await
            .map_err(|e| DescriptionError::new(stage, e))?;
        self.local_set = true;
        Ok(())
    }

    /// Applies a remote description. Once this succeeds, connectivity candidates of the session
    /// may be handed over to the engine.
    pub async fn set_remote(
        &mut self,
        handle: &dyn TransportHandle,
        desc: SessionDescription,
    ) -> Result<(), DescriptionError> {
        let stage = DescriptionStage::SetRemote;
        Self::once(&mut self.remote_attempted, stage)?;
        handle
            .set_remote_description(desc)
            .await
            .map_err(|e| DescriptionError::new(stage, e))?;
        self.remote_set = true;
        Ok(())
    }

    fn once(flag: &mut bool, stage: DescriptionStage) -> Result<(), DescriptionError> {
        if *flag {
            Err(Self::repeated(stage))
        } else {
            *flag = true;
            Ok(())
        }
    }

    fn repeated(stage: DescriptionStage) -> DescriptionError {
        DescriptionError::new(
            stage,
            Error::protocol_violation("already performed in this session"),
        )
    }

    fn expect_kind(
        desc: &SessionDescription,
        kind: SdpKind,
        stage: DescriptionStage,
    ) -> Result<(), DescriptionError> {
        if desc.kind == kind {
            Ok(())
        } else {
            let msg = format!("engine produced {} where {} was expected", desc.kind, kind);
            Err(DescriptionError::new(stage, Error::protocol_violation(msg)))
        }
    }
}
