//! [TransportEngine] backed by the [webrtc](https://webrtc.rs) crate.

use crate::candidate::ConnectivityCandidate;
use crate::config::Options;
use crate::description::{SdpKind, SessionDescription};
use crate::error::Error;
use crate::media::MediaSource;
use crate::transport::{
    IceConnectionState, RemoteTrack, TransportCallbacks, TransportEngine, TransportHandle,
};
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Opens a new `RTCPeerConnection` for every session.
#[derive(Clone, Default)]
pub struct RtcEngine {
    options: Options,
}

impl RtcEngine {
    pub fn new(options: Options) -> Self {
        RtcEngine { options }
    }
}

#[async_trait]
impl TransportEngine for RtcEngine {
    async fn open(
        &self,
        callbacks: TransportCallbacks,
        media: Option<&MediaSource>,
    ) -> Result<Box<dyn TransportHandle>, Error> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        // Interceptor registry must not be shared between peer connections.
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(self.options.rtc_config.clone()).await?);
        attach(&pc, callbacks);

        if let Some(media) = media {
            for track in media.tracks() {
                pc.add_track(track.clone()).await?;
            }
        }

        Ok(Box::new(RtcHandle { pc }))
    }
}

fn attach(pc: &RTCPeerConnection, callbacks: TransportCallbacks) {
    {
        let callbacks = callbacks.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => callbacks.ice_candidate(Some(init.into())),
                    Err(e) => log::warn!(
                        "{}: failed to serialize local candidate: {}",
                        callbacks.session(),
                        e
                    ),
                },
                None => callbacks.ice_candidate(None),
            }
            Box::pin(async move {})
        }));
    }
    {
        let callbacks = callbacks.clone();
        pc.on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
            callbacks.ice_connection_state(s.into());
            Box::pin(async move {})
        }));
    }
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        callbacks.track(RemoteTrack::new(track));
        Box::pin(async move {})
    }));
}

struct RtcHandle {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl TransportHandle for RtcHandle {
    async fn create_offer(&self) -> Result<SessionDescription, Error> {
        let offer = self.pc.create_offer(None).await?;
        offer.try_into()
    }

    async fn create_answer(&self) -> Result<SessionDescription, Error> {
        let answer = self.pc.create_answer(None).await?;
        answer.try_into()
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), Error> {
        self.pc.set_local_description(desc.try_into()?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), Error> {
        self.pc.set_remote_description(desc.try_into()?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: ConnectivityCandidate) -> Result<(), Error> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn detach(&self) {
        self.pc
            .on_ice_candidate(Box::new(|_| Box::pin(async move {})));
        self.pc
            .on_ice_connection_state_change(Box::new(|_| Box::pin(async move {})));
        self.pc
            .on_track(Box::new(|_, _, _| Box::pin(async move {})));
    }

    async fn close(&self) -> Result<(), Error> {
        self.pc.close().await?;
        Ok(())
    }
}

impl TryFrom<RTCSessionDescription> for SessionDescription {
    type Error = Error;

    fn try_from(value: RTCSessionDescription) -> Result<Self, Self::Error> {
        let kind = match value.sdp_type {
            RTCSdpType::Offer => SdpKind::Offer,
            RTCSdpType::Answer => SdpKind::Answer,
            other => {
                return Err(Error::protocol_violation(format!(
                    "unsupported session description type: {}",
                    other
                )))
            }
        };
        Ok(SessionDescription {
            kind,
            sdp: value.sdp,
        })
    }
}

impl TryFrom<SessionDescription> for RTCSessionDescription {
    type Error = Error;

    fn try_from(value: SessionDescription) -> Result<Self, Self::Error> {
        let desc = match value.kind {
            SdpKind::Offer => RTCSessionDescription::offer(value.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(value.sdp)?,
        };
        Ok(desc)
    }
}

impl From<RTCIceCandidateInit> for ConnectivityCandidate {
    fn from(value: RTCIceCandidateInit) -> Self {
        ConnectivityCandidate {
            sdp: value.candidate,
            index: value.sdp_mline_index,
            mid: value.sdp_mid,
        }
    }
}

impl From<ConnectivityCandidate> for RTCIceCandidateInit {
    fn from(value: ConnectivityCandidate) -> Self {
        RTCIceCandidateInit {
            candidate: value.sdp,
            sdp_mid: value.mid,
            sdp_mline_index: value.index,
            ..Default::default()
        }
    }
}

impl From<RTCIceConnectionState> for IceConnectionState {
    fn from(value: RTCIceConnectionState) -> Self {
        match value {
            RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => {
                IceConnectionState::New
            }
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
        }
    }
}
