//! `duet` negotiates a two-party [webrtc](https://webrtc.rs) call over a JSON relay channel:
//! - Participants meet in a room on a relay which forwards messages between them. The one which
//!   is told that a new peer joined becomes the caller and creates an offer, the other one answers.
//! - Connectivity candidates arriving before the remote description are queued and applied right
//!   after it, in arrival order.
//! - When the remote peer leaves, the session is torn down and a fresh one is prepared, ready for
//!   the peer to join again. Callbacks of a torn down session never reach the new one.
//!
//! The relay itself is not part of this crate: [Peer::listen] yields messages to be sent to it and
//! [Peer::deliver] (or [Peer::deliver_json]) applies messages received from it. Messages follow the
//! `{"eventName": ..., "metaData": {...}}` format, see [RelayMessage].
//!
//! # Examples
//!
//! ```rust,no_run
//! use duet::{Config, Error, Options, Peer, RtcEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     // channel to the relay, ie. a WebSocket connection
//!     let (to_relay, mut from_relay) = tokio::sync::mpsc::unbounded_channel::<String>();
//!
//!     let config = Config::from_json(r#"{"userId": "alice", "roomId": 100}"#)?;
//!     let peer = Peer::start(RtcEngine::new(Options::default()), config);
//!
//!     // no local media, receive only
//!     peer.media_ready(None)?;
//!     peer.join()?;
//!
//!     loop {
//!         tokio::select! {
//!             Some(msg) = peer.listen() => {
//!                 let _ = to_relay.send(msg.to_json()?);
//!             }
//!             Some(text) = from_relay.recv() => {
//!                 peer.deliver_json(text)?;
//!             }
//!             Some(track) = peer.remote_track() => {
//!                 println!("receiving {}", track.id());
//!                 break;
//!             }
//!         }
//!     }
//!
//!     peer.close().await?;
//!     Ok(())
//! }
//! ```

pub mod candidate;
pub mod config;
pub mod description;
pub mod error;
pub mod lifecycle;
pub mod media;
pub mod negotiation;
pub mod peer;
pub mod router;
pub mod rtc;
pub mod session;
pub mod signal;
pub mod transport;

#[cfg(test)]
mod testing;

pub use candidate::{CandidateQueue, ConnectivityCandidate};
pub use config::{Config, Options};
pub use description::{SdpKind, SessionDescription, SessionDescriptionExchange};
pub use error::Error;
pub use lifecycle::SessionLifecycleManager;
pub use media::MediaSource;
pub use negotiation::{NegotiationState, NegotiationStateMachine, NegotiationStatus};
pub use peer::Peer;
pub use router::SignalingEventRouter;
pub use rtc::RtcEngine;
pub use signal::{EventName, RelayMessage};
pub use transport::{TransportEngine, TransportHandle};
