use crate::error::Error;
use crate::signal::Identifier;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;

/// Negotiation settings of a single participant.
///
/// Can be deserialized from JSON, all fields are optional:
///
/// ```rust
/// use duet::Config;
///
/// let config = Config::from_json(r#"{"userId": "alice", "roomId": 100}"#).unwrap();
/// assert!(config.require_local_media);
/// assert!(config.rejoin_after_peer_leave);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Identifier announced in the `join` message.
    pub user_id: Option<Identifier>,
    /// Room announced in the `join` message.
    pub room_id: Option<Identifier>,
    /// When set, a join waits for local media to become ready before the session is created.
    pub require_local_media: bool,
    /// When set, a fresh session is prepared right after the remote peer left or negotiation
    /// failed, so that the next `newpeer`/`offer` can be served without joining again.
    pub rejoin_after_peer_leave: bool,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            user_id: None,
            room_id: None,
            require_local_media: true,
            rejoin_after_peer_leave: true,
        }
    }
}

/// Settings of the webrtc-rs backed transport engine.
#[derive(Clone)]
pub struct Options {
    pub rtc_config: RTCConfiguration,
}

impl Options {
    pub fn with_ice_servers(urls: &[&str]) -> Self {
        let ice_servers = if urls.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: urls.iter().map(|&url| url.to_owned()).collect(),
                ..Default::default()
            }]
        };
        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };
        Options { rtc_config }
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::with_ice_servers(&["stun:stun.l.google.com:19302"])
    }
}
