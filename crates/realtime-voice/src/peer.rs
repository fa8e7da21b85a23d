//! Peer connection abstraction.
//!
//! The voice session drives the connection only through these traits, so the
//! signaling and lifecycle logic is independent of the WebRTC stack that
//! carries the audio.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Label of the data channel carrying provider events.
pub const DATA_CHANNEL_LABEL: &str = "oai-events";

/// A network candidate in the same JSON shape browsers use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

/// Things a peer connection reports asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    DataChannelOpen,
    DataChannelMessage(String),
    LocalCandidate(IceCandidate),
    RemoteAudio,
    ConnectionFailed(String),
}

#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Creates an offer and installs it as the local description.
    ///
    /// With `wait_for_candidates` the call returns only once ICE gathering has
    /// finished, so the SDP embeds every candidate. Otherwise candidates trickle
    /// out as `PeerEvent::LocalCandidate`.
    async fn create_offer(&self, wait_for_candidates: bool) -> Result<String>;

    async fn apply_answer(&self, sdp: &str) -> Result<()>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Sends a text message over the data channel.
    async fn send_text(&self, text: &str) -> Result<()>;

    fn is_channel_open(&self) -> bool;

    /// Stops sending microphone audio and releases the local track.
    async fn stop_microphone(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates peer connections wired to an event channel.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    async fn create(&self, events: mpsc::Sender<PeerEvent>) -> Result<Arc<dyn PeerConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_uses_browser_field_names() {
        let c = IceCandidate {
            candidate: "candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
    }

    #[test]
    fn test_candidate_optional_fields_default() {
        let c: IceCandidate = serde_json::from_str(r#"{"candidate":"candidate:x"}"#).unwrap();
        assert_eq!(c.sdp_mid, None);
        assert_eq!(c.sdp_m_line_index, None);
    }
}
