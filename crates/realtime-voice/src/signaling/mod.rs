//! Signaling strategies.
//!
//! - `http`: a single SDP offer/answer exchange over HTTP (OpenAI).
//! - `websocket`: ping, offer, then answer and candidates over a socket (Outspeed).

pub mod http;
pub mod websocket;

use crate::mint::EphemeralKey;
use crate::peer::{IceCandidate, PeerConnection};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use talkbook_core::provider::{ConnectionType, Provider};
use tokio::sync::mpsc;

pub use http::HttpSdpSignaling;
pub use websocket::{SignalMessage, WebSocketSignaling};

/// Establishes a peer connection's remote description.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Runs the exchange until the answer is applied to `peer`.
    ///
    /// `local_candidates` yields the peer's trickled candidates; strategies
    /// that embed candidates in the offer may ignore it.
    async fn negotiate(
        &mut self,
        peer: Arc<dyn PeerConnection>,
        key: &EphemeralKey,
        local_candidates: mpsc::Receiver<IceCandidate>,
    ) -> Result<()>;

    /// Releases any signaling transport. Safe to call repeatedly.
    async fn close(&mut self);
}

/// The signaling strategy a provider expects, against its public endpoints.
pub fn for_provider(provider: Provider, model: Option<&str>) -> Box<dyn Signaling> {
    let model = model.unwrap_or(provider.default_model());
    match provider.connection_type() {
        ConnectionType::WebRtc => Box::new(HttpSdpSignaling::new(
            reqwest::Client::new(),
            provider.default_api_base(),
            model,
        )),
        ConnectionType::WebSocket => {
            Box::new(WebSocketSignaling::new(talkbook_core::provider::OUTSPEED_WS_URL))
        }
    }
}
