//! Multi-message signaling over a WebSocket.
//!
//! The client pings, waits for the pong, sends its offer, then applies the
//! answer and any remote candidates. Candidates keep flowing both ways on a
//! relay task until the signaling is closed.

use super::Signaling;
use crate::mint::EphemeralKey;
use crate::peer::{IceCandidate, PeerConnection};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Messages exchanged on the signaling socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    Ping,
    Pong,
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
    Error { message: String },
}

impl SignalMessage {
    fn to_ws(&self) -> Result<WsMessage> {
        Ok(WsMessage::Text(serde_json::to_string(self)?.into()))
    }
}

pub struct WebSocketSignaling {
    url: String,
    relay: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl WebSocketSignaling {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            relay: None,
            shutdown: None,
        }
    }

    /// Whether a relay task currently holds an open socket.
    pub fn is_open(&self) -> bool {
        self.relay.as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[async_trait]
impl Signaling for WebSocketSignaling {
    async fn negotiate(
        &mut self,
        peer: Arc<dyn PeerConnection>,
        key: &EphemeralKey,
        mut local_candidates: mpsc::Receiver<IceCandidate>,
    ) -> Result<()> {
        self.close().await;

        let mut request = self.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {}", key.expose()).parse()?);
        let (ws_stream, _) = connect_async(request)
            .await
            .context("Failed to connect to the signaling socket")?;
        let (mut sink, mut source) = ws_stream.split();
        info!(url = %self.url, "Connected to signaling socket");

        let handshake =
            exchange_offer(peer.as_ref(), &mut sink, &mut source, &mut local_candidates).await;
        if let Err(e) = handshake {
            let _ = sink.send(WsMessage::Close(None)).await;
            let _ = sink.close().await;
            return Err(e);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);
        self.relay = Some(tokio::spawn(relay(
            peer,
            sink,
            source,
            local_candidates,
            shutdown_rx,
        )));
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(relay) = self.relay.take() {
            let _ = relay.await;
            debug!("Signaling socket closed");
        }
    }
}

/// Ping, offer, and wait for the answer. Remote candidates that arrive before
/// the answer are held back and applied once it is in place.
async fn exchange_offer(
    peer: &dyn PeerConnection,
    sink: &mut WsSink,
    source: &mut WsSource,
    local_candidates: &mut mpsc::Receiver<IceCandidate>,
) -> Result<()> {
    sink.send(SignalMessage::Ping.to_ws()?).await?;
    loop {
        match next_signal(source).await? {
            SignalMessage::Pong => break,
            SignalMessage::Error { message } => bail!("Signaling error: {}", message),
            other => debug!(?other, "Ignoring message before pong"),
        }
    }

    let offer = peer.create_offer(false).await?;
    sink.send(SignalMessage::Offer { sdp: offer }.to_ws()?).await?;

    let mut early_candidates = Vec::new();
    loop {
        tokio::select! {
            signal = next_signal(source) => match signal? {
                SignalMessage::Answer { sdp } => {
                    peer.apply_answer(&sdp).await?;
                    break;
                }
                SignalMessage::Candidate { candidate } => early_candidates.push(candidate),
                SignalMessage::Ping => sink.send(SignalMessage::Pong.to_ws()?).await?,
                SignalMessage::Error { message } => bail!("Signaling error: {}", message),
                other => debug!(?other, "Ignoring message while awaiting answer"),
            },
            Some(candidate) = local_candidates.recv() => {
                sink.send(SignalMessage::Candidate { candidate }.to_ws()?).await?;
            }
        }
    }

    for candidate in early_candidates {
        peer.add_remote_candidate(candidate).await?;
    }
    info!("Applied SDP answer from signaling socket");
    Ok(())
}

/// Reads the next signaling message, skipping frames that are not JSON text.
async fn next_signal(source: &mut WsSource) -> Result<SignalMessage> {
    while let Some(frame) = source.next().await {
        match frame? {
            WsMessage::Text(text) => match serde_json::from_str::<SignalMessage>(text.as_str()) {
                Ok(msg) => return Ok(msg),
                Err(e) => warn!(error = %e, "Ignoring unrecognised signaling message"),
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    Err(anyhow!("Signaling socket closed before negotiation finished"))
}

/// Keeps trickling candidates in both directions until shut down or the
/// server goes away, then closes the socket.
async fn relay(
    peer: Arc<dyn PeerConnection>,
    mut sink: WsSink,
    mut source: WsSource,
    mut local_candidates: mpsc::Receiver<IceCandidate>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(candidate) = local_candidates.recv() => {
                let Ok(msg) = (SignalMessage::Candidate { candidate }).to_ws() else { continue };
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<SignalMessage>(text.as_str()) {
                        Ok(SignalMessage::Candidate { candidate }) => {
                            if let Err(e) = peer.add_remote_candidate(candidate).await {
                                warn!(error = %e, "Failed to add remote candidate");
                            }
                        }
                        Ok(SignalMessage::Ping) => {
                            if let Ok(pong) = SignalMessage::Pong.to_ws() {
                                let _ = sink.send(pong).await;
                            }
                        }
                        Ok(other) => debug!(?other, "Ignoring signaling message"),
                        Err(e) => warn!(error = %e, "Ignoring unrecognised signaling message"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(error = %e, "Signaling socket error");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }
    let _ = sink.send(WsMessage::Close(None)).await;
    let _ = sink.close().await;
}
