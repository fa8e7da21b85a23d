//! Single-exchange SDP signaling over HTTP.

use super::Signaling;
use crate::mint::EphemeralKey;
use crate::peer::{IceCandidate, PeerConnection};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::Arc;
use talkbook_core::sdp::validate_offer;
use tokio::sync::mpsc;
use tracing::{error, info};

pub struct HttpSdpSignaling {
    http: reqwest::Client,
    api_base: String,
    model: String,
}

impl HttpSdpSignaling {
    pub fn new(http: reqwest::Client, api_base: &str, model: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Signaling for HttpSdpSignaling {
    async fn negotiate(
        &mut self,
        peer: Arc<dyn PeerConnection>,
        key: &EphemeralKey,
        _local_candidates: mpsc::Receiver<IceCandidate>,
    ) -> Result<()> {
        let offer = peer.create_offer(true).await?;
        validate_offer(&offer)?;

        let response = self
            .http
            .post(format!("{}/realtime", self.api_base))
            .query(&[("model", self.model.as_str())])
            .header(AUTHORIZATION, format!("Bearer {}", key.expose()))
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer)
            .send()
            .await
            .context("SDP request failed")?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(%status, body = %body, "SDP negotiation failed");
            bail!("SDP negotiation failed ({}): {}", status, body);
        }

        peer.apply_answer(&body).await?;
        info!(model = %self.model, "Applied SDP answer");
        Ok(())
    }

    async fn close(&mut self) {}
}
