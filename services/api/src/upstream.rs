//! Calls to the realtime providers and to scraped sites.

use reqwest::{
    StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde_json::Value;
use talkbook_core::provider::{Provider, SessionRequest};
use tracing::{error, info};

const OPENAI_BETA: (&str, &str) = ("OpenAI-Beta", "realtime=v1");

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The upstream answered with a non-success status.
    #[error("Upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Thin wrapper over one shared `reqwest::Client`.
#[derive(Clone, Default)]
pub struct Upstream {
    http: reqwest::Client,
}

impl Upstream {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Creates a realtime session and returns the provider's JSON untouched.
    pub async fn create_session(
        &self,
        provider: Provider,
        api_base: &str,
        api_key: &str,
        request: &SessionRequest,
    ) -> Result<Value, UpstreamError> {
        let mut builder = self
            .http
            .post(provider.sessions_url(api_base))
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .json(request);
        if provider == Provider::OpenAI {
            builder = builder.header(OPENAI_BETA.0, OPENAI_BETA.1);
        }
        let response = builder.send().await?;

        let status = response.status();
        info!(%provider, %status, "Session API response");
        if !status.is_success() {
            let body = response.text().await?;
            error!(%provider, %status, body = %body, "Session creation failed");
            return Err(UpstreamError::Status { status, body });
        }
        let session: Value = response.json().await?;
        info!(
            session_id = session
                .pointer("/client_secret/session_id")
                .or_else(|| session.get("id"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown"),
            "Session created"
        );
        Ok(session)
    }

    /// Forwards an SDP offer to OpenAI and returns the SDP answer.
    pub async fn exchange_sdp(
        &self,
        api_base: &str,
        api_key: &str,
        model: &str,
        offer: String,
    ) -> Result<String, UpstreamError> {
        let response = self
            .http
            .post(format!("{}/realtime", api_base.trim_end_matches('/')))
            .query(&[("model", model)])
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .header(CONTENT_TYPE, "application/sdp")
            .header(OPENAI_BETA.0, OPENAI_BETA.1)
            .body(offer)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(%status, body = %body, "SDP exchange failed");
            return Err(UpstreamError::Status { status, body });
        }
        Ok(body)
    }

    /// Fetches a page's HTML.
    pub async fn fetch_html(&self, url: &str) -> Result<String, UpstreamError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status,
                body: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        Ok(response.text().await?)
    }
}
