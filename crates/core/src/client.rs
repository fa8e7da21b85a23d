//! HTTP client for the Talk To Book backend routes.

use crate::provider::Provider;
use crate::vision::VisionClient;
use async_trait::async_trait;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Body of `POST /api/session`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    pub provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Result of `POST /api/scrape`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ScrapedPage {
    pub title: String,
    pub content: String,
    pub html: String,
    pub url: String,
}

#[derive(Deserialize)]
struct TranscribeReply {
    transcription: String,
}

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Mints a provider session. The raw provider JSON is returned untouched.
    pub async fn create_session(&self, body: &CreateSessionBody) -> Result<Value, BackendError> {
        debug!(provider = %body.provider, "Requesting realtime session");
        let response = self
            .http
            .post(self.url("/api/session"))
            .json(body)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Exchanges an SDP offer for an answer through the backend proxy.
    pub async fn exchange_sdp(
        &self,
        offer: &str,
        api_key: Option<&str>,
    ) -> Result<String, BackendError> {
        let mut body = serde_json::json!({ "sdp": offer });
        if let Some(key) = api_key {
            body["apiKey"] = Value::String(key.to_string());
        }
        let response = self
            .http
            .post(self.url("/api/realtime/sdp"))
            .json(&body)
            .send()
            .await?;
        Ok(check(response).await?.text().await?)
    }

    pub async fn transcribe(
        &self,
        image: &str,
        prompt: Option<&str>,
    ) -> Result<String, BackendError> {
        let response = self
            .http
            .post(self.url("/api/transcribe"))
            .json(&serde_json::json!({ "image": image, "prompt": prompt }))
            .send()
            .await?;
        let reply: TranscribeReply = check(response).await?.json().await?;
        Ok(reply.transcription)
    }

    pub async fn scrape(&self, url: &str) -> Result<ScrapedPage, BackendError> {
        let response = self
            .http
            .post(self.url("/api/scrape"))
            .header(CONTENT_TYPE, "application/json")
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Turns a non-success response into `BackendError::Status`, preferring the
/// backend's `error` field as the message.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text);
    warn!(%status, %message, "Backend request failed");
    Err(BackendError::Status { status, message })
}

#[async_trait]
impl VisionClient for BackendClient {
    async fn transcribe_image(
        &self,
        image_base64: &str,
        prompt: Option<String>,
    ) -> anyhow::Result<String> {
        Ok(self.transcribe(image_base64, prompt.as_deref()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_session_sends_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/session"))
            .and(body_json(serde_json::json!({
                "provider": "openai",
                "apiKey": "sk-user"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_secret": { "value": "ek_123" }
            })))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let body = CreateSessionBody {
            provider: Provider::OpenAI,
            api_key: Some("sk-user".into()),
            ..Default::default()
        };
        let session = client.create_session(&body).await.unwrap();
        assert_eq!(session["client_secret"]["value"], "ek_123");
    }

    #[tokio::test]
    async fn test_error_field_becomes_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/session"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "error": "API key not configured" })),
            )
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let err = client
            .create_session(&CreateSessionBody::default())
            .await
            .unwrap_err();
        match err {
            BackendError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "API key not configured");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_sdp_returns_raw_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/realtime/sdp"))
            .and(body_json(serde_json::json!({ "sdp": "v=0\r\n" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("v=0\r\nanswer"))
            .mount(&server)
            .await;

        let client = BackendClient::new(format!("{}/", server.uri()));
        let answer = client.exchange_sdp("v=0\r\n", None).await.unwrap();
        assert_eq!(answer, "v=0\r\nanswer");
    }

    #[tokio::test]
    async fn test_backend_client_as_vision_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/transcribe"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "transcription": "## Page 1" })),
            )
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        let text = client
            .transcribe_image("AAAA", Some("page 1".into()))
            .await
            .unwrap();
        assert_eq!(text, "## Page 1");
    }

    #[tokio::test]
    async fn test_scrape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "T", "content": "C", "html": "<p>C</p>", "url": "https://x.test"
            })))
            .mount(&server)
            .await;

        let page = BackendClient::new(server.uri())
            .scrape("https://x.test")
            .await
            .unwrap();
        assert_eq!(page.title, "T");
        assert_eq!(page.url, "https://x.test");
    }
}
