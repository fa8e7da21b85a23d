//! Ephemeral key minting.
//!
//! The long-lived provider key never reaches the voice client: the backend
//! creates a provider session and hands back its short-lived client secret.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use talkbook_core::client::{BackendClient, CreateSessionBody};
use talkbook_core::provider::Provider;
use tracing::{info, instrument};

/// A short-lived credential scoped to one realtime session.
#[derive(Debug, Clone)]
pub struct EphemeralKey {
    value: SecretString,
    pub session_id: Option<String>,
    pub expires_at: Option<i64>,
}

impl EphemeralKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            session_id: None,
            expires_at: None,
        }
    }

    /// Reads `client_secret.value` out of a provider session response.
    pub fn from_session(session: &Value) -> Result<Self> {
        let secret = session
            .get("client_secret")
            .context("Session response has no client_secret")?;
        let value = secret
            .get("value")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .context("Session response has no client_secret.value")?;

        let session_id = secret
            .get("session_id")
            .or_else(|| session.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let expires_at = secret.get("expires_at").and_then(Value::as_i64);

        Ok(Self {
            value: SecretString::from(value.to_string()),
            session_id,
            expires_at,
        })
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }
}

/// What to ask the backend for.
#[derive(Debug, Clone, Default)]
pub struct MintRequest {
    pub provider: Provider,
    pub model: Option<String>,
    /// A user-supplied provider key that overrides the server's own.
    pub api_key: Option<SecretString>,
    pub instructions: Option<String>,
}

/// Source of ephemeral keys.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn mint(&self, request: MintRequest) -> Result<EphemeralKey>;
}

/// Mints keys through the backend's `/api/session` route.
pub struct SessionMinter {
    backend: BackendClient,
}

impl SessionMinter {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl KeySource for SessionMinter {
    #[instrument(skip_all, fields(provider = %request.provider))]
    async fn mint(&self, request: MintRequest) -> Result<EphemeralKey> {
        let body = CreateSessionBody {
            provider: request.provider,
            model: request.model,
            api_key: request
                .api_key
                .as_ref()
                .map(|k| k.expose_secret().to_string()),
            instructions: request.instructions,
        };
        let session = self
            .backend
            .create_session(&body)
            .await
            .context("Unable to obtain realtime session token")?;
        let key = EphemeralKey::from_session(&session)?;
        info!(session_id = ?key.session_id, "Minted ephemeral key");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_from_session_reads_secret_and_ids() {
        let key = EphemeralKey::from_session(&serde_json::json!({
            "id": "sess_1",
            "client_secret": { "value": "ek_abc", "expires_at": 1700000000 }
        }))
        .unwrap();
        assert_eq!(key.expose(), "ek_abc");
        assert_eq!(key.session_id.as_deref(), Some("sess_1"));
        assert_eq!(key.expires_at, Some(1700000000));
    }

    #[test]
    fn test_from_session_requires_value() {
        assert!(EphemeralKey::from_session(&serde_json::json!({})).is_err());
        assert!(
            EphemeralKey::from_session(&serde_json::json!({ "client_secret": { "value": "" } }))
                .is_err()
        );
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let key = EphemeralKey::new("ek_secret");
        assert!(!format!("{:?}", key).contains("ek_secret"));
    }

    #[tokio::test]
    async fn test_mint_forwards_override_key_and_instructions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/session"))
            .and(body_partial_json(serde_json::json!({
                "provider": "outspeed",
                "apiKey": "user-key",
                "instructions": "page 1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_secret": { "value": "ek_out", "session_id": "s-9" }
            })))
            .mount(&server)
            .await;

        let minter = SessionMinter::new(BackendClient::new(server.uri()));
        let key = minter
            .mint(MintRequest {
                provider: Provider::Outspeed,
                api_key: Some(SecretString::from("user-key".to_string())),
                instructions: Some("page 1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(key.expose(), "ek_out");
        assert_eq!(key.session_id.as_deref(), Some("s-9"));
    }

    #[tokio::test]
    async fn test_mint_surfaces_backend_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/session"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "error": "API key not configured" })),
            )
            .mount(&server)
            .await;

        let minter = SessionMinter::new(BackendClient::new(server.uri()));
        let err = minter.mint(MintRequest::default()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("API key not configured"));
    }
}
