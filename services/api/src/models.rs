//! Request and response bodies of the proxy routes, documented with `utoipa`.

use serde::{Deserialize, Serialize};
use talkbook_core::provider::Provider;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionPayload {
    #[serde(default)]
    #[schema(value_type = String, example = "outspeed")]
    pub provider: Provider,
    #[schema(example = "MiniCPM-o-2_6")]
    pub model: Option<String>,
    /// Overrides the server's key for this provider.
    pub api_key: Option<String>,
    /// Only forwarded to providers that accept instructions at session creation.
    pub instructions: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeKeyPayload {
    pub api_key: Option<String>,
}

/// JSON form of an SDP exchange. The route also accepts the bare offer.
#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SdpPayload {
    pub sdp: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct TranscribePayload {
    /// A base64 PNG, with or without a `data:image/png;base64,` prefix.
    pub image: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct TranscribeResponse {
    pub transcription: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct ScrapePayload {
    #[schema(example = "https://example.com/article")]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ScrapeResponse {
    pub title: String,
    /// Visible body text with whitespace collapsed.
    pub content: String,
    /// The page's HTML without scripts, links opening in a new tab.
    pub html: String,
    pub url: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: None,
            details: None,
        }
    }
}
