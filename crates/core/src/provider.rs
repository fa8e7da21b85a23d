//! Realtime Provider Catalogue
//!
//! Endpoints, default models and session-creation bodies for the two hosted
//! realtime voice providers the application talks to.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const OUTSPEED_API_BASE_URL: &str = "https://api.outspeed.com/v1";
pub const OUTSPEED_WS_URL: &str = "wss://api.outspeed.com/v1/realtime/ws";

/// STUN servers handed to every peer connection.
pub const ICE_SERVERS: &[&str] = &["stun:stun.l.google.com:19302"];

/// Sampling temperature requested for every realtime session.
pub const SESSION_TEMPERATURE: f32 = 0.6;

/// The hosted realtime voice providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    #[default]
    Outspeed,
}

/// How a provider expects the peer connection to be negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// A single HTTP POST carrying the SDP offer, answered with the SDP answer.
    WebRtc,
    /// A WebSocket signaling channel carrying offer, answer and candidates.
    WebSocket,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Unknown realtime provider: {0}")]
pub struct UnknownProvider(pub String);

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Outspeed => "outspeed",
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => OPENAI_API_BASE_URL,
            Provider::Outspeed => OUTSPEED_API_BASE_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o-realtime-preview-2024-12-17",
            Provider::Outspeed => "MiniCPM-o-2_6",
        }
    }

    pub fn default_voice(&self) -> &'static str {
        match self {
            Provider::OpenAI => "sage",
            Provider::Outspeed => "female",
        }
    }

    /// Name of the environment variable holding this provider's server-side key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Outspeed => "OUTSPEED_API_KEY",
        }
    }

    pub fn connection_type(&self) -> ConnectionType {
        match self {
            Provider::OpenAI => ConnectionType::WebRtc,
            Provider::Outspeed => ConnectionType::WebSocket,
        }
    }

    /// The session-creation endpoint under the given API base.
    pub fn sessions_url(&self, api_base: &str) -> String {
        format!("{}/realtime/sessions", api_base.trim_end_matches('/'))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "outspeed" => Ok(Provider::Outspeed),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Body posted to a provider's session-creation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRequest {
    pub model: String,
    pub modalities: Vec<String>,
    pub temperature: f32,
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl SessionRequest {
    /// Builds the upstream body for `provider`.
    ///
    /// Only Outspeed accepts instructions at session creation; OpenAI sessions
    /// receive them later over the data channel, so they are dropped here.
    pub fn for_provider(
        provider: Provider,
        model: Option<&str>,
        instructions: Option<&str>,
    ) -> Self {
        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(provider.default_model());
        let instructions = match provider {
            Provider::Outspeed => instructions
                .filter(|i| !i.is_empty())
                .map(str::to_string),
            Provider::OpenAI => None,
        };
        Self {
            model: model.to_string(),
            modalities: vec!["audio".to_string(), "text".to_string()],
            temperature: SESSION_TEMPERATURE,
            voice: provider.default_voice().to_string(),
            instructions,
        }
    }
}
