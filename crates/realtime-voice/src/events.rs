//! Events surfaced to the embedding application.

use serde_json::Value;
use std::fmt;

/// Lifecycle of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for VoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoiceStatus::Idle => "idle",
            VoiceStatus::Connecting => "connecting",
            VoiceStatus::Connected => "connected",
            VoiceStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// The session moved to a new status.
    Status(VoiceStatus),
    /// A fragment of the transcription of the user's speech.
    Transcript(String),
    /// A fragment of the model's text response.
    Response(String),
    /// The model's audio track has been attached.
    RemoteAudio,
    /// A failure reported by the provider or the connection.
    Error(String),
}

/// Interprets a provider event received on the data channel.
///
/// Only the events the reader shows are mapped; everything else is `None`.
pub fn parse_server_event(text: &str) -> Option<VoiceEvent> {
    let event: Value = serde_json::from_str(text).ok()?;
    match event.get("type")?.as_str()? {
        "conversation.item.input_audio_transcription.delta" => event
            .get("delta")
            .and_then(Value::as_str)
            .map(|d| VoiceEvent::Transcript(d.to_string())),
        "response.text.delta" => {
            let delta = event.get("delta")?;
            delta
                .as_str()
                .or_else(|| delta.get("content").and_then(Value::as_str))
                .map(|d| VoiceEvent::Response(d.to_string()))
        }
        "error" => {
            let message = event
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown provider error");
            Some(VoiceEvent::Error(message.to_string()))
        }
        _ => None,
    }
}
