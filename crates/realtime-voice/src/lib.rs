//! Realtime voice sessions with a model about the page being read.
//!
//! A [`VoiceSession`] mints an ephemeral key through the backend, opens a
//! peer connection, negotiates it with the provider's signaling and keeps the
//! model informed of the reader's current page.

pub mod events;
pub mod mint;
pub mod peer;
#[cfg(feature = "webrtc")]
pub mod rtc;
pub mod session;
pub mod signaling;

#[cfg(test)]
mod testing;

pub use events::{VoiceEvent, VoiceStatus};
pub use mint::{EphemeralKey, KeySource, MintRequest, SessionMinter};
pub use peer::{IceCandidate, PeerConnection, PeerEvent, PeerFactory};
#[cfg(feature = "webrtc")]
pub use rtc::{MicrophoneTrack, RemoteAudioSink, WebRtcPeerFactory};
pub use session::{VoiceConfig, VoiceSession};
pub use signaling::Signaling;
