//! Talk To Book core library.
//!
//! Provider catalogue, reader state, page context for the voice model, and
//! the document transcription pipeline shared by the backend service and the
//! realtime voice client.

pub mod client;
pub mod context;
pub mod extract;
pub mod provider;
pub mod reader;
pub mod sdp;
pub mod transcription;
pub mod vision;

pub use context::{PageContext, SessionUpdate};
pub use provider::{ConnectionType, Provider};
