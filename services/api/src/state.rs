//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration
//! and the clients every handler shares.

use crate::{config::Config, upstream::Upstream};
use std::sync::Arc;
use talkbook_core::vision::VisionClient;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Upstream,
    pub vision: Arc<dyn VisionClient>,
}
