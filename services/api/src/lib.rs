//! Talk To Book API Library Crate
//!
//! The backend proxy for the reader: realtime session minting, SDP exchange,
//! page transcription and web scraping. The `api` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod scrape;
pub mod state;
pub mod upstream;
