//! SDP offer validation shared by the backend proxy and the voice client.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SdpError {
    #[error("SDP offer is required")]
    Empty,
    #[error("SDP offer is malformed: {0}")]
    Malformed(&'static str),
}

/// Checks that `sdp` looks like a session description before it is sent upstream.
///
/// This is a shape check, not a parser: a version line first and at least one
/// media section.
pub fn validate_offer(sdp: &str) -> Result<(), SdpError> {
    let sdp = sdp.trim();
    if sdp.is_empty() {
        return Err(SdpError::Empty);
    }
    let mut lines = sdp.lines().map(str::trim);
    if lines.next() != Some("v=0") {
        return Err(SdpError::Malformed("first line must be v=0"));
    }
    if !lines.any(|l| l.starts_with("m=")) {
        return Err(SdpError::Malformed("no media section"));
    }
    Ok(())
}
