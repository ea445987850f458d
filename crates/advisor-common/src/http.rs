/// Small helpers shared by the HTTP clients in this crate.
use serde::Deserialize;
use tracing::warn;

/// JSON error envelope used by both upstream services:
/// `{"error": {"message": "...", "code": ...}}`.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: Option<String>,
    pub code: Option<serde_json::Value>,
}

/// Read a response body as text, truncated to `max_bytes`.
///
/// Error bodies from upstream services are surfaced in error messages, so the
/// amount we keep is bounded.
pub async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

/// Extract the upstream error message from a body if it carries the standard
/// envelope. Returns `None` when the body is not a recognizable envelope.
pub fn envelope_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok()?;
    parsed.error.message
}
