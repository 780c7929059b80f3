//! The forwarding engine: provider selection, auth, classification, and the
//! buffered/streaming cascades.

pub mod auth;
pub mod classifier;
pub mod forward;
pub mod selector;

use axum::body::Bytes;

/// Detects whether the inbound body opts into the streaming path: it is parsed as
/// JSON only when `content-type` is `application/json`, and a top-level
/// `stream: true` field enables streaming. Any parse failure or absence of the
/// field defaults to buffered — this is a deliberate, permissive heuristic
/// preserved as specified rather than tightened.
pub fn wants_streaming(content_type: Option<&str>, body: &Bytes) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    if !content_type.starts_with("application/json") {
        return false;
    }
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };
    value.get("stream").and_then(serde_json::Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_buffered_for_non_json_content_type() {
        assert!(!wants_streaming(Some("text/plain"), &Bytes::from_static(b"{\"stream\":true}")));
    }

    #[test]
    fn defaults_to_buffered_when_content_type_missing() {
        assert!(!wants_streaming(None, &Bytes::from_static(b"{\"stream\":true}")));
    }

    #[test]
    fn defaults_to_buffered_on_parse_failure() {
        assert!(!wants_streaming(Some("application/json"), &Bytes::from_static(b"not json")));
    }

    #[test]
    fn streams_when_json_body_declares_it() {
        assert!(wants_streaming(Some("application/json"), &Bytes::from_static(b"{\"stream\":true}")));
    }

    #[test]
    fn buffers_when_json_body_omits_stream_field() {
        assert!(!wants_streaming(Some("application/json"), &Bytes::from_static(b"{\"model\":\"x\"}")));
    }
}
