//! Token admission and outbound header rewriting.

use axum::http::{HeaderMap, HeaderValue};

/// Hop-by-hop header names stripped before forwarding in either direction.
/// `host` is included since it is always regenerated from the provider's base URL.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Admits a request iff `access_token` is empty, or appears as the literal value of
/// any inbound header. Header *name* is deliberately unconstrained — this is
/// permissive by design (see the design notes on token-match semantics).
pub fn is_authorized(headers: &HeaderMap, access_token: &str) -> bool {
    if access_token.is_empty() {
        return true;
    }
    headers
        .values()
        .any(|v| v.to_str().map(|s| s == access_token).unwrap_or(false))
}

/// Produces the outbound header set: hop-by-hop headers removed, and any header
/// whose value equals the gateway's `access_token` rewritten to the selected
/// provider's `upstream_token`.
pub fn rewrite_headers(inbound: &HeaderMap, access_token: &str, upstream_token: &str) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound.iter() {
        if HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h)) {
            continue;
        }
        let value = if !access_token.is_empty()
            && value.to_str().map(|s| s == access_token).unwrap_or(false)
        {
            match HeaderValue::from_str(upstream_token) {
                Ok(v) => v,
                Err(_) => value.clone(),
            }
        } else {
            value.clone()
        };
        outbound.append(name.clone(), value);
    }
    outbound
}

/// Strips hop-by-hop headers from an upstream response before relaying it to the
/// client. Response headers are never credential-substituted.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h)) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Builds the `host` header value for the outbound request from the provider's
/// configured `base_url`.
pub fn host_header_for(base_url: &str) -> Option<HeaderValue> {
    let url = url::Url::parse(base_url).ok()?;
    let host = url.host_str()?;
    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).ok()
}
