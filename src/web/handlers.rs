//! HTTP handlers: the two admin endpoints and the catch-all proxy route.

use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use axum::Json;
use serde_json::json;

use crate::errors::GatewayError;
use crate::proxy::auth;
use crate::proxy::forward::{forward_buffered, forward_streaming, InboundRequest};
use crate::proxy::wants_streaming;

use super::AppState;

fn short_hex_id() -> String {
    format!("{:08x}", fastrand::u32(..))
}

fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// `GET /_health` — live view of every provider's breaker state.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let now = Instant::now();
    let names: Vec<&str> = state.config.providers.iter().map(|p| p.name.as_str()).collect();
    let snapshots = state.registry.snapshot_all(now);

    let breakers: serde_json::Map<String, serde_json::Value> = state
        .config
        .providers
        .iter()
        .map(|p| {
            let snap = snapshots.get(&p.name).copied();
            // Reported `is_open` goes through the registry's fallback invariant
            // (the last-priority provider never reports open), not the breaker's
            // raw internal state, to match what the selector actually does.
            let is_open = state.registry.is_open(&p.name, now);
            let value = match snap {
                Some(snap) => json!({
                    "is_open": is_open,
                    "failure_count": snap.consecutive_failures,
                    "remaining_time": snap.remaining_time_until_auto_reset.map(|d| d.as_secs_f64()),
                }),
                None => json!({ "is_open": false, "failure_count": 0, "remaining_time": null }),
            };
            (p.name.clone(), value)
        })
        .collect();

    Json(json!({
        "status": "ok",
        "providers": names,
        "circuit_breakers": breakers,
    }))
}

/// `POST /_reset_circuit` — resets every provider's breaker. Idempotent.
pub async fn reset_circuit(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.registry.reset_all();
    Json(json!({ "status": "ok" }))
}

/// `ANY /{path...}` — the proxied catch-all.
#[tracing::instrument(skip_all, fields(req_id = tracing::field::Empty, method = %method, path = %uri.path()))]
pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, GatewayError> {
    let req_id = short_hex_id();
    tracing::Span::current().record("req_id", tracing::field::display(&req_id));

    if !auth::is_authorized(&headers, &state.forward_ctx.access_token) {
        tracing::warn!(msg = "auth_failed", reason = "missing or mismatched token");
        return Err(GatewayError::Unauthorized);
    }

    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let stream = wants_streaming(content_type, &body);

    let model = content_type
        .filter(|ct| ct.starts_with("application/json"))
        .and_then(|_| serde_json::from_slice::<serde_json::Value>(&body).ok())
        .and_then(|v| v.get("model").and_then(|m| m.as_str().map(str::to_string)));

    tracing::info!(
        msg = "request_start",
        method = %method,
        path = %uri.path(),
        query = uri.query().unwrap_or(""),
        model = model.as_deref().unwrap_or(""),
        stream
    );

    let inbound = InboundRequest {
        method,
        path_and_query: path_and_query(&uri),
        headers,
        body,
    };

    if stream {
        forward_streaming(&state.forward_ctx, inbound).await
    } else {
        forward_buffered(&state.forward_ctx, inbound).await
    }
}

