//! Buffered and streaming forward-engine cascades.
//!
//! Both paths share the selector, the classifier, and the header-rewriting
//! helpers; the cascade loops stay separate because their commit semantics differ
//! (see module docs on the streaming path below).

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::json;

use crate::circuit_breaker::BreakerRegistry;
use crate::config::ProviderConfig;
use crate::errors::GatewayError;

use super::auth;
use super::classifier::{classify, ErrorLabel, Outcome};
use super::selector::ProviderSelection;

/// Everything the cascade needs, held as cheap-to-clone `Arc`s so a streaming
/// response body (which must outlive the handler that produced it) can carry its
/// own reference to the breaker registry.
#[derive(Clone)]
pub struct ForwardContext {
    pub client: reqwest::Client,
    pub providers: Arc<Vec<ProviderConfig>>,
    pub registry: Arc<BreakerRegistry>,
    pub request_timeout: Duration,
    pub access_token: Arc<str>,
}

/// The inbound request, already stripped down to what the cascade needs.
pub struct InboundRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

struct LastError {
    provider: String,
    label: ErrorLabel,
    message: String,
}

/// The status, filtered headers, and fully-read body of one successful buffered
/// attempt — only ever produced once the body has actually arrived in full.
struct BufferedSuccess {
    status: StatusCode,
    headers: HeaderMap,
    bytes: Bytes,
}

/// http crate major versions differ between axum 0.7 (http 1.x) and reqwest 0.11
/// (http 0.2.x); header names/values are plain byte strings underneath, so we
/// convert at this boundary rather than trying to unify the two `HeaderMap` types.
fn to_reqwest_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let Ok(name) = reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()) else {
            continue;
        };
        let Ok(value) = reqwest::header::HeaderValue::from_bytes(value.as_bytes()) else {
            continue;
        };
        out.append(name, value);
    }
    out
}

fn from_reqwest_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let Ok(name) = axum::http::HeaderName::from_bytes(name.as_str().as_bytes()) else {
            continue;
        };
        let Ok(value) = axum::http::HeaderValue::from_bytes(value.as_bytes()) else {
            continue;
        };
        out.append(name, value);
    }
    out
}

fn target_url(provider: &ProviderConfig, path_and_query: &str) -> String {
    format!("{}{}", provider.base_url, path_and_query)
}

fn build_outbound_headers(ctx: &ForwardContext, inbound: &HeaderMap, provider: &ProviderConfig) -> reqwest::header::HeaderMap {
    let rewritten = auth::rewrite_headers(inbound, &ctx.access_token, &provider.upstream_token);
    let mut headers = to_reqwest_headers(&rewritten);
    if let Some(host) = auth::host_header_for(&provider.base_url) {
        if let Ok(value) = reqwest::header::HeaderValue::from_bytes(host.as_bytes()) {
            headers.insert(reqwest::header::HOST, value);
        }
    }
    headers
}

fn build_outbound_request(
    ctx: &ForwardContext,
    inbound: &InboundRequest,
    provider: &ProviderConfig,
    attempt_number: usize,
) -> reqwest::RequestBuilder {
    let url = target_url(provider, &inbound.path_and_query);
    let headers = build_outbound_headers(ctx, &inbound.headers, provider);

    tracing::info!(
        msg = "request_forward",
        provider = %provider.name,
        target_url = %url,
        attempt = attempt_number
    );

    let method = reqwest::Method::from_bytes(inbound.method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);

    ctx.client.request(method, &url).headers(headers).body(inbound.body.clone())
}

/// Logs the `circuit_breaker` event when a before/after snapshot shows a state
/// transition worth recording (`tripped`, `reset`, or `recovered`).
fn log_breaker_transition(provider: &str, was_open: bool, is_open_now: bool, was_failure: bool, failure_count: u32) {
    if !was_open && is_open_now {
        tracing::warn!(msg = "circuit_breaker", provider, action = "tripped", failure_count);
    } else if was_open && !is_open_now {
        let action = if was_failure { "reset" } else { "recovered" };
        tracing::warn!(msg = "circuit_breaker", provider, action, failure_count);
    }
}

/// Runs one buffered attempt against `provider`. A single deadline
/// (`request_timeout`) spans both the wait for response headers and the full
/// body read: unlike the streaming path, the buffered path has no carve-out for
/// an unbounded body phase, so a provider that answers headers promptly but
/// stalls on the body must still be classified as a failure and failed over,
/// not left to hang. Because the body is read here, before this function
/// returns, a success is only ever reported once the body has actually arrived
/// in full — the breaker never records `record_success` for a response whose
/// body never showed up.
async fn attempt_buffered(
    ctx: &ForwardContext,
    inbound: &InboundRequest,
    provider: &ProviderConfig,
    attempt_number: usize,
) -> (Outcome, Option<BufferedSuccess>, Duration) {
    let request = build_outbound_request(ctx, inbound, provider, attempt_number);

    let started = Instant::now();
    let dispatched = tokio::time::timeout(ctx.request_timeout, async {
        let response = request.send().await?;
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let headers = auth::strip_hop_by_hop(&from_reqwest_headers(response.headers()));
        let bytes = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, headers, bytes))
    })
    .await;
    let elapsed = started.elapsed();

    match dispatched {
        Ok(Ok((status, headers, bytes))) => {
            let outcome = classify(Ok(status), false);
            let success = match outcome {
                Outcome::Success { .. } => Some(BufferedSuccess { status, headers, bytes }),
                Outcome::Failure { .. } => None,
            };
            (outcome, success, elapsed)
        }
        Ok(Err(err)) => (classify(Err(err), false), None, elapsed),
        Err(_elapsed) => {
            let outcome = classify(Ok(StatusCode::OK), true);
            (outcome, None, elapsed)
        }
    }
}

/// Runs one streaming attempt against `provider`: the deadline covers only the
/// connect/header wait, per §4.6 — the body-read phase is handed back to the
/// caller as a raw `reqwest::Response` with no further deadline of its own,
/// since idle reads surface as stream errors on their own.
async fn attempt_streaming(
    ctx: &ForwardContext,
    inbound: &InboundRequest,
    provider: &ProviderConfig,
    attempt_number: usize,
) -> (Outcome, Option<reqwest::Response>, Duration) {
    let request = build_outbound_request(ctx, inbound, provider, attempt_number);

    let started = Instant::now();
    let dispatched = tokio::time::timeout(ctx.request_timeout, request.send()).await;
    let elapsed = started.elapsed();

    match dispatched {
        Ok(Ok(response)) => {
            let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let outcome = classify(Ok(status), false);
            (outcome, Some(response), elapsed)
        }
        Ok(Err(err)) => (classify(Err(err), false), None, elapsed),
        Err(_elapsed) => {
            let outcome = classify(Ok(StatusCode::OK), true);
            (outcome, None, elapsed)
        }
    }
}

fn record_outcome(registry: &BreakerRegistry, provider: &ProviderConfig, outcome: &Outcome, duration: Duration) {
    let breaker = registry.for_provider(&provider.name);
    let was_open = breaker.snapshot(Instant::now()).is_open;

    match outcome {
        Outcome::Success { status } => {
            breaker.record_success();
            let snap_now = breaker.snapshot(Instant::now());
            tracing::info!(
                msg = "request_success",
                provider = %provider.name,
                status = status.as_u16(),
                duration_ms = duration.as_millis() as u64
            );
            log_breaker_transition(&provider.name, was_open, snap_now.is_open, false, snap_now.consecutive_failures);
        }
        Outcome::Failure { label, message } => {
            breaker.record_failure();
            let snap_now = breaker.snapshot(Instant::now());
            tracing::error!(
                msg = "request_failure",
                provider = %provider.name,
                error_type = %label,
                error_msg = %message,
                duration_ms = duration.as_millis() as u64
            );
            log_breaker_transition(&provider.name, was_open, snap_now.is_open, true, snap_now.consecutive_failures);
        }
    }
}

fn exhausted_response(providers_tried: Vec<String>, last_error: LastError) -> Response {
    tracing::error!(
        msg = "all_providers_failed",
        error_type = %last_error.label,
        error_msg = %last_error.message
    );
    let body = json!({
        "error": "all providers exhausted",
        "providers_tried": providers_tried,
        "last_error": {
            "provider": last_error.provider,
            "error_type": last_error.label.to_string(),
            "error_msg": last_error.message,
        }
    });
    (StatusCode::BAD_GATEWAY, axum::Json(body)).into_response()
}

/// Reads the request body fully into memory and attempts providers in priority
/// (plus probe) order, returning the first non-failure response in full.
pub async fn forward_buffered(ctx: &ForwardContext, inbound: InboundRequest) -> Result<Response, GatewayError> {
    let mut selection = ProviderSelection::new(&ctx.providers, &ctx.registry);
    let mut providers_tried = Vec::new();
    let mut last_error: Option<LastError> = None;
    let mut attempt_number = 0;

    while let Some(index) = selection.next() {
        attempt_number += 1;
        let provider = &ctx.providers[index];
        providers_tried.push(provider.name.clone());

        let (outcome, success, duration) = attempt_buffered(ctx, &inbound, provider, attempt_number).await;
        record_outcome(&ctx.registry, provider, &outcome, duration);

        match outcome {
            Outcome::Success { .. } => {
                let success = success.expect("success outcome always carries a fully-read buffered body");
                let mut builder = Response::builder().status(success.status);
                if let Some(map) = builder.headers_mut() {
                    *map = success.headers;
                }
                return builder
                    .body(Body::from(success.bytes))
                    .map_err(|e| GatewayError::Internal(e.to_string()));
            }
            Outcome::Failure { label, message } => {
                last_error = Some(LastError {
                    provider: provider.name.clone(),
                    label,
                    message,
                });
            }
        }
    }

    let last_error = last_error.unwrap_or(LastError {
        provider: String::new(),
        label: ErrorLabel::Unknown,
        message: "no providers configured".to_string(),
    });
    Ok(exhausted_response(providers_tried, last_error))
}

/// Same cascade as the buffered path, but a success commits only the response
/// status and headers up front; the body is then streamed chunk-at-a-time with no
/// further buffering. Once streaming begins, any body error is terminal — there is
/// no way to fail over after the status line has already reached the client. The
/// breaker is still updated for observability when that happens.
pub async fn forward_streaming(ctx: &ForwardContext, inbound: InboundRequest) -> Result<Response, GatewayError> {
    let mut selection = ProviderSelection::new(&ctx.providers, &ctx.registry);
    let mut providers_tried = Vec::new();
    let mut last_error: Option<LastError> = None;
    let mut attempt_number = 0;

    while let Some(index) = selection.next() {
        attempt_number += 1;
        let provider = &ctx.providers[index];
        providers_tried.push(provider.name.clone());

        let (outcome, response, duration) = attempt_streaming(ctx, &inbound, provider, attempt_number).await;
        record_outcome(&ctx.registry, provider, &outcome, duration);

        match outcome {
            Outcome::Success { status } => {
                let response = response.expect("success outcome always carries a response");
                let headers = auth::strip_hop_by_hop(&from_reqwest_headers(response.headers()));
                let provider_name = provider.name.clone();
                let registry = Arc::clone(&ctx.registry);

                let byte_stream = response.bytes_stream().map(move |chunk| {
                    if chunk.is_err() {
                        registry.for_provider(&provider_name).record_failure();
                        tracing::error!(
                            msg = "request_failure",
                            provider = %provider_name,
                            error_type = "connection_error",
                            error_msg = "stream interrupted after response headers were committed"
                        );
                    }
                    chunk
                });

                let mut builder = Response::builder().status(status);
                if let Some(map) = builder.headers_mut() {
                    *map = headers;
                }
                return builder
                    .body(Body::from_stream(byte_stream))
                    .map_err(|e| GatewayError::Internal(e.to_string()));
            }
            Outcome::Failure { label, message } => {
                last_error = Some(LastError {
                    provider: provider.name.clone(),
                    label,
                    message,
                });
            }
        }
    }

    let last_error = last_error.unwrap_or(LastError {
        provider: String::new(),
        label: ErrorLabel::Unknown,
        message: "no providers configured".to_string(),
    });
    Ok(exhausted_response(providers_tried, last_error))
}
