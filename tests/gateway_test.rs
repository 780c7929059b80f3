use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use provider_gateway::config::{CircuitBreakerConfig, GatewayConfig, ProviderConfig, WebConfig};
use provider_gateway::web::AppState;

fn test_config(providers: Vec<ProviderConfig>) -> GatewayConfig {
    GatewayConfig {
        access_token: String::new(),
        request_timeout: Duration::from_secs(5),
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(600),
            probe_probability: 0.0,
        },
        providers,
        web: WebConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
    }
}

fn router_for(config: GatewayConfig) -> (Router, AppState) {
    let state = AppState::new(Arc::new(config));
    let app = provider_gateway::web::build_router(state.clone());
    (app, state)
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap_or(json!({}))
    };
    (status, json)
}

async fn send_with_header(app: &Router, uri: &str, header: (&str, &str)) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header.0, header.1)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap_or(json!({}))
    };
    (status, json)
}

#[tokio::test]
async fn single_healthy_provider_succeeds() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&upstream)
        .await;

    let config = test_config(vec![ProviderConfig {
        name: "a".into(),
        base_url: upstream.uri(),
        upstream_token: "tok-a".into(),
    }]);
    let (app, state) = router_for(config);

    let (status, _) = send(&app, Method::GET, "/v1/models").await;
    assert_eq!(status, StatusCode::OK);

    let snap = state.registry.for_provider("a").snapshot(std::time::Instant::now());
    assert_eq!(snap.consecutive_failures, 0);
}

#[tokio::test]
async fn primary_down_backup_healthy_failover() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&backup)
        .await;

    let config = test_config(vec![
        ProviderConfig {
            name: "primary".into(),
            base_url: primary.uri(),
            upstream_token: "tok-a".into(),
        },
        ProviderConfig {
            name: "backup".into(),
            base_url: backup.uri(),
            upstream_token: "tok-b".into(),
        },
    ]);
    let (app, state) = router_for(config);

    for _ in 0..2 {
        let (status, _) = send(&app, Method::GET, "/v1/models").await;
        assert_eq!(status, StatusCode::OK);
    }

    let now = std::time::Instant::now();
    assert!(state.registry.is_open("primary", now));
    assert!(!state.registry.is_open("backup", now));
}

#[tokio::test]
async fn all_providers_fail_returns_502_with_provider_list() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;

    Mock::given(method("GET")).and(path("/x")).respond_with(ResponseTemplate::new(500)).mount(&a).await;
    Mock::given(method("GET")).and(path("/x")).respond_with(ResponseTemplate::new(500)).mount(&b).await;

    let config = test_config(vec![
        ProviderConfig { name: "a".into(), base_url: a.uri(), upstream_token: "x".into() },
        ProviderConfig { name: "b".into(), base_url: b.uri(), upstream_token: "y".into() },
    ]);
    let (app, state) = router_for(config);

    let (status, body) = send(&app, Method::GET, "/x").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["providers_tried"], json!(["a", "b"]));
    assert_eq!(body["last_error"]["error_type"], "http_error");

    let now = std::time::Instant::now();
    assert!(!state.registry.is_open("b", now));
}

#[tokio::test]
async fn auth_gate_rejects_without_matching_header() {
    let upstream = MockServer::start().await;
    let config = {
        let mut c = test_config(vec![ProviderConfig {
            name: "a".into(),
            base_url: upstream.uri(),
            upstream_token: "tok-a".into(),
        }]);
        c.access_token = "secret".to_string();
        c
    };
    let (app, _state) = router_for(config);

    let (status, body) = send(&app, Method::GET, "/v1/models").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn auth_gate_admits_when_token_matches_any_header_value() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let config = {
        let mut c = test_config(vec![ProviderConfig {
            name: "a".into(),
            base_url: upstream.uri(),
            upstream_token: "tok-a".into(),
        }]);
        c.access_token = "secret".to_string();
        c
    };
    let (app, _state) = router_for(config);

    let (status, _) = send_with_header(&app, "/v1/models", ("x-whatever", "secret")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_endpoint_reflects_live_breaker_state() {
    let a = MockServer::start().await;
    Mock::given(method("GET")).and(path("/fail")).respond_with(ResponseTemplate::new(500)).mount(&a).await;

    let config = test_config(vec![ProviderConfig {
        name: "only".into(),
        base_url: a.uri(),
        upstream_token: "tok".into(),
    }]);
    let (app, _state) = router_for(config);

    for _ in 0..2 {
        send(&app, Method::GET, "/fail").await;
    }

    let (status, body) = send(&app, Method::GET, "/_health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    // single-provider config: "only" is always the last/fallback provider, so
    // /_health still reports it closed even though its counter has tripped.
    assert_eq!(body["circuit_breakers"]["only"]["is_open"], false);
    assert_eq!(body["circuit_breakers"]["only"]["failure_count"], 2);
}

#[tokio::test]
async fn reset_circuit_is_idempotent_and_clears_tripped_breaker() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    Mock::given(method("GET")).and(path("/fail")).respond_with(ResponseTemplate::new(500)).mount(&a).await;
    Mock::given(method("GET")).and(path("/fail")).respond_with(ResponseTemplate::new(500)).mount(&b).await;

    let config = test_config(vec![
        ProviderConfig { name: "a".into(), base_url: a.uri(), upstream_token: "x".into() },
        ProviderConfig { name: "b".into(), base_url: b.uri(), upstream_token: "y".into() },
    ]);
    let (app, state) = router_for(config);

    send(&app, Method::GET, "/fail").await;
    send(&app, Method::GET, "/fail").await;
    assert!(state.registry.is_open("a", std::time::Instant::now()));

    let (status, _) = send(&app, Method::POST, "/_reset_circuit").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!state.registry.is_open("a", std::time::Instant::now()));

    let (status2, _) = send(&app, Method::POST, "/_reset_circuit").await;
    assert_eq!(status2, StatusCode::OK);
}
