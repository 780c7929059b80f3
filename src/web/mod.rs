//! Web layer: the `axum` HTTP surface wiring the admin endpoints and the catch-all
//! proxy route.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::{any, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::circuit_breaker::BreakerRegistry;
use crate::config::GatewayConfig;
use crate::proxy::forward::ForwardContext;

/// Shared state handed to every handler. Cheap to clone — everything inside is
/// either `Copy`, an `Arc`, or (for `reqwest::Client`) internally reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<BreakerRegistry>,
    pub forward_ctx: ForwardContext,
}

impl AppState {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        let registry = Arc::new(BreakerRegistry::new(&config.providers, config.circuit_breaker));
        let client = reqwest::Client::builder()
            .build()
            .expect("failed to build the shared reqwest client");

        let forward_ctx = ForwardContext {
            client,
            providers: Arc::new(config.providers.clone()),
            registry: Arc::clone(&registry),
            request_timeout: config.request_timeout,
            access_token: Arc::from(config.access_token.as_str()),
        };

        Self {
            config,
            registry,
            forward_ctx,
        }
    }
}

/// Wraps the configured `Router` and bind address.
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

/// Builds the router: the two admin endpoints plus the catch-all proxy route.
/// Pulled out as a free function so tests can drive it with `tower::ServiceExt`
/// without binding a real socket via `WebServer`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/_health", get(handlers::health))
        .route("/_reset_circuit", post(handlers::reset_circuit))
        .route("/*path", any(handlers::proxy))
        .route("/", any(handlers::proxy))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;
        let app = build_router(state);
        Ok(Self { app, addr })
    }

    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        tracing::info!(addr = %self.addr, "listening");
        axum::serve(listener, self.app).await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}
