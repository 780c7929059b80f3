use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use provider_gateway::config::GatewayConfig;
use provider_gateway::web::{AppState, WebServer};

#[derive(Parser)]
#[command(name = "provider-gateway")]
#[command(version = "0.1.0")]
#[command(about = "A transparent reverse proxy that fails over across a priority-ordered list of upstream API providers")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (overrides CONFIG_PATH and the default ./config.yaml)
    #[arg(short, long)]
    config: Option<String>,

    /// Listening IP address (overrides config.yaml)
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port (overrides config.yaml)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = if cli.log_level == "trace" {
        format!("provider_gateway={},tower_http=trace", cli.log_level)
    } else {
        format!("provider_gateway={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting provider-gateway v{}", env!("CARGO_PKG_VERSION"));

    let mut config = GatewayConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    info!(providers = config.providers.len(), "configuration loaded");

    let state = AppState::new(Arc::new(config));
    let web_server = WebServer::new(state)?;

    info!("starting web server on {}:{}", web_server.host(), web_server.port());
    web_server.serve().await?;

    Ok(())
}
