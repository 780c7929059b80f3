//! Configuration loading and validation.
//!
//! Mirrors the teacher's hand-rolled load-or-fail shape (`std::fs::read_to_string` +
//! a serde deserialize, no `config` crate) but reads YAML instead of TOML, since the
//! gateway's wire format for `config.yaml` is fixed by its external interface.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::ConfigError;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RESET_TIMEOUT_SECS: u64 = 600;
const DEFAULT_PROBE_PROBABILITY: f64 = 0.05;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Raw on-disk shape of `config.yaml`, deserialized before validation.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    gateway: RawGateway,
    providers: Vec<RawProvider>,
    #[serde(default)]
    web: RawWeb,
}

#[derive(Debug, Deserialize)]
struct RawGateway {
    #[serde(default)]
    access_token: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default)]
    circuit_breaker: RawCircuitBreaker,
}

#[derive(Debug, Deserialize)]
struct RawCircuitBreaker {
    #[serde(default = "default_failure_threshold")]
    failure_threshold: u32,
    #[serde(default = "default_reset_timeout")]
    reset_timeout: u64,
    #[serde(default = "default_probe_probability")]
    probe_probability: f64,
}

impl Default for RawCircuitBreaker {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout: default_reset_timeout(),
            probe_probability: default_probe_probability(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    name: String,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawWeb {
    host: Option<String>,
    port: Option<u16>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_reset_timeout() -> u64 {
    DEFAULT_RESET_TIMEOUT_SECS
}

fn default_probe_probability() -> f64 {
    DEFAULT_PROBE_PROBABILITY
}

impl Default for RawGateway {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            timeout: default_timeout(),
            circuit_breaker: RawCircuitBreaker::default(),
        }
    }
}

/// A single upstream provider, immutable after load.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub upstream_token: String,
}

/// Circuit breaker policy shared by every provider's breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub probe_probability: f64,
}

/// Bind address for the HTTP server, defaulted separately from the gateway policy
/// since it is consumed only by `main`/`WebServer`, never by the forwarding engine.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

/// Fully validated, immutable gateway configuration.
///
/// Constructed once at startup and handed to every component that needs it
/// (wrapped in an `Arc` by the caller) rather than accessed through a lazy
/// process-wide singleton.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub access_token: String,
    pub request_timeout: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
    pub providers: Vec<ProviderConfig>,
    pub web: WebConfig,
}

impl GatewayConfig {
    /// Load and validate configuration from the given path.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::MissingFile {
                path: path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let raw: RawConfig = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;

        Self::from_raw(raw)
    }

    /// Load from the conventional locations: an explicit CLI path, falling back to
    /// `CONFIG_PATH`, falling back to `./config.yaml`.
    pub fn load(cli_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = cli_path
            .map(str::to_string)
            .or_else(|| std::env::var("CONFIG_PATH").ok())
            .unwrap_or_else(|| "./config.yaml".to_string());
        Self::load_from_path(path)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.providers.is_empty() {
            return Err(ConfigError::Validation {
                message: "providers must not be empty".to_string(),
            });
        }

        let mut seen_names = std::collections::HashSet::with_capacity(raw.providers.len());
        let mut providers = Vec::with_capacity(raw.providers.len());
        for p in raw.providers {
            if p.name.is_empty() {
                return Err(ConfigError::Validation {
                    message: "provider name must not be empty".to_string(),
                });
            }
            if !seen_names.insert(p.name.clone()) {
                return Err(ConfigError::Validation {
                    message: format!("duplicate provider name: {}", p.name),
                });
            }
            providers.push(ProviderConfig {
                name: p.name,
                base_url: p.base_url.trim_end_matches('/').to_string(),
                upstream_token: p.token,
            });
        }

        let cb = raw.gateway.circuit_breaker;
        if cb.failure_threshold < 1 {
            return Err(ConfigError::Validation {
                message: "failure_threshold must be >= 1".to_string(),
            });
        }
        if cb.reset_timeout == 0 {
            return Err(ConfigError::Validation {
                message: "reset_timeout must be > 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&cb.probe_probability) {
            return Err(ConfigError::Validation {
                message: "probe_probability must be in [0, 1]".to_string(),
            });
        }

        Ok(GatewayConfig {
            access_token: raw.gateway.access_token,
            request_timeout: Duration::from_secs(raw.gateway.timeout),
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: cb.failure_threshold,
                reset_timeout: Duration::from_secs(cb.reset_timeout),
                probe_probability: cb.probe_probability,
            },
            providers,
            web: WebConfig {
                host: raw.web.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.web.port.unwrap_or(DEFAULT_PORT),
            },
        })
    }
}
