//! Runtime configuration.
//!
//! All settings come from `SKYFLO_`-prefixed environment variables.

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::time::Duration;

const CLUSTER_NAME: &str = "SKYFLO_KUBERNETES_CLUSTER_NAME";
const POLL_INTERVAL: &str = "SKYFLO_KUBERNETES_POLL_INTERVAL";
const CACHE_SYNC_TIMEOUT: &str = "SKYFLO_KUBERNETES_CACHE_SYNC_TIMEOUT";
const API_SERVER: &str = "SKYFLO_API_SERVER";
const API_KEY: &str = "SKYFLO_API_KEY";
const SERVER_HOST: &str = "SKYFLO_SERVER_HOST";
const SERVER_PORT: &str = "SKYFLO_SERVER_PORT";
const SERVER_TIMEOUT: &str = "SKYFLO_SERVER_TIMEOUT";

/// Probe listener and HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Timeout of each delivery to the collector
    pub timeout: Duration,
}

/// Cluster-side settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesConfig {
    pub cluster_name: String,
    /// Carried for compatibility; the watcher is push-driven and never polls
    pub poll_interval: Duration,
    pub cache_sync_timeout: Duration,
}

/// Collector endpoint settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub server: String,
    pub key: String,
}

// Keep the key out of logs
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("server", &self.server)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Complete watcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub kubernetes: KubernetesConfig,
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::Missing(key.to_string()));
        let duration = |key: &str, default: Duration| match get(key) {
            Some(raw) => parse_duration(&raw).ok_or_else(|| ConfigError::Invalid {
                key: key.to_string(),
                expected: "duration",
                value: raw,
            }),
            None => Ok(default),
        };

        let port = match get(SERVER_PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: SERVER_PORT.to_string(),
                expected: "port",
                value: raw,
            })?,
            None => 8080,
        };

        Ok(Self {
            server: ServerConfig {
                host: get(SERVER_HOST).unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                timeout: duration(SERVER_TIMEOUT, Duration::from_secs(30))?,
            },
            kubernetes: KubernetesConfig {
                cluster_name: required(CLUSTER_NAME)?,
                poll_interval: duration(POLL_INTERVAL, Duration::from_secs(30))?,
                cache_sync_timeout: duration(CACHE_SYNC_TIMEOUT, Duration::from_secs(300))?,
            },
            api: ApiConfig {
                server: required(API_SERVER)?,
                key: required(API_KEY)?,
            },
        })
    }

    /// Address the probe server listens on.
    pub fn probe_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = if self.server.host.contains(':') {
            // IPv6 literal
            format!("[{}]:{}", self.server.host, self.server.port)
        } else {
            format!("{}:{}", self.server.host, self.server.port)
        };
        raw.parse().map_err(|_| ConfigError::Invalid {
            key: SERVER_HOST.to_string(),
            expected: "listen address",
            value: raw,
        })
    }
}

/// Parse `250ms`, `30s`, `5m`, `1h` or a bare number of seconds.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(value.checked_mul(3600)?)),
        _ => None,
    }
}
