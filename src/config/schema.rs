//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Root configuration for the engine proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend engine process configuration.
    pub engine: EngineConfig,

    /// Hosted license exchange configuration.
    pub licensing: LicensingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// External URL clients use to reach the proxy; served as `loadUrl`
    /// in status payloads.
    pub fn access_url(&self) -> String {
        format!("http://{}/", self.listener.bind_address)
    }

    /// Static environment snapshot served by `/get_env_config`.
    ///
    /// Nothing here changes after startup, so the payload is derived from
    /// config alone.
    pub fn env_snapshot(&self) -> Value {
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "engineCommand": self.engine.command,
            "engineAddress": self.engine.address,
            "readyTimeoutSecs": self.engine.ready_timeout_secs,
            "accessUrl": self.access_url(),
        })
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8888").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8888".to_string(),
        }
    }
}

/// Backend engine process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Executable launched to start the engine.
    pub command: String,

    /// Arguments passed to the engine executable.
    pub args: Vec<String>,

    /// Address the engine serves on once ready (e.g., "127.0.0.1:31515").
    pub address: String,

    /// How long to wait for the engine to become reachable before giving up.
    pub ready_timeout_secs: u64,

    /// Interval between readiness/liveness probes in milliseconds.
    pub poll_interval_ms: u64,

    /// Maximum captured stdout/stderr lines kept for error reports.
    pub log_buffer_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "engine".to_string(),
            args: Vec::new(),
            address: "127.0.0.1:31515".to_string(),
            ready_timeout_secs: 120,
            poll_interval_ms: 250,
            log_buffer_lines: 200,
        }
    }
}

impl EngineConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Hosted license exchange configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LicensingConfig {
    /// Endpoint of the external license service used for token exchange.
    pub exchange_url: String,

    /// Exchange request timeout in seconds.
    pub exchange_timeout_secs: u64,
}

impl Default for LicensingConfig {
    fn default() -> Self {
        Self {
            exchange_url: "https://licensing.example.com/token/exchange".to_string(),
            exchange_timeout_secs: 30,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds (readiness probes).
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
