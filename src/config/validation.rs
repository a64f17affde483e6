//! Configuration validation.
//!
//! Semantic checks that serde cannot express: addresses must parse, the
//! engine command must be non-empty, timeouts must be positive. All errors
//! are collected and returned together, not just the first.

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: field.to_string(),
            message: format!("'{value}' is not a valid host:port address"),
        });
    }
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_addr(&mut errors, "engine.address", &config.engine.address);

    if config.engine.command.trim().is_empty() {
        errors.push(ValidationError {
            field: "engine.command".into(),
            message: "engine command must not be empty".into(),
        });
    }
    if config.engine.ready_timeout_secs == 0 {
        errors.push(ValidationError {
            field: "engine.ready_timeout_secs".into(),
            message: "readiness timeout must be positive".into(),
        });
    }
    if config.engine.poll_interval_ms == 0 {
        errors.push(ValidationError {
            field: "engine.poll_interval_ms".into(),
            message: "poll interval must be positive".into(),
        });
    }
    match Url::parse(&config.licensing.exchange_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError {
            field: "licensing.exchange_url".into(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError {
            field: "licensing.exchange_url".into(),
            message: e.to_string(),
        }),
    }
    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
