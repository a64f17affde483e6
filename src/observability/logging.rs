//! Structured logging.
//!
//! Uses the tracing crate; the filter comes from `RUST_LOG` when set and
//! falls back to the configured level otherwise.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init(default_level: &str) {
    let fallback = format!("engine_proxy={default_level},tower_http=info");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&fallback)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
