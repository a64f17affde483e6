//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router: internal routes first, proxy fallback last
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind the server to a listener and serve until shutdown
//!
//! # Routing
//! ```text
//! /get_status, /get_env_config, /start_matlab, /stop_matlab,
//! /set_licensing_info, /terminate_integration → internal handlers
//! /                                           → 404
//! everything else                             → forward / websocket bridge
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::routing::{any, delete, get, put};
use axum::Router;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::engine::EngineSupervisor;
use crate::http::request::RequestIdLayer;
use crate::http::{forward, handlers};
use crate::licensing::LicensingState;
use crate::lifecycle::Shutdown;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: EngineSupervisor,
    pub licensing: LicensingState,
    pub client: Client<HttpConnector, Body>,
    pub config: Arc<ProxyConfig>,
    pub shutdown: Shutdown,
}

/// HTTP server fronting the engine.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server over the given components.
    pub fn new(
        config: ProxyConfig,
        supervisor: EngineSupervisor,
        licensing: LicensingState,
        shutdown: Shutdown,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            supervisor,
            licensing,
            client,
            config: Arc::new(config.clone()),
            shutdown,
        };

        let router = Self::build_router(&config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/get_status", get(handlers::get_status))
            .route("/get_env_config", get(handlers::get_env_config))
            .route("/start_matlab", put(handlers::start_engine))
            .route("/stop_matlab", delete(handlers::stop_engine))
            .route(
                "/set_licensing_info",
                put(handlers::set_licensing).delete(handlers::clear_licensing),
            )
            .route(
                "/terminate_integration",
                delete(handlers::terminate_integration),
            )
            .route("/", any(handlers::root_unavailable))
            .fallback(forward::proxy_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener until the
    /// shutdown coordinator fires or ctrl-c arrives.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut signal = shutdown.subscribe();
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = signal.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
                tracing::info!("shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
