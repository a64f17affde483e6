//! Shared utilities for integration testing.
//!
//! Spins up real listeners on ephemeral ports: an echo backend standing in
//! for the engine, a fake license exchange service, and the proxy itself.
//! The "engine process" is a plain `sleep`, so the supervisor exercises the
//! production spawner while readiness probes hit the echo backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{json, Value};

use engine_proxy::config::{EngineConfig, ProxyConfig};
use engine_proxy::engine::{EngineSupervisor, ProcessSpawner};
use engine_proxy::http::HttpServer;
use engine_proxy::licensing::{HostedExchangeClient, LicensingState};
use engine_proxy::lifecycle::Shutdown;

/// Backend that echoes HTTP bodies back verbatim and echoes WebSocket
/// messages frame for frame.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(request: Request<Body>) -> Response {
        if engine_proxy::http::websocket::is_upgrade_request(request.headers()) {
            let (mut parts, _body) = request.into_parts();
            return match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                Ok(upgrade) => upgrade.on_upgrade(echo_ws).into_response(),
                Err(rejection) => rejection.into_response(),
            };
        }
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        body.into_response()
    }

    async fn echo_ws(mut socket: WebSocket) {
        while let Some(Ok(message)) = socket.recv().await {
            match message {
                Message::Close(_) => break,
                Message::Text(_) | Message::Binary(_) => {
                    if socket.send(message).await.is_err() {
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    let app = Router::new().fallback(echo);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Fake hosted-license exchange returning a fixed entitlement set.
#[allow(dead_code)]
pub async fn start_exchange_service(entitlements: Value) -> SocketAddr {
    let app = Router::new().fallback(move || {
        let entitlements = entitlements.clone();
        async move { axum::Json(json!({ "entitlements": entitlements })) }
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Engine config whose "process" is a plain sleep and whose readiness probe
/// targets the given backend.
#[allow(dead_code)]
pub fn sleepy_engine(backend: SocketAddr) -> EngineConfig {
    EngineConfig {
        command: "sleep".into(),
        args: vec!["30".into()],
        address: backend.to_string(),
        ready_timeout_secs: 10,
        poll_interval_ms: 50,
        log_buffer_lines: 50,
    }
}

/// Handles to a running proxy instance.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub supervisor: EngineSupervisor,
    pub licensing: LicensingState,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the proxy on an ephemeral port with the given config.
pub async fn start_proxy(mut config: ProxyConfig) -> TestProxy {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();

    let spawner = Arc::new(ProcessSpawner::new(config.engine.log_buffer_lines));
    let supervisor = EngineSupervisor::new(
        config.engine.clone(),
        Duration::from_secs(config.timeouts.connect_secs),
        spawner,
    );
    let exchange = Arc::new(
        HostedExchangeClient::new(
            config.licensing.exchange_url.clone(),
            Duration::from_secs(config.licensing.exchange_timeout_secs),
        )
        .unwrap(),
    );
    let licensing = LicensingState::new(exchange);
    let shutdown = Shutdown::new();

    let server = HttpServer::new(
        config,
        supervisor.clone(),
        licensing.clone(),
        shutdown.clone(),
    );
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy {
        addr,
        supervisor,
        licensing,
        shutdown,
    }
}

/// Poll `/get_status` until the engine reports the wanted status.
#[allow(dead_code)]
pub async fn wait_for_engine(client: &reqwest::Client, proxy: &TestProxy, status: &str) -> Value {
    for _ in 0..200 {
        let body: Value = client
            .get(proxy.url("/get_status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["engine"]["status"] == status {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("engine never reached status '{status}'");
}
