//! WebSocket proxy handling.
//!
//! # Data Flow
//! ```text
//! Client ←── WebSocket frames ──→ Proxy ←── WebSocket frames ──→ Engine
//! ```
//!
//! # Design Decisions
//! - Upgrade detection is case-insensitive on header values: a direct client
//!   sends `Connection: Upgrade` / `Upgrade: websocket`, while an upstream
//!   reverse proxy (nginx) rewrites both to lowercase
//! - Frame-level forwarding, no message inspection or buffering
//! - Close or error on either side shuts down the other side and both pumps

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite;

/// Whether this request asks for a WebSocket upgrade.
///
/// Header names are already normalized by the HTTP layer; values are compared
/// case-insensitively so both the canonical and the proxy-rewritten casing
/// are recognized identically.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        })
        .unwrap_or(false);

    let upgrade_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    connection_upgrade && upgrade_websocket
}

/// Complete the client handshake and bridge the session to the engine.
pub async fn bridge_handler(request: Request<Body>, address: String) -> Response {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let backend_url = format!("ws://{address}{path_and_query}");

    let (mut parts, _body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade.on_upgrade(move |client| bridge(client, backend_url)),
        Err(rejection) => {
            tracing::warn!(error = %rejection, "websocket handshake rejected");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Run both pump loops until either side closes or errors.
async fn bridge(client: WebSocket, backend_url: String) {
    let backend = match connect_async(&backend_url).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(url = %backend_url, error = %e, "backend websocket connect failed");
            let mut client = client;
            let _ = client.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::debug!(url = %backend_url, "websocket bridge established");

    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let mut client_to_backend = tokio::spawn(async move {
        while let Some(message) = client_rx.next().await {
            let Ok(message) = message else { break };
            if backend_tx.send(into_backend(message)).await.is_err() {
                break;
            }
        }
        let _ = backend_tx.close().await;
    });

    let mut backend_to_client = tokio::spawn(async move {
        while let Some(message) = backend_rx.next().await {
            let Ok(message) = message else { break };
            let Some(message) = into_client(message) else {
                continue;
            };
            if client_tx.send(message).await.is_err() {
                break;
            }
        }
        let _ = client_tx.close().await;
    });

    // Whichever pump finishes first has already closed its own sink; the
    // other is torn down so its connection drops too.
    tokio::select! {
        _ = &mut client_to_backend => backend_to_client.abort(),
        _ = &mut backend_to_client => client_to_backend.abort(),
    }
    tracing::debug!("websocket bridge closed");
}

fn into_backend(message: Message) -> tungstenite::Message {
    match message {
        Message::Text(text) => tungstenite::Message::Text(text.as_str().into()),
        Message::Binary(data) => tungstenite::Message::Binary(data),
        Message::Ping(data) => tungstenite::Message::Ping(data),
        Message::Pong(data) => tungstenite::Message::Pong(data),
        Message::Close(frame) => {
            tungstenite::Message::Close(frame.map(|f| tungstenite::protocol::CloseFrame {
                code: f.code.into(),
                reason: f.reason.as_str().into(),
            }))
        }
    }
}

fn into_client(message: tungstenite::Message) -> Option<Message> {
    match message {
        tungstenite::Message::Text(text) => Some(Message::Text(text.as_str().into())),
        tungstenite::Message::Binary(data) => Some(Message::Binary(data)),
        tungstenite::Message::Ping(data) => Some(Message::Ping(data)),
        tungstenite::Message::Pong(data) => Some(Message::Pong(data)),
        tungstenite::Message::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        }))),
        // Raw frames never appear on a client connection.
        tungstenite::Message::Frame(_) => None,
    }
}
