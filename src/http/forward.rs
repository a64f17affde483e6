//! Plain HTTP forwarding to the engine.
//!
//! # Responsibilities
//! - Fast-fail with 404 while the engine is not reachable
//! - Hand WebSocket upgrades to the bridging path
//! - Reissue everything else against the engine address verbatim
//!
//! There is deliberately no retry here: the fast-fail is the retry boundary,
//! pushed to the caller, who is expected to poll with backoff.

use std::str::FromStr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderName, HeaderValue, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hyper::body::Incoming;

use crate::engine::EngineStatus;
use crate::error::ProxyError;
use crate::http::request::X_REQUEST_ID;
use crate::http::server::AppState;
use crate::http::websocket;
use crate::observability::metrics;

/// Fallback handler: every request that matched no internal route lands here
/// and is treated as traffic for the engine.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let snapshot = state.supervisor.snapshot().await;
    let address = match (snapshot.status, snapshot.address) {
        (EngineStatus::Up, Some(address)) => address,
        _ => {
            tracing::debug!(request_id = %request_id, path = %path, "engine not up, fast-failing");
            metrics::record_request(&method, 404, start_time);
            return (StatusCode::NOT_FOUND, "Engine is not running").into_response();
        }
    };

    if websocket::is_upgrade_request(request.headers()) {
        return websocket::bridge_handler(request, address).await;
    }

    let (parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = match Authority::from_str(&address) {
        Ok(authority) => Some(authority),
        Err(e) => {
            tracing::error!(address = %address, error = %e, "engine address is not a valid authority");
            return ProxyError::InternalError("invalid engine address".into()).into_response();
        }
    };
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(error = %e, "failed to build backend URI");
            return ProxyError::InternalError("failed to build backend URI".into()).into_response();
        }
    };

    let mut builder = Request::builder().method(parts.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            if is_hop_by_hop(name) {
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }
        // Host identifies us, not the engine; rewrite it.
        if let Ok(host) = HeaderValue::from_str(&address) {
            headers.insert(header::HOST, host);
        }
    }
    let backend_request = match builder.body(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "failed to build backend request");
            return ProxyError::InternalError("failed to build backend request".into())
                .into_response();
        }
    };

    match state.client.request(backend_request).await {
        Ok(response) => {
            let status = response.status().as_u16();
            tracing::debug!(request_id = %request_id, path = %path, status, "forwarded to engine");
            metrics::record_request(&method, status, start_time);
            streamed(response)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, path = %path, error = %e, "forward to engine failed");
            let message = format!("request to engine failed: {e}");
            state.supervisor.note_unreachable(&message).await;
            metrics::record_request(&method, 502, start_time);
            (
                StatusCode::BAD_GATEWAY,
                Json(ProxyError::EngineUnreachable(message).into_record(None)),
            )
                .into_response()
        }
    }
}

/// Hop-by-hop headers (RFC 9110 §7.6.1) describe the client-proxy connection
/// and must not be reissued to the engine.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == header::CONNECTION
        || *name == header::TE
        || *name == header::TRAILER
        || *name == header::TRANSFER_ENCODING
        || *name == header::UPGRADE
        || *name == header::PROXY_AUTHENTICATE
        || *name == header::PROXY_AUTHORIZATION
        || name.as_str() == "keep-alive"
        || name.as_str() == "proxy-connection"
}

/// Stream the engine's response back without buffering the body.
fn streamed(response: hyper::Response<Incoming>) -> Response {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}
