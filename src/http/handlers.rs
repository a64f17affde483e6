//! Internal route handlers.
//!
//! These are the only handlers that read or mutate licensing and engine
//! state, always through their owning components. Success is 200 with a
//! structured JSON body; validation failures are 400 with the error
//! envelope; anything unexpected is 500.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::http::server::AppState;
use crate::status::compose_status;

async fn status_payload(state: &AppState) -> Value {
    let engine = state.supervisor.snapshot().await;
    let licensing = state.licensing.current().await;
    compose_status(&engine, &licensing, &state.config.access_url())
}

/// GET /get_status
pub async fn get_status(State(state): State<AppState>) -> Json<Value> {
    Json(status_payload(&state).await)
}

/// GET /get_env_config
pub async fn get_env_config(State(state): State<AppState>) -> Json<Value> {
    Json(state.config.env_snapshot())
}

/// PUT /start_matlab
///
/// Restart semantics: a running engine is stopped first. Fire-and-forget —
/// lifecycle failures show up in subsequent status queries, not here.
pub async fn start_engine(State(state): State<AppState>) -> Json<Value> {
    let licensing = state.licensing.current().await;
    state.supervisor.restart(&licensing).await;
    Json(status_payload(&state).await)
}

/// DELETE /stop_matlab
pub async fn stop_engine(State(state): State<AppState>) -> Json<Value> {
    state.supervisor.stop().await;
    Json(status_payload(&state).await)
}

/// PUT /set_licensing_info
pub async fn set_licensing(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    match state.licensing.apply(&body).await {
        Ok(()) => Json(status_payload(&state).await).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, "licensing request rejected");
            error.into_response()
        }
    }
}

/// DELETE /set_licensing_info
///
/// Clearing licensing does not stop a running engine; callers that want both
/// also issue a stop.
pub async fn clear_licensing(State(state): State<AppState>) -> Json<Value> {
    state.licensing.clear().await;
    Json(status_payload(&state).await)
}

/// DELETE /terminate_integration
///
/// Shuts down the whole proxy session: engine stopped, licensing cleared,
/// server drained. Idempotent; concurrent callers all observe the same
/// terminal response.
pub async fn terminate_integration(State(state): State<AppState>) -> Json<Value> {
    state.supervisor.stop().await;
    state.licensing.clear().await;
    state.shutdown.trigger();
    tracing::info!("integration terminated");
    Json(json!({ "loadUrl": "../" }))
}

/// The root path carries no internal resource and is never proxied.
pub async fn root_unavailable() -> StatusCode {
    StatusCode::NOT_FOUND
}
