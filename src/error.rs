//! Error types and the wire error envelope.
//!
//! Every failure that can reach a client is a [`ProxyError`]; it marshals
//! into an [`ErrorRecord`] envelope of `{message, logs, type}` so clients
//! can branch on the `type` tag without parsing message text.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by the proxy, either directly in a response body or
/// recorded into engine state for later status queries.
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    /// The engine was asked to start with no licensing configured.
    #[error("licensing must be configured before the engine can start")]
    LicensingRequired,

    /// A licensing request carried a missing, malformed, or unrecognized field.
    #[error("invalid licensing request: {0}")]
    InvalidLicensingType(String),

    /// The hosted license exchange rejected the credentials or was unreachable.
    #[error("license exchange failed: {0}")]
    LicenseExchangeFailed(String),

    /// The engine process could not be spawned or never became ready.
    #[error("engine startup failed: {0}")]
    EngineSpawnFailed(String),

    /// The engine was up but stopped answering.
    #[error("engine unreachable: {0}")]
    EngineUnreachable(String),

    /// Anything that should never happen in a correctly deployed proxy.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ProxyError {
    /// Stable tag for the envelope's `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LicensingRequired => "LicensingRequired",
            Self::InvalidLicensingType(_) => "InvalidLicensingType",
            Self::LicenseExchangeFailed(_) => "LicenseExchangeFailed",
            Self::EngineSpawnFailed(_) => "EngineSpawnFailed",
            Self::EngineUnreachable(_) => "EngineUnreachable",
            Self::InternalError(_) => "InternalError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // Both are licensing-input problems; LicensingRequired normally
            // surfaces through engine state rather than a direct response.
            Self::LicensingRequired | Self::InvalidLicensingType(_) => StatusCode::BAD_REQUEST,
            Self::LicenseExchangeFailed(_) => StatusCode::BAD_GATEWAY,
            Self::EngineSpawnFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::EngineUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Marshal into the wire envelope, optionally attaching captured engine
    /// output.
    pub fn into_record(self, logs: Option<Vec<String>>) -> ErrorRecord {
        ErrorRecord {
            message: self.to_string(),
            logs,
            kind: self.kind().to_string(),
        }
    }
}

/// The `{message, logs, type}` envelope carried in error responses and in
/// the `lastError` field of engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub logs: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.into_record(None))).into_response()
    }
}
