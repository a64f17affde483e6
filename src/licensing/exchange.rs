//! Hosted license token exchange.
//!
//! The exchange is an external collaborator: credentials go out, entitlements
//! come back. Everything behind the [`LicenseExchange`] trait so tests can
//! inject a fake and the licensing state machine stays network-free.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use crate::error::ProxyError;
use crate::licensing::state::Entitlement;

/// External license service seam.
pub trait LicenseExchange: Send + Sync + 'static {
    /// Exchange credentials for the entitlements granted to this account.
    fn exchange<'a>(
        &'a self,
        token: &'a str,
        email_address: &'a str,
        source_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Entitlement>, ProxyError>>;
}

/// Production exchange client speaking JSON over HTTPS to the configured
/// license service endpoint.
pub struct HostedExchangeClient {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    #[serde(default)]
    entitlements: Vec<Entitlement>,
}

impl HostedExchangeClient {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::InternalError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, endpoint })
    }
}

impl LicenseExchange for HostedExchangeClient {
    fn exchange<'a>(
        &'a self,
        token: &'a str,
        email_address: &'a str,
        source_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Entitlement>, ProxyError>> {
        Box::pin(async move {
            let response = self
                .http
                .post(&self.endpoint)
                .json(&json!({
                    "token": token,
                    "emailAddress": email_address,
                    "sourceId": source_id,
                }))
                .send()
                .await
                .map_err(|e| ProxyError::LicenseExchangeFailed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProxyError::LicenseExchangeFailed(format!(
                    "license service returned {status}"
                )));
            }

            let body: ExchangeResponse = response
                .json()
                .await
                .map_err(|e| ProxyError::LicenseExchangeFailed(e.to_string()))?;

            tracing::debug!(
                entitlements = body.entitlements.len(),
                "license exchange succeeded"
            );
            Ok(body.entitlements)
        })
    }
}
