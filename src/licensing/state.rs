//! Licensing state machine.
//!
//! # States
//! Exactly one variant of [`LicensingInfo`] is active at a time:
//! - `Unset`: no licensing configured; the engine refuses to start
//! - `NetworkLicense`: floating license identified by a connection string
//! - `HostedLicense`: token-exchanged entitlements for one account
//! - `ExistingLicense`: trust a license already configured on the engine
//!
//! # Design Decisions
//! - Setters overwrite the active variant directly; no explicit transition
//!   through `Unset` is required
//! - The `type` tag of inbound requests is validated here, once, for the
//!   whole HTTP boundary; unrecognized tags never reach the engine
//! - Clearing licensing does not stop a running engine; process state and
//!   licensing state are decoupled and the caller owns the policy

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::ProxyError;
use crate::licensing::exchange::LicenseExchange;

/// One unit of licensing grant returned by the hosted exchange.
/// Opaque pass-through; only the shape is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub id: String,
    pub label: String,
    pub license_number: String,
}

/// The active licensing mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LicensingInfo {
    #[default]
    Unset,
    NetworkLicense {
        connection_string: String,
    },
    HostedLicense {
        email_address: String,
        entitlements: Vec<Entitlement>,
        entitlement_id: Option<String>,
    },
    ExistingLicense,
}

impl LicensingInfo {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

/// Process-wide holder of the active [`LicensingInfo`].
///
/// Cheap to clone; all clones share one cell. Mutation goes through the
/// operations below, never through direct writes.
#[derive(Clone)]
pub struct LicensingState {
    cell: Arc<RwLock<LicensingInfo>>,
    exchange: Arc<dyn LicenseExchange>,
}

impl LicensingState {
    pub fn new(exchange: Arc<dyn LicenseExchange>) -> Self {
        Self {
            cell: Arc::new(RwLock::new(LicensingInfo::Unset)),
            exchange,
        }
    }

    /// Read-only snapshot of the active licensing mode.
    pub async fn current(&self) -> LicensingInfo {
        self.cell.read().await.clone()
    }

    /// Store a network license. No live validation happens here; the license
    /// server is only consulted when the engine actually starts.
    pub async fn set_network_license(&self, connection_string: String) {
        let mut cell = self.cell.write().await;
        *cell = LicensingInfo::NetworkLicense { connection_string };
        tracing::info!("licensing set to network license");
    }

    /// Exchange hosted-license credentials for entitlements and store the
    /// result. On exchange failure the prior value is left unchanged.
    pub async fn set_hosted_license(
        &self,
        token: &str,
        email_address: &str,
        source_id: &str,
    ) -> Result<(), ProxyError> {
        let entitlements = self.exchange.exchange(token, email_address, source_id).await?;
        let mut cell = self.cell.write().await;
        *cell = LicensingInfo::HostedLicense {
            email_address: email_address.to_string(),
            entitlements,
            entitlement_id: None,
        };
        tracing::info!(email = %email_address, "licensing set to hosted license");
        Ok(())
    }

    /// Delegate trust to a license already configured on the engine.
    pub async fn set_existing_license(&self) {
        let mut cell = self.cell.write().await;
        *cell = LicensingInfo::ExistingLicense;
        tracing::info!("licensing set to existing license");
    }

    /// Select one of the entitlements retrieved by a prior hosted exchange.
    pub async fn select_entitlement(&self, id: &str) -> Result<(), ProxyError> {
        let mut cell = self.cell.write().await;
        match &mut *cell {
            LicensingInfo::HostedLicense {
                entitlements,
                entitlement_id,
                ..
            } => {
                if !entitlements.iter().any(|e| e.id == id) {
                    return Err(ProxyError::InvalidLicensingType(format!(
                        "unknown entitlement id '{id}'"
                    )));
                }
                *entitlement_id = Some(id.to_string());
                Ok(())
            }
            _ => Err(ProxyError::InvalidLicensingType(
                "entitlement selection requires an active hosted license".into(),
            )),
        }
    }

    /// Drop back to `Unset`. Does not stop a running engine.
    pub async fn clear(&self) {
        let mut cell = self.cell.write().await;
        *cell = LicensingInfo::Unset;
        tracing::info!("licensing cleared");
    }

    /// Apply a licensing request from the HTTP boundary.
    ///
    /// This is the single input-validation gate: an unrecognized or missing
    /// `type` tag fails with `InvalidLicensingType` and leaves the active
    /// value untouched.
    pub async fn apply(&self, request: &Value) -> Result<(), ProxyError> {
        let tag = request
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProxyError::InvalidLicensingType("missing 'type' tag".into()))?;

        match tag {
            "nlm" => {
                let connection_string = require_str(request, "connectionString")?;
                self.set_network_license(connection_string.to_string()).await;
                Ok(())
            }
            "mhlm" => {
                let token = require_str(request, "token")?;
                // The browser UI sends "emailaddress"; API clients send
                // "emailAddress". Accept both spellings.
                let email = request
                    .get("emailAddress")
                    .or_else(|| request.get("emailaddress"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ProxyError::InvalidLicensingType("missing field 'emailAddress'".into())
                    })?;
                let source_id = require_str(request, "sourceId")?;
                self.set_hosted_license(token, email, source_id).await?;
                if let Some(id) = request.get("entitlementId").and_then(Value::as_str) {
                    self.select_entitlement(id).await?;
                }
                Ok(())
            }
            "existing_license" => {
                self.set_existing_license().await;
                Ok(())
            }
            other => Err(ProxyError::InvalidLicensingType(format!(
                "unrecognized licensing type '{other}'"
            ))),
        }
    }
}

fn require_str<'a>(request: &'a Value, field: &str) -> Result<&'a str, ProxyError> {
    request
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ProxyError::InvalidLicensingType(format!("missing field '{field}'")))
}
