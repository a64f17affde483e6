//! Status aggregation.
//!
//! Composes engine and licensing snapshots into the single payload served by
//! the status endpoints. Marshaling is pure so it can be tested without a
//! running engine.

use serde_json::{json, Value};

use crate::engine::EngineState;
use crate::licensing::LicensingInfo;

/// Marshal the active licensing mode into its wire shape.
///
/// `Unset` marshals to `null`; the populated variants carry their `type` tag
/// so clients can branch without guessing from field names.
pub fn marshal_licensing_info(licensing: &LicensingInfo) -> Value {
    match licensing {
        LicensingInfo::Unset => Value::Null,
        LicensingInfo::NetworkLicense { connection_string } => json!({
            "type": "nlm",
            "connectionString": connection_string,
        }),
        LicensingInfo::HostedLicense {
            email_address,
            entitlements,
            entitlement_id,
        } => json!({
            "type": "mhlm",
            "emailAddress": email_address,
            "entitlements": entitlements,
            "entitlementId": entitlement_id,
        }),
        LicensingInfo::ExistingLicense => json!({
            "type": "existing_license",
        }),
    }
}

/// Compose the full status payload.
pub fn compose_status(engine: &EngineState, licensing: &LicensingInfo, load_url: &str) -> Value {
    json!({
        "engine": engine,
        "licensing": marshal_licensing_info(licensing),
        "loadUrl": load_url,
    })
}
