//! Licensing subsystem.
//!
//! # Data Flow
//! ```text
//! PUT /set_licensing_info
//!     → state.rs (validate type tag, update the one licensing cell)
//!     → exchange.rs (hosted mode only: token → entitlements)
//!
//! Engine start reads the active mode to build the launch environment.
//! ```

pub mod exchange;
pub mod state;

pub use exchange::{HostedExchangeClient, LicenseExchange};
pub use state::{Entitlement, LicensingInfo, LicensingState};
