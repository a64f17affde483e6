//! Engine Proxy Library
//!
//! A reverse proxy that fronts a licensed, single-instance compute engine:
//! it supervises the engine process, enforces licensing before use, and
//! transparently forwards HTTP and WebSocket traffic once the engine is up.
//! Clients never talk to the engine directly.
//!
//! Forwarding deliberately fast-fails with 404 while the engine is not
//! reachable; clients are expected to poll with backoff rather than block.

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod licensing;
pub mod lifecycle;
pub mod observability;
pub mod status;

pub use config::ProxyConfig;
pub use engine::{EngineState, EngineStatus, EngineSupervisor};
pub use error::{ErrorRecord, ProxyError};
pub use http::HttpServer;
pub use licensing::{LicenseExchange, LicensingInfo, LicensingState};
pub use lifecycle::Shutdown;
