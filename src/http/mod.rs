//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, routing)
//!     → handlers.rs (reserved internal routes)
//!     → forward.rs (everything else: fast-fail or reissue to the engine)
//!     → websocket.rs (upgrade requests: full-duplex bridge)
//! ```

pub mod forward;
pub mod handlers;
pub mod request;
pub mod server;
pub mod websocket;

pub use request::{RequestIdLayer, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
