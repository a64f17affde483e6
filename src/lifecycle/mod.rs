//! Lifecycle management subsystem.
//!
//! ```text
//! SIGINT / terminate_integration → Shutdown broadcast
//!     → HTTP server stops accepting, drains in-flight requests
//!     → engine process killed by the supervisor
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
