//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging with request IDs flowing through all subsystems
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
