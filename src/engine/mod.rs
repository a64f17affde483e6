//! Engine supervision subsystem.
//!
//! # Data Flow
//! ```text
//! start request
//!     → supervisor.rs (state machine, readiness + liveness polling)
//!     → spawner.rs (launch process, capture output)
//!
//! snapshot() feeds the status aggregator and the forwarding fast-fail check.
//! ```

pub mod spawner;
pub mod supervisor;

pub use spawner::{EngineProcess, LaunchSpec, ProcessSpawner, Spawner};
pub use supervisor::{EngineState, EngineStatus, EngineSupervisor};
