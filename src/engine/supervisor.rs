//! Engine supervision state machine.
//!
//! # States
//! ```text
//! Down → Starting → {Up, Error}
//! Up → Down (stop) | Error (crash detected while polling)
//! Error → Starting (start) | Down (stop)
//! ```
//!
//! # Design Decisions
//! - One async mutex guards state + process handle; it is never held across
//!   a suspension point, so `snapshot()` always reflects the instant of call
//! - Startup and liveness polling run in a background task; every write from
//!   that task is generation-guarded so a `stop()` or `restart()` issued in
//!   the meantime wins and stale polls become no-ops
//! - Lifecycle failures land in `last_error` and are surfaced passively via
//!   status queries; `start()` is fire-and-forget for callers

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{interval, timeout, Instant};

use crate::config::EngineConfig;
use crate::engine::spawner::{EngineProcess, LaunchSpec, Spawner};
use crate::error::{ErrorRecord, ProxyError};
use crate::licensing::LicensingInfo;

/// Reachability of the backend engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Down,
    Starting,
    Up,
    Error,
}

/// Snapshot of the engine lifecycle state.
///
/// Invariant: `address` is `Some` if and only if `status == Up`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub status: EngineStatus,
    pub address: Option<String>,
    pub last_error: Option<ErrorRecord>,
}

impl EngineState {
    pub fn down() -> Self {
        Self {
            status: EngineStatus::Down,
            address: None,
            last_error: None,
        }
    }

    fn error(record: ErrorRecord) -> Self {
        Self {
            status: EngineStatus::Error,
            address: None,
            last_error: Some(record),
        }
    }
}

struct Inner {
    state: EngineState,
    process: Option<Box<dyn EngineProcess>>,
    /// Bumped by every stop/restart; background tasks check it before each
    /// state write so a stale poll can never clobber newer state.
    generation: u64,
}

/// Owns the engine process and publishes its reachability.
///
/// Cheap to clone; all clones share one state cell. The process handle is
/// exclusively owned here: no other component spawns or kills the engine.
#[derive(Clone)]
pub struct EngineSupervisor {
    config: EngineConfig,
    probe_timeout: Duration,
    spawner: Arc<dyn Spawner>,
    inner: Arc<Mutex<Inner>>,
}

impl EngineSupervisor {
    pub fn new(config: EngineConfig, probe_timeout: Duration, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            config,
            probe_timeout,
            spawner,
            inner: Arc::new(Mutex::new(Inner {
                state: EngineState::down(),
                process: None,
                generation: 0,
            })),
        }
    }

    /// Current state, without side effects. Safe to call concurrently with
    /// `start`/`stop`; an in-progress start is visible as `Starting`.
    pub async fn snapshot(&self) -> EngineState {
        self.inner.lock().await.state.clone()
    }

    /// Start the engine with the given licensing.
    ///
    /// Idempotent: while `Starting` or `Up` this is a no-op returning the
    /// current state, so concurrent calls collapse to one spawn attempt.
    /// Failures are recorded into the state rather than returned.
    pub async fn start(&self, licensing: &LicensingInfo) -> EngineState {
        let generation = {
            let mut inner = self.inner.lock().await;
            match inner.state.status {
                EngineStatus::Starting | EngineStatus::Up => return inner.state.clone(),
                EngineStatus::Down | EngineStatus::Error => {}
            }

            if licensing.is_unset() {
                inner.state =
                    EngineState::error(ProxyError::LicensingRequired.into_record(None));
                return inner.state.clone();
            }

            inner.generation += 1;
            inner.state = EngineState {
                status: EngineStatus::Starting,
                address: None,
                last_error: None,
            };
            inner.generation
        };

        let spec = launch_spec(&self.config, licensing);
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.run_lifecycle(generation, spec).await;
        });

        self.snapshot().await
    }

    /// Stop the engine. Allowed from any state, idempotent, converges on
    /// `Down` with address and last error cleared.
    pub async fn stop(&self) -> EngineState {
        let process = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.state = EngineState::down();
            inner.process.take()
        };
        if let Some(mut process) = process {
            process.kill().await;
            tracing::info!("engine process stopped");
        }
        EngineState::down()
    }

    /// Stop then start, atomically enough that the old address is never
    /// observable once this call has begun.
    pub async fn restart(&self, licensing: &LicensingInfo) -> EngineState {
        self.stop().await;
        self.start(licensing).await
    }

    /// Called by the forwarding path when a request to the backend failed
    /// mid-flight. Transitions to `Error` only when the process is confirmed
    /// dead; a transient network failure leaves the state alone.
    pub async fn note_unreachable(&self, message: &str) {
        let mut inner = self.inner.lock().await;
        if inner.state.status != EngineStatus::Up {
            return;
        }
        let dead = match inner.process.as_mut() {
            Some(process) => !process.is_running(),
            None => true,
        };
        if !dead {
            return;
        }
        let logs = inner.process.as_ref().map(|p| p.read_logs());
        inner.process = None;
        inner.generation += 1;
        inner.state = EngineState::error(
            ProxyError::EngineUnreachable(message.to_string()).into_record(logs),
        );
        tracing::warn!("engine confirmed dead after failed forward");
    }

    /// Background task driving `Starting → {Up, Error}` and, once up,
    /// watching for crashes.
    async fn run_lifecycle(&self, generation: u64, spec: LaunchSpec) {
        let process = match self.spawner.spawn(&spec).await {
            Ok(process) => process,
            Err(e) => {
                self.fail(generation, e, None).await;
                return;
            }
        };

        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                // Stopped while spawning; the new owner of the state already
                // won, just clean up the orphan.
                drop(inner);
                let mut process = process;
                process.kill().await;
                return;
            }
            inner.process = Some(process);
        }

        let address = self.config.address.clone();
        let deadline = Instant::now() + self.config.ready_timeout();
        let mut ticker = interval(self.config.poll_interval());

        // Readiness: probe until the engine accepts a TCP connection.
        loop {
            ticker.tick().await;

            match self.check_process(generation).await {
                ProcessCheck::Stale => return,
                ProcessCheck::Dead(logs) => {
                    self.fail(
                        generation,
                        ProxyError::EngineSpawnFailed(
                            "engine process exited before becoming ready".into(),
                        ),
                        logs,
                    )
                    .await;
                    return;
                }
                ProcessCheck::Alive => {}
            }

            if timeout(self.probe_timeout, TcpStream::connect(&address)).await
                .map(|r| r.is_ok())
                .unwrap_or(false)
            {
                let mut inner = self.inner.lock().await;
                if inner.generation != generation {
                    return;
                }
                inner.state = EngineState {
                    status: EngineStatus::Up,
                    address: Some(address.clone()),
                    last_error: None,
                };
                tracing::info!(address = %address, "engine is up");
                break;
            }

            if Instant::now() >= deadline {
                let (logs, orphan) = {
                    let mut inner = self.inner.lock().await;
                    if inner.generation != generation {
                        return;
                    }
                    let logs = inner.process.as_ref().map(|p| p.read_logs());
                    (logs, inner.process.take())
                };
                if let Some(mut process) = orphan {
                    process.kill().await;
                }
                self.fail(
                    generation,
                    ProxyError::EngineSpawnFailed(format!(
                        "engine did not become reachable at {address} within {}s",
                        self.config.ready_timeout_secs
                    )),
                    logs,
                )
                .await;
                return;
            }
        }

        // Liveness: watch the process until stop() cancels this generation.
        loop {
            ticker.tick().await;
            match self.check_process(generation).await {
                ProcessCheck::Stale => return,
                ProcessCheck::Dead(logs) => {
                    self.fail(
                        generation,
                        ProxyError::EngineUnreachable("engine process exited unexpectedly".into()),
                        logs,
                    )
                    .await;
                    return;
                }
                ProcessCheck::Alive => {}
            }
        }
    }

    async fn check_process(&self, generation: u64) -> ProcessCheck {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return ProcessCheck::Stale;
        }
        match inner.process.as_mut() {
            None => ProcessCheck::Stale,
            Some(process) => {
                if process.is_running() {
                    ProcessCheck::Alive
                } else {
                    let logs = process.read_logs();
                    inner.process = None;
                    ProcessCheck::Dead(Some(logs))
                }
            }
        }
    }

    async fn fail(&self, generation: u64, error: ProxyError, logs: Option<Vec<String>>) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        tracing::error!(error = %error, "engine lifecycle failure");
        inner.state = EngineState::error(error.into_record(logs));
    }
}

enum ProcessCheck {
    Alive,
    Dead(Option<Vec<String>>),
    Stale,
}

/// Translate the active licensing mode into the engine launch environment.
fn launch_spec(config: &EngineConfig, licensing: &LicensingInfo) -> LaunchSpec {
    let mut env = vec![("ENGINE_ADDRESS".to_string(), config.address.clone())];
    match licensing {
        LicensingInfo::Unset => {}
        LicensingInfo::NetworkLicense { connection_string } => {
            env.push(("ENGINE_LICENSE_MODE".into(), "nlm".into()));
            env.push(("ENGINE_LICENSE_SERVER".into(), connection_string.clone()));
        }
        LicensingInfo::HostedLicense {
            email_address,
            entitlement_id,
            ..
        } => {
            env.push(("ENGINE_LICENSE_MODE".into(), "mhlm".into()));
            env.push(("ENGINE_LICENSE_ACCOUNT".into(), email_address.clone()));
            if let Some(id) = entitlement_id {
                env.push(("ENGINE_ENTITLEMENT_ID".into(), id.clone()));
            }
        }
        LicensingInfo::ExistingLicense => {
            env.push(("ENGINE_LICENSE_MODE".into(), "existing".into()));
        }
    }
    LaunchSpec {
        command: config.command.clone(),
        args: config.args.clone(),
        env,
    }
}
