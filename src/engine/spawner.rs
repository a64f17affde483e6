//! Engine process spawning.
//!
//! # Responsibilities
//! - Launch the engine executable with the licensing environment
//! - Capture process output for error reports
//! - Terminate and reap the process on stop
//!
//! The supervisor only talks to the [`Spawner`] and [`EngineProcess`] traits;
//! tests inject fakes and never fork real processes.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::error::ProxyError;

/// Everything needed to launch the engine once.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Environment variables carrying the licensing mode.
    pub env: Vec<(String, String)>,
}

/// Handle to a launched engine process.
pub trait EngineProcess: Send {
    /// Whether the OS process is still alive.
    fn is_running(&mut self) -> bool;

    /// Terminate the process and reap it.
    fn kill(&mut self) -> BoxFuture<'_, ()>;

    /// Snapshot of captured stdout/stderr lines.
    fn read_logs(&self) -> Vec<String>;
}

/// Process spawner seam.
pub trait Spawner: Send + Sync + 'static {
    fn spawn<'a>(
        &'a self,
        spec: &'a LaunchSpec,
    ) -> BoxFuture<'a, Result<Box<dyn EngineProcess>, ProxyError>>;
}

type LogBuffer = Arc<Mutex<VecDeque<String>>>;

/// Production spawner wrapping `tokio::process`.
pub struct ProcessSpawner {
    /// Maximum captured output lines kept per process.
    log_buffer_lines: usize,
}

impl ProcessSpawner {
    pub fn new(log_buffer_lines: usize) -> Self {
        Self { log_buffer_lines }
    }
}

impl Spawner for ProcessSpawner {
    fn spawn<'a>(
        &'a self,
        spec: &'a LaunchSpec,
    ) -> BoxFuture<'a, Result<Box<dyn EngineProcess>, ProxyError>> {
        Box::pin(async move {
            let mut child = Command::new(&spec.command)
                .args(&spec.args)
                .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    ProxyError::EngineSpawnFailed(format!(
                        "failed to launch '{}': {e}",
                        spec.command
                    ))
                })?;

            let logs: LogBuffer = Arc::new(Mutex::new(VecDeque::new()));
            if let Some(stdout) = child.stdout.take() {
                pump_lines(stdout, logs.clone(), self.log_buffer_lines);
            }
            if let Some(stderr) = child.stderr.take() {
                pump_lines(stderr, logs.clone(), self.log_buffer_lines);
            }

            tracing::info!(command = %spec.command, pid = child.id(), "engine process launched");
            Ok(Box::new(ChildProcess { child, logs }) as Box<dyn EngineProcess>)
        })
    }
}

/// Copy output lines into the bounded log buffer until the pipe closes.
fn pump_lines<R>(reader: R, logs: LogBuffer, cap: usize)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut buffer) = logs.lock() {
                if buffer.len() == cap {
                    buffer.pop_front();
                }
                buffer.push_back(line);
            }
        }
    });
}

struct ChildProcess {
    child: Child,
    logs: LogBuffer,
}

impl EngineProcess for ChildProcess {
    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.child.start_kill().is_ok() {
                let _ = self.child.wait().await;
            }
        })
    }

    fn read_logs(&self) -> Vec<String> {
        self.logs
            .lock()
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }
}
