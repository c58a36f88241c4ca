//! Isolated execution contexts the host can spawn a worker into.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::WorkerError;
use crate::handler::{HandlerFactory, serve_worker};
use crate::messages::{HostMessage, MessageType, WorkerMessage};
use crate::transport::{CHANNEL_CAPACITY, pump_lines_in, pump_lines_out};

/// Capability to start a fresh worker from an entry point.
///
/// An environment without worker support is represented by having no
/// runtime at all, not by a runtime that always fails.
pub trait WorkerRuntime: Send + Sync {
    fn spawn(&self, entry_point: &str) -> Result<WorkerPort, WorkerError>;
}

type Terminator = Box<dyn FnOnce() + Send>;

/// Host end of one live worker. Dropping the port terminates the worker.
pub struct WorkerPort {
    outbound: mpsc::Sender<HostMessage>,
    inbound: mpsc::Receiver<WorkerMessage>,
    terminator: Option<Terminator>,
}

impl WorkerPort {
    /// Wraps a channel pair whose far end is owned by some worker context.
    /// `terminator` runs at most once, on `terminate` or drop.
    #[must_use]
    pub fn new(
        outbound: mpsc::Sender<HostMessage>,
        inbound: mpsc::Receiver<WorkerMessage>,
        terminator: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            outbound,
            inbound,
            terminator: Some(Box::new(terminator)),
        }
    }

    pub async fn send(&mut self, message: HostMessage) -> Result<(), WorkerError> {
        let message_type = message
            .message_type()
            .map_or("unknown", MessageType::as_str);
        self.outbound
            .send(message)
            .await
            .map_err(|_| WorkerError::Send {
                message_type: message_type.to_string(),
            })
    }

    /// Next message from the worker, or `None` once the worker side is gone.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.inbound.recv().await
    }

    pub fn terminate(&mut self) {
        self.inbound.close();
        if let Some(terminator) = self.terminator.take() {
            terminator();
        }
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminator.is_none()
    }
}

impl Drop for WorkerPort {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Runs workers as tokio tasks, resolving entry points through a registry.
#[derive(Clone, Default)]
pub struct InProcessWorkerRuntime {
    entry_points: HashMap<String, HandlerFactory>,
}

impl InProcessWorkerRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry_point(
        mut self,
        entry_point: impl Into<String>,
        factory: HandlerFactory,
    ) -> Self {
        self.entry_points.insert(entry_point.into(), factory);
        self
    }
}

impl WorkerRuntime for InProcessWorkerRuntime {
    fn spawn(&self, entry_point: &str) -> Result<WorkerPort, WorkerError> {
        let factory = self
            .entry_points
            .get(entry_point.trim())
            .cloned()
            .ok_or_else(|| WorkerError::UnknownEntryPoint {
                entry_point: entry_point.to_string(),
            })?;

        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(serve_worker(factory, outbound_rx, inbound_tx));
        tracing::debug!(entry_point, "spawned in-process worker");

        Ok(WorkerPort::new(outbound_tx, inbound_rx, move || task.abort()))
    }
}

/// Runs each worker as a child process speaking JSON lines on stdio.
/// The entry point is the executable; `args` are passed to every spawn.
#[derive(Debug, Clone, Default)]
pub struct ProcessWorkerRuntime {
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl ProcessWorkerRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }
}

impl WorkerRuntime for ProcessWorkerRuntime {
    fn spawn(&self, entry_point: &str) -> Result<WorkerPort, WorkerError> {
        let program = entry_point.trim();
        if program.is_empty() {
            return Err(WorkerError::UnknownEntryPoint {
                entry_point: entry_point.to_string(),
            });
        }

        let mut cmd = Command::new(program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|err| WorkerError::Spawn {
            message: format!("{program}: {err}"),
        })?;
        let stdin = child.stdin.take().ok_or_else(|| WorkerError::Spawn {
            message: format!("{program}: stdin missing"),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| WorkerError::Spawn {
            message: format!("{program}: stdout missing"),
        })?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<HostMessage>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<WorkerMessage>(CHANNEL_CAPACITY);
        let writer_task = tokio::spawn(pump_lines_out(outbound_rx, stdin));
        let reader_task = tokio::spawn(pump_lines_in(stdout, inbound_tx));
        tracing::debug!(program, pid = child.id(), "spawned worker process");

        Ok(WorkerPort::new(outbound_tx, inbound_rx, move || {
            writer_task.abort();
            reader_task.abort();
            if let Err(err) = child.start_kill() {
                tracing::debug!(error = %err, "worker process already exited");
            }
        }))
    }
}

/// Shared handle so one runtime can back many coordinators.
pub type SharedWorkerRuntime = Arc<dyn WorkerRuntime>;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::FutureExt;

    use super::*;
    use crate::handler::{BackendHandler, HookFuture};

    struct PingBackend;

    impl BackendHandler for PingBackend {
        fn on_ping(&self) -> Option<HookFuture> {
            Some(futures::future::ready(Ok(())).boxed())
        }
    }

    fn ping_runtime() -> InProcessWorkerRuntime {
        InProcessWorkerRuntime::new().with_entry_point(
            "/static/proctoring/worker.js",
            Arc::new(|_: serde_json::Value| Box::new(PingBackend) as Box<dyn BackendHandler>),
        )
    }

    #[tokio::test]
    async fn in_process_worker_answers_over_its_port() -> anyhow::Result<()> {
        let mut port = ping_runtime().spawn("/static/proctoring/worker.js")?;
        port.send(HostMessage::Ping).await?;
        assert_eq!(port.recv().await, Some(WorkerMessage::Echo));
        port.terminate();
        assert!(port.is_terminated());
        Ok(())
    }

    #[test]
    fn unknown_entry_point_is_rejected() {
        let result = ping_runtime().spawn("/static/other.js");
        assert!(matches!(
            result,
            Err(WorkerError::UnknownEntryPoint { entry_point }) if entry_point == "/static/other.js"
        ));
    }

    #[test]
    fn terminator_runs_on_drop() {
        let terminated = Arc::new(AtomicBool::new(false));
        let flag = terminated.clone();
        let (outbound_tx, _outbound_rx) = mpsc::channel(1);
        let (_inbound_tx, inbound_rx) = mpsc::channel(1);
        let port = WorkerPort::new(outbound_tx, inbound_rx, move || {
            flag.store(true, Ordering::SeqCst);
        });
        drop(port);
        assert!(terminated.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn process_runtime_reports_missing_executable() {
        let result = ProcessWorkerRuntime::new()
            .spawn("/nonexistent/proctoring-worker")
            .map(|_| ());
        assert!(matches!(result, Err(WorkerError::Spawn { .. })));
    }
}
