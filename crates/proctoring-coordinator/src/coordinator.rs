use std::sync::Arc;
use std::time::Duration;

use proctoring_attempt_client::{Action, AttemptClientError, AttemptStatusClient};
use proctoring_worker_protocol::{
    END_EXAM_ATTEMPT_EVENTS, EventNamePair, PING_EVENTS, RoundTripOptions,
    START_EXAM_ATTEMPT_EVENTS, SharedWorkerRuntime, WorkerError, WorkerRuntime, round_trip,
};
use serde_json::Value;
use thiserror::Error;

use crate::config::{CoordinatorConfig, DEFAULT_WORKER_PING_TIMEOUT_MS};
use crate::unload::UnloadWarningGate;

/// Page transition performed once an action sequence has completed.
pub trait PageTransition: Send + Sync {
    fn reload(&self);
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    AttemptUpdate(#[from] AttemptClientError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: Action,
    pub used_worker: bool,
}

#[must_use]
pub fn event_names_for(action: Action) -> EventNamePair {
    match action {
        Action::Start => START_EXAM_ATTEMPT_EVENTS,
        Action::Submit => END_EXAM_ATTEMPT_EVENTS,
    }
}

/// Sequences worker handoff, attempt status update and page transition for
/// one user-initiated action.
///
/// `start` arms the worker before the attempt is marked started; `submit`
/// marks the attempt submitted before the worker is told to stop. The page
/// is reloaded only after every step of the sequence has succeeded.
pub struct AttemptActionCoordinator {
    client: AttemptStatusClient,
    workers: Option<SharedWorkerRuntime>,
    worker_entry_point: Option<String>,
    worker_response_timeout: Option<Duration>,
    worker_ping_timeout: Duration,
    worker_options: Option<Value>,
    transition: Arc<dyn PageTransition>,
    unload_gate: Arc<UnloadWarningGate>,
}

impl AttemptActionCoordinator {
    #[must_use]
    pub fn new(client: AttemptStatusClient, transition: Arc<dyn PageTransition>) -> Self {
        Self {
            client,
            workers: None,
            worker_entry_point: None,
            worker_response_timeout: None,
            worker_ping_timeout: Duration::from_millis(DEFAULT_WORKER_PING_TIMEOUT_MS),
            worker_options: None,
            transition,
            unload_gate: Arc::new(UnloadWarningGate::default()),
        }
    }

    /// Builds a coordinator from environment-derived settings. `workers` is
    /// `None` when the host cannot run isolated worker contexts.
    pub fn from_config(
        config: &CoordinatorConfig,
        workers: Option<SharedWorkerRuntime>,
        transition: Arc<dyn PageTransition>,
    ) -> Result<Self, AttemptClientError> {
        let client = AttemptStatusClient::new(config.attempt_client_config())?;
        let mut coordinator = Self::new(client, transition)
            .with_worker_entry_point(config.worker_entry_point.clone())
            .with_worker_response_timeout(config.worker_response_timeout)
            .with_worker_ping_timeout(config.worker_ping_timeout)
            .with_unload_gate(Arc::new(UnloadWarningGate::new(
                config.unload_warning.clone(),
            )));
        coordinator.workers = workers;
        coordinator.worker_options = config.worker_options.clone();
        Ok(coordinator)
    }

    #[must_use]
    pub fn with_worker_runtime(mut self, workers: SharedWorkerRuntime) -> Self {
        self.workers = Some(workers);
        self
    }

    #[must_use]
    pub fn with_worker_entry_point(mut self, entry_point: Option<String>) -> Self {
        self.worker_entry_point = entry_point
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    #[must_use]
    pub fn with_worker_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.worker_response_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_worker_ping_timeout(mut self, timeout: Duration) -> Self {
        self.worker_ping_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_worker_options(mut self, options: Value) -> Self {
        self.worker_options = Some(options);
        self
    }

    #[must_use]
    pub fn with_unload_gate(mut self, unload_gate: Arc<UnloadWarningGate>) -> Self {
        self.unload_gate = unload_gate;
        self
    }

    #[must_use]
    pub fn unload_gate(&self) -> &Arc<UnloadWarningGate> {
        &self.unload_gate
    }

    /// True iff worker contexts are available and an entry point is configured.
    #[must_use]
    pub fn should_use_worker(&self) -> bool {
        self.worker_target().is_some()
    }

    pub async fn handle_action(
        &self,
        action: Action,
        action_url: &str,
    ) -> Result<ActionOutcome, CoordinatorError> {
        let used_worker = match action {
            Action::Start => self.start(action_url).await?,
            Action::Submit => self.submit(action_url).await?,
        };

        tracing::info!(%action, used_worker, "attempt action complete, reloading page");
        self.transition.reload();
        Ok(ActionOutcome {
            action,
            used_worker,
        })
    }

    async fn start(&self, action_url: &str) -> Result<bool, CoordinatorError> {
        let used_worker = self.should_use_worker();
        if used_worker {
            tracing::info!("arming proctoring worker before start");
            self.run_worker(event_names_for(Action::Start), self.worker_response_timeout)
                .await?;
        }
        self.client
            .update_attempt_status(action_url, Action::Start)
            .await?;
        Ok(used_worker)
    }

    async fn submit(&self, action_url: &str) -> Result<bool, CoordinatorError> {
        self.unload_gate.detach();
        self.client
            .update_attempt_status(action_url, Action::Submit)
            .await?;

        let used_worker = self.should_use_worker();
        if used_worker {
            tracing::info!("stopping proctoring worker after submit");
            self.run_worker(event_names_for(Action::Submit), self.worker_response_timeout)
                .await?;
        }
        Ok(used_worker)
    }

    /// Health check against the configured worker. `Ok(false)` means there is
    /// no worker to ping.
    pub async fn ping_worker(&self) -> Result<bool, CoordinatorError> {
        if self.worker_target().is_none() {
            return Ok(false);
        }
        self.run_worker(PING_EVENTS, Some(self.worker_ping_timeout))
            .await?;
        Ok(true)
    }

    async fn run_worker(
        &self,
        events: EventNamePair,
        timeout: Option<Duration>,
    ) -> Result<(), WorkerError> {
        let Some((runtime, entry_point)) = self.worker_target() else {
            return Ok(());
        };
        let options = RoundTripOptions {
            timeout,
            config: self.worker_options.clone(),
        };
        match round_trip(runtime, entry_point, events, &options).await {
            Ok(()) => {
                tracing::info!(entry_point, response = %events.response, "proctoring worker acknowledged");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(entry_point, prompt = %events.prompt, %error, "proctoring worker round trip failed");
                Err(error)
            }
        }
    }

    fn worker_target(&self) -> Option<(&dyn WorkerRuntime, &str)> {
        let runtime = self.workers.as_deref()?;
        let entry_point = self.worker_entry_point.as_deref()?;
        Some((runtime, entry_point))
    }
}
