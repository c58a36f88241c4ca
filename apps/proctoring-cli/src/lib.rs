use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use futures::FutureExt;
use proctoring_attempt_client::AttemptStatusClient;
use proctoring_coordinator::{
    Action, AttemptActionCoordinator, CoordinatorConfig, ExamPageState, PageTransition,
    UnloadWarningGate,
};
use proctoring_worker_protocol::{
    BackendHandler, HandlerFactory, HookFuture, HookResult, ProcessWorkerRuntime,
    SharedWorkerRuntime, serve_stdio_worker,
};
use serde_json::{Value, json};

#[derive(Parser, Debug)]
#[command(name = "proctoring")]
#[command(about = "Proctored exam attempt lifecycle tools")]
pub struct ProctoringCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start or submit an exam attempt, handing off to the proctoring worker if configured
    Action(ActionArgs),
    /// Ping the configured proctoring worker
    Ping(WorkerTargetArgs),
    /// Fetch the active attempt and report whether leaving the page would warn
    Status(StatusArgs),
    /// Run an acknowledging proctoring worker on stdin/stdout
    Worker,
}

#[derive(Args, Debug, Clone, Default)]
pub struct WorkerTargetArgs {
    /// Worker executable. Overrides PROCTORING_WORKER_ENTRY_POINT.
    #[arg(long)]
    pub worker_entry_point: Option<String>,
    /// Argument passed to every spawned worker process.
    #[arg(long = "worker-arg")]
    pub worker_args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ActionArgs {
    #[arg(long, value_parser = parse_action)]
    pub action: Action,
    /// Attempt URL receiving the status update, absolute or relative to --base-url.
    #[arg(long)]
    pub action_url: String,
    /// Overrides PROCTORING_BASE_URL.
    #[arg(long)]
    pub base_url: Option<String>,
    #[command(flatten)]
    pub worker: WorkerTargetArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long, default_value = "/api/edx_proctoring/v1/proctored_exam/attempt")]
    pub status_url: String,
    /// Page path the learner is on, used for the courseware check.
    #[arg(long, default_value = "/")]
    pub page_path: String,
    /// Overrides PROCTORING_BASE_URL.
    #[arg(long)]
    pub base_url: Option<String>,
}

fn parse_action(raw: &str) -> Result<Action, String> {
    raw.parse::<Action>()
        .map_err(|other| format!("unknown action `{other}`, expected start or submit"))
}

pub async fn run(cli: ProctoringCli) -> Result<()> {
    match cli.command {
        Commands::Action(args) => run_action(args).await,
        Commands::Ping(args) => run_ping(args).await,
        Commands::Status(args) => run_status(args).await,
        Commands::Worker => {
            serve_stdio_worker(logging_backend_factory()).await;
            Ok(())
        }
    }
}

/// Stands in for the page reload: there is no page, so the transition is logged.
struct LoggedReload;

impl PageTransition for LoggedReload {
    fn reload(&self) {
        tracing::info!("page reload");
    }
}

fn load_config(base_url: Option<String>, worker: &WorkerTargetArgs) -> Result<CoordinatorConfig> {
    let mut config = CoordinatorConfig::from_env().context("load proctoring config")?;
    if base_url.is_some() {
        config.base_url = base_url;
    }
    if worker.worker_entry_point.is_some() {
        config.worker_entry_point = worker.worker_entry_point.clone();
    }
    Ok(config)
}

fn build_coordinator(
    config: &CoordinatorConfig,
    worker: &WorkerTargetArgs,
) -> Result<AttemptActionCoordinator> {
    let runtime: SharedWorkerRuntime =
        Arc::new(ProcessWorkerRuntime::new().with_args(worker.worker_args.clone()));
    AttemptActionCoordinator::from_config(config, Some(runtime), Arc::new(LoggedReload))
        .context("build attempt coordinator")
}

async fn run_action(args: ActionArgs) -> Result<()> {
    let config = load_config(args.base_url, &args.worker)?;
    let coordinator = build_coordinator(&config, &args.worker)?;
    let outcome = coordinator
        .handle_action(args.action, &args.action_url)
        .await
        .with_context(|| format!("{} attempt via {}", args.action, args.action_url))?;
    write_json(&json!({
        "action": outcome.action,
        "used_worker": outcome.used_worker,
    }))
}

async fn run_ping(args: WorkerTargetArgs) -> Result<()> {
    let config = load_config(None, &args)?;
    let coordinator = build_coordinator(&config, &args)?;
    if !coordinator.ping_worker().await.context("ping proctoring worker")? {
        return Err(anyhow!("no proctoring worker entry point configured"));
    }
    write_json(&json!({"worker": "echo"}))
}

async fn run_status(args: StatusArgs) -> Result<()> {
    let config = load_config(args.base_url, &WorkerTargetArgs::default())?;
    let client = AttemptStatusClient::new(config.attempt_client_config())
        .context("build attempt client")?;
    let attempt = client
        .fetch_active_attempt(&args.status_url)
        .await
        .context("fetch active attempt")?;
    let page = ExamPageState::from_attempt(&attempt, &args.page_path);
    let gate = UnloadWarningGate::new(config.unload_warning);
    gate.evaluate(&page);
    write_json(&json!({
        "active": attempt.is_active(),
        "attempt_id": attempt.attempt_id,
        "attempt_status": attempt.attempt_status,
        "time_remaining_seconds": attempt.time_remaining_seconds,
        "unload_warning": gate.before_unload(),
    }))
}

fn write_json(value: &Value) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// Backend for the stdio worker: acknowledges every prompt, optionally
/// after `ack_delay_ms` from its `config` options.
struct LoggingBackend {
    ack_delay: Duration,
}

impl LoggingBackend {
    fn from_options(options: &Value) -> Self {
        let ack_delay = options
            .get("ack_delay_ms")
            .and_then(Value::as_u64)
            .map_or(Duration::ZERO, Duration::from_millis);
        Self { ack_delay }
    }

    fn acknowledge(&self, hook: &'static str) -> Option<HookFuture> {
        let ack_delay = self.ack_delay;
        Some(
            async move {
                tracing::info!(hook, delay_ms = ack_delay.as_millis() as u64, "proctoring hook");
                if !ack_delay.is_zero() {
                    tokio::time::sleep(ack_delay).await;
                }
                HookResult::Ok(())
            }
            .boxed(),
        )
    }
}

impl BackendHandler for LoggingBackend {
    fn on_start_exam_attempt(&self) -> Option<HookFuture> {
        self.acknowledge("start_exam_attempt")
    }

    fn on_end_exam_attempt(&self) -> Option<HookFuture> {
        self.acknowledge("end_exam_attempt")
    }

    fn on_ping(&self) -> Option<HookFuture> {
        self.acknowledge("ping")
    }
}

fn logging_backend_factory() -> HandlerFactory {
    Arc::new(|options: Value| {
        Box::new(LoggingBackend::from_options(&options)) as Box<dyn BackendHandler>
    })
}
