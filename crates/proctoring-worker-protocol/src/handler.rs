//! Worker-side dispatch: the counterpart loaded into the isolated context.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::messages::{HostMessage, WorkerMessage};
use crate::transport::{CHANNEL_CAPACITY, pump_lines_in, pump_lines_out};

pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
pub type HookFuture = BoxFuture<'static, HookResult>;

/// Proctoring backend hooks. A hook returning `None` is not implemented,
/// and the matching prompt never gets a response.
pub trait BackendHandler: Send + Sync {
    fn on_start_exam_attempt(&self) -> Option<HookFuture> {
        None
    }

    fn on_end_exam_attempt(&self) -> Option<HookFuture> {
        None
    }

    fn on_ping(&self) -> Option<HookFuture> {
        None
    }
}

/// Builds a handler from the options carried by a `config` message.
pub type HandlerFactory = Arc<dyn Fn(Value) -> Box<dyn BackendHandler> + Send + Sync>;

/// Runs the dispatch loop until the host side of `inbox` closes.
///
/// Hooks run concurrently with later prompts; a `config` message swaps the
/// active handler without affecting hooks already in flight. Hooks still
/// running when the loop exits are aborted along with the context.
pub async fn serve_worker(
    factory: HandlerFactory,
    mut inbox: mpsc::Receiver<HostMessage>,
    outbox: mpsc::Sender<WorkerMessage>,
) {
    let mut handler = factory(json!({}));
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            message = inbox.recv() => {
                let Some(message) = message else {
                    break;
                };
                let (hook, response) = match message {
                    HostMessage::Config { options } => {
                        handler = factory(options);
                        tracing::debug!("worker handler reconfigured");
                        continue;
                    }
                    HostMessage::StartExamAttempt => {
                        (handler.on_start_exam_attempt(), WorkerMessage::ExamAttemptStarted)
                    }
                    HostMessage::EndExamAttempt => {
                        (handler.on_end_exam_attempt(), WorkerMessage::ExamAttemptEnded)
                    }
                    HostMessage::Ping => (handler.on_ping(), WorkerMessage::Echo),
                    HostMessage::Unknown => {
                        tracing::debug!("worker ignoring unknown message type");
                        continue;
                    }
                };
                let Some(hook) = hook else {
                    tracing::debug!(?response, "worker hook not implemented");
                    continue;
                };
                let outbox = outbox.clone();
                in_flight.spawn(async move {
                    match hook.await {
                        Ok(()) => {
                            let _ = outbox.send(response).await;
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, ?response, "worker hook failed");
                        }
                    }
                });
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }
}

/// Serves a worker over newline-delimited JSON on arbitrary IO.
pub async fn serve_io_worker<R, W>(factory: HandlerFactory, reader: R, writer: W)
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (inbox_tx, inbox_rx) = mpsc::channel::<HostMessage>(CHANNEL_CAPACITY);
    let (outbox_tx, outbox_rx) = mpsc::channel::<WorkerMessage>(CHANNEL_CAPACITY);

    let reader_task = tokio::spawn(pump_lines_in(reader, inbox_tx));
    let writer_task = tokio::spawn(pump_lines_out(outbox_rx, writer));

    serve_worker(factory, inbox_rx, outbox_tx).await;

    reader_task.abort();
    let _ = writer_task.await;
}

/// Serves a worker on the process's stdin/stdout, for subprocess entry points.
pub async fn serve_stdio_worker(factory: HandlerFactory) {
    serve_io_worker(factory, tokio::io::stdin(), tokio::io::stdout()).await;
}
