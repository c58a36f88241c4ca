use std::time::Duration;

use serde_json::Value;

use crate::error::WorkerError;
use crate::messages::{EventNamePair, HostMessage, MessageType};
use crate::runtime::{WorkerPort, WorkerRuntime};

#[derive(Debug, Clone, Default)]
pub struct RoundTripOptions {
    /// Bound on the wait for the response. Unset waits indefinitely.
    pub timeout: Option<Duration>,
    /// Sent as a `config` message ahead of the prompt.
    pub config: Option<Value>,
}

/// Runs one prompt/response exchange in a fresh worker.
///
/// Spawns a worker from `entry_point`, posts `{type: events.prompt}` and
/// resolves on the first inbound message of type `events.response`. Other
/// message types are ignored. The worker is terminated before returning,
/// whatever the outcome.
pub async fn round_trip(
    runtime: &dyn WorkerRuntime,
    entry_point: &str,
    events: EventNamePair,
    options: &RoundTripOptions,
) -> Result<(), WorkerError> {
    let prompt = HostMessage::prompt(events.prompt).ok_or(WorkerError::InvalidPrompt {
        message_type: events.prompt,
    })?;

    let mut port = runtime.spawn(entry_point)?;
    tracing::debug!(entry_point, prompt = %events.prompt, "worker round trip started");
    if let Some(config) = &options.config {
        port.send(HostMessage::Config {
            options: config.clone(),
        })
        .await?;
    }
    port.send(prompt).await?;

    let result = match options.timeout {
        Some(limit) => tokio::time::timeout(limit, await_response(&mut port, events.response))
            .await
            .unwrap_or(Err(WorkerError::TimedOut {
                awaiting: events.response,
            })),
        None => await_response(&mut port, events.response).await,
    };

    port.terminate();
    result
}

async fn await_response(port: &mut WorkerPort, expected: MessageType) -> Result<(), WorkerError> {
    while let Some(message) = port.recv().await {
        if message.message_type() == Some(expected) {
            tracing::debug!(response = %expected, "worker acknowledged");
            return Ok(());
        }
        tracing::debug!(?message, expected = %expected, "ignoring unrelated worker message");
    }
    Err(WorkerError::Disconnected { awaiting: expected })
}
