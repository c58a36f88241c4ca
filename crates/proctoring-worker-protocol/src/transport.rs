//! Newline-delimited JSON framing shared by the subprocess runtime (host
//! side) and the stdio worker (worker side).

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

pub(crate) const CHANNEL_CAPACITY: usize = 32;

/// Reads one JSON message per line into `tx` until EOF or the receiver goes away.
pub(crate) async fn pump_lines_in<R, T>(reader: R, tx: mpsc::Sender<T>)
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "worker channel read failed");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let message = match serde_json::from_str::<T>(trimmed) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, line = %trimmed, "worker message parse failed");
                continue;
            }
        };
        if tx.send(message).await.is_err() {
            break;
        }
    }
}

/// Writes each message from `rx` as a JSON line until the channel closes.
pub(crate) async fn pump_lines_out<W, T>(mut rx: mpsc::Receiver<T>, mut writer: W)
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    while let Some(message) = rx.recv().await {
        let mut payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "worker message encode failed");
                continue;
            }
        };
        payload.push('\n');
        if let Err(err) = writer.write_all(payload.as_bytes()).await {
            tracing::warn!(error = %err, "worker channel write failed");
            break;
        }
        if let Err(err) = writer.flush().await {
            tracing::warn!(error = %err, "worker channel flush failed");
            break;
        }
    }
}
