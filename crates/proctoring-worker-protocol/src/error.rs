use thiserror::Error;

use crate::messages::MessageType;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker_entry_point_unknown:{entry_point}")]
    UnknownEntryPoint { entry_point: String },
    #[error("worker_spawn_failed:{message}")]
    Spawn { message: String },
    #[error("worker_send_failed:{message_type}")]
    Send { message_type: String },
    #[error("worker_invalid_prompt:{message_type}")]
    InvalidPrompt { message_type: MessageType },
    #[error("worker_disconnected_awaiting:{awaiting}")]
    Disconnected { awaiting: MessageType },
    #[error("worker_timed_out_awaiting:{awaiting}")]
    TimedOut { awaiting: MessageType },
}
