//! Message contract between the exam page and an isolated proctoring worker,
//! plus the runtimes that host such workers.

pub mod error;
pub mod handler;
pub mod messages;
pub mod round_trip;
pub mod runtime;
mod transport;

pub use error::WorkerError;
pub use handler::{
    BackendHandler, HandlerFactory, HookFuture, HookResult, serve_io_worker, serve_stdio_worker,
    serve_worker,
};
pub use messages::{
    END_EXAM_ATTEMPT_EVENTS, EventNamePair, HostMessage, MessageType, PING_EVENTS,
    START_EXAM_ATTEMPT_EVENTS, WorkerMessage,
};
pub use round_trip::{RoundTripOptions, round_trip};
pub use runtime::{
    InProcessWorkerRuntime, ProcessWorkerRuntime, SharedWorkerRuntime, WorkerPort, WorkerRuntime,
};
