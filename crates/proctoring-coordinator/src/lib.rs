//! Coordinates the proctored-exam attempt lifecycle: worker handoff,
//! attempt status update and page transition, in that action-dependent order.

pub mod config;
pub mod coordinator;
pub mod unload;

pub use config::{ConfigError, CoordinatorConfig, DEFAULT_WORKER_PING_TIMEOUT_MS};
pub use coordinator::{
    ActionOutcome, AttemptActionCoordinator, CoordinatorError, PageTransition, event_names_for,
};
pub use proctoring_attempt_client::{Action, ActiveExamAttempt};
pub use unload::{DEFAULT_UNLOAD_WARNING, ExamPageState, UnloadWarningGate};
