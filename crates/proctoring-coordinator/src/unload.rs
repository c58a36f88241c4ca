//! Page "about to unload" warning shown while a proctored attempt is running.

use std::sync::Mutex;

use proctoring_attempt_client::ActiveExamAttempt;

pub const DEFAULT_UNLOAD_WARNING: &str = "Are you sure you want to leave this page? \
To pass your proctored exam you must also pass the online proctoring session review.";

const COURSEWARE_PATH_SEGMENT: &str = "/courseware/";

/// The three conditions that decide whether leaving the page should warn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExamPageState {
    pub taking_as_proctored: bool,
    pub time_remaining_seconds: i64,
    pub in_courseware: bool,
}

impl ExamPageState {
    #[must_use]
    pub fn from_attempt(attempt: &ActiveExamAttempt, current_path: &str) -> Self {
        Self {
            taking_as_proctored: attempt.taking_as_proctored,
            time_remaining_seconds: attempt.time_remaining_seconds,
            in_courseware: current_path.contains(COURSEWARE_PATH_SEGMENT),
        }
    }

    #[must_use]
    pub fn warrants_warning(&self) -> bool {
        self.taking_as_proctored && self.time_remaining_seconds > 0 && self.in_courseware
    }
}

/// Single page-level registration of the unload warning.
#[derive(Debug)]
pub struct UnloadWarningGate {
    message: String,
    registered: Mutex<Option<String>>,
}

impl Default for UnloadWarningGate {
    fn default() -> Self {
        Self::new(DEFAULT_UNLOAD_WARNING)
    }
}

impl UnloadWarningGate {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            registered: Mutex::new(None),
        }
    }

    /// Attaches or detaches the warning to match `state`. Returns whether
    /// the warning is attached afterwards.
    pub fn evaluate(&self, state: &ExamPageState) -> bool {
        if state.warrants_warning() {
            self.attach();
            true
        } else {
            self.detach();
            false
        }
    }

    fn attach(&self) {
        let mut registered = self.lock();
        if registered.is_none() {
            tracing::debug!("unload warning attached");
            *registered = Some(self.message.clone());
        }
    }

    pub fn detach(&self) {
        if self.lock().take().is_some() {
            tracing::debug!("unload warning detached");
        }
    }

    /// What the page would show when the user tries to leave.
    #[must_use]
    pub fn before_unload(&self) -> Option<String> {
        self.lock().clone()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.registered
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proctored(time_remaining_seconds: i64, in_courseware: bool) -> ExamPageState {
        ExamPageState {
            taking_as_proctored: true,
            time_remaining_seconds,
            in_courseware,
        }
    }

    #[test]
    fn warning_needs_all_three_conditions() {
        let gate = UnloadWarningGate::default();
        assert!(gate.evaluate(&proctored(120, true)));
        assert_eq!(
            gate.before_unload().as_deref(),
            Some(DEFAULT_UNLOAD_WARNING)
        );

        assert!(!gate.evaluate(&proctored(0, true)));
        assert_eq!(gate.before_unload(), None);

        assert!(gate.evaluate(&proctored(5, true)));
        assert!(!gate.evaluate(&proctored(5, false)));
        assert!(!gate.is_attached());

        let timed_only = ExamPageState {
            taking_as_proctored: false,
            ..proctored(5, true)
        };
        assert!(!gate.evaluate(&timed_only));
    }

    #[test]
    fn detach_clears_registration() {
        let gate = UnloadWarningGate::new("Stay here.");
        gate.evaluate(&proctored(60, true));
        assert_eq!(gate.before_unload().as_deref(), Some("Stay here."));
        gate.detach();
        gate.detach();
        assert_eq!(gate.before_unload(), None);
    }

    #[test]
    fn page_state_derives_from_attempt_and_path() {
        let attempt = ActiveExamAttempt {
            attempt_id: Some(7),
            in_timed_exam: true,
            taking_as_proctored: true,
            time_remaining_seconds: 900,
            ..ActiveExamAttempt::default()
        };
        let inside = ExamPageState::from_attempt(
            &attempt,
            "/courses/course-v1:edX+DemoX+Demo/courseware/week1/exam/",
        );
        assert!(inside.warrants_warning());

        let dashboard = ExamPageState::from_attempt(&attempt, "/dashboard");
        assert!(!dashboard.in_courseware);
        assert!(!dashboard.warrants_warning());

        let idle = ExamPageState::from_attempt(&ActiveExamAttempt::default(), "/courseware/x/");
        assert!(!idle.warrants_warning());
    }
}
