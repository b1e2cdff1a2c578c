use chrono::Duration;
use exam_core::model::AttemptStatus;

/// Aggregated view of attempt progress, useful for a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub unanswered: usize,
    pub time_remaining: Duration,
    pub status: AttemptStatus,
}

/// Final state of a session as broadcast to waiters.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Pending,
    Finished(exam_core::model::ExamResult),
    Abandoned,
}

impl SessionOutcome {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}
