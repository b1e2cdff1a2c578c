use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use exam_core::model::{
    Answer, AttemptId, AttemptState, AttemptStatus, Exam, ExamResult, QuestionId,
};
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::progress::{SessionOutcome, SessionProgress};
use super::timer::DeadlineTimer;
use crate::Clock;
use crate::error::SessionError;

//
// ─── SHARED STATE ──────────────────────────────────────────────────────────────
//

struct Guarded {
    attempt: AttemptState,
    timer: Option<DeadlineTimer>,
    result: Option<ExamResult>,
    abandoned: bool,
}

impl Guarded {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.abandoned {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn finish(&mut self, result: &ExamResult, outcome: &watch::Sender<SessionOutcome>) {
        self.result = Some(result.clone());
        outcome.send_replace(SessionOutcome::Finished(result.clone()));
    }
}

struct Shared {
    exam: Exam,
    clock: Clock,
    attempt_id: AttemptId,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    state: Mutex<Guarded>,
    outcome: watch::Sender<SessionOutcome>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, Guarded>, SessionError> {
        self.state.lock().map_err(|_| SessionError::Poisoned)
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// A live, timed attempt at one exam.
///
/// Wraps `AttemptState` behind a mutex and arms a deadline timer on start.
/// When the timer fires the attempt is submitted as expired at the deadline
/// instant. Dropping the session cancels the timer and records nothing.
pub struct ExamSession {
    shared: Arc<Shared>,
}

impl ExamSession {
    /// Start an attempt and arm its deadline timer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Attempt(AlreadyAttempted)` if a prior result
    /// exists, or `SessionError::NoRuntime` outside a Tokio runtime.
    pub fn start(
        exam: Exam,
        prior_result_exists: bool,
        clock: Clock,
    ) -> Result<Self, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let now = clock.now();
        let attempt = AttemptState::start(&exam, prior_result_exists, now)?;
        let delay = attempt
            .remaining_at(now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        let (outcome, _) = watch::channel(SessionOutcome::Pending);
        let shared = Arc::new(Shared {
            attempt_id: attempt.attempt_id(),
            started_at: attempt.started_at(),
            deadline: attempt.deadline(),
            exam,
            clock,
            state: Mutex::new(Guarded {
                attempt,
                timer: None,
                result: None,
                abandoned: false,
            }),
            outcome,
        });

        {
            let weak = Arc::downgrade(&shared);
            let mut guard = shared.lock()?;
            guard.timer = Some(DeadlineTimer::arm(&runtime, delay, move || {
                submit_at_deadline(&weak);
            }));
        }

        tracing::info!(
            attempt_id = %shared.attempt_id,
            exam_id = %shared.exam.id(),
            deadline = %shared.deadline,
            "exam session started"
        );
        Ok(Self { shared })
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.shared.attempt_id
    }

    #[must_use]
    pub fn exam(&self) -> &Exam {
        &self.shared.exam
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.shared.started_at
    }

    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.shared.deadline
    }

    /// Record or overwrite an answer.
    ///
    /// # Errors
    ///
    /// Returns the attempt error (`SessionClosed`, `DeadlineExceeded`,
    /// `UnknownQuestion`, `InvalidAnswerShape`), or `SessionError::Closed`
    /// after `abandon`.
    pub fn answer_question(
        &self,
        question_id: &QuestionId,
        value: Answer,
    ) -> Result<(), SessionError> {
        let mut guard = self.shared.lock()?;
        guard.ensure_open()?;
        let now = self.shared.clock.now();
        guard
            .attempt
            .answer_question(&self.shared.exam, question_id, value, now)
            .inspect_err(|err| {
                tracing::debug!(
                    attempt_id = %self.shared.attempt_id,
                    question_id = %question_id,
                    error = %err,
                    "answer rejected"
                );
            })?;
        Ok(())
    }

    /// Remove an answer if present.
    ///
    /// # Errors
    ///
    /// Same as `answer_question`, minus the shape check.
    pub fn clear_answer(&self, question_id: &QuestionId) -> Result<(), SessionError> {
        let mut guard = self.shared.lock()?;
        guard.ensure_open()?;
        let now = self.shared.clock.now();
        guard
            .attempt
            .clear_answer(&self.shared.exam, question_id, now)?;
        Ok(())
    }

    /// Grade and freeze the attempt, cancelling the deadline timer.
    ///
    /// # Errors
    ///
    /// Returns `AlreadySubmitted` if the attempt already finished (including
    /// by the timer), or `SessionError::Closed` after `abandon`.
    pub fn submit(&self) -> Result<ExamResult, SessionError> {
        let mut guard = self.shared.lock()?;
        guard.ensure_open()?;
        let now = self.shared.clock.now();
        let result = guard.attempt.submit(&self.shared.exam, now)?;
        if let Some(timer) = guard.timer.take() {
            timer.disarm();
        }
        guard.finish(&result, &self.shared.outcome);

        tracing::info!(
            attempt_id = %self.shared.attempt_id,
            status = %result.status(),
            obtained_marks = result.obtained_marks(),
            "exam submitted"
        );
        Ok(result)
    }

    /// Cancel the attempt without producing a result.
    ///
    /// A no-op once the attempt is finished or already abandoned.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the state lock is poisoned.
    pub fn abandon(&self) -> Result<(), SessionError> {
        let mut guard = self.shared.lock()?;
        abandon_locked(&mut guard, &self.shared);
        Ok(())
    }

    /// Result receipt, once the attempt has finished.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the state lock is poisoned.
    pub fn result(&self) -> Result<Option<ExamResult>, SessionError> {
        Ok(self.shared.lock()?.result.clone())
    }

    /// Current status of the underlying attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the state lock is poisoned.
    pub fn status(&self) -> Result<AttemptStatus, SessionError> {
        Ok(self.shared.lock()?.attempt.status())
    }

    /// The answer currently recorded for a question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the state lock is poisoned.
    pub fn answer(&self, question_id: &QuestionId) -> Result<Option<Answer>, SessionError> {
        Ok(self.shared.lock()?.attempt.answer(question_id).cloned())
    }

    /// Time left before the deadline, zero once finished.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the state lock is poisoned.
    pub fn remaining(&self) -> Result<Duration, SessionError> {
        let guard = self.shared.lock()?;
        if guard.attempt.status().is_terminal() || guard.abandoned {
            return Ok(Duration::zero());
        }
        Ok(guard.attempt.remaining_at(self.shared.clock.now()))
    }

    /// Answered and unanswered counts plus time left.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Poisoned` if the state lock is poisoned.
    pub fn progress(&self) -> Result<SessionProgress, SessionError> {
        let time_remaining = self.remaining()?;
        let guard = self.shared.lock()?;
        let total = self.shared.exam.total_questions();
        let answered = guard.attempt.answers().len();
        Ok(SessionProgress {
            total,
            answered,
            unanswered: total.saturating_sub(answered),
            time_remaining,
            status: guard.attempt.status(),
        })
    }

    /// Watch the session outcome.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionOutcome> {
        self.shared.outcome.subscribe()
    }

    /// Resolve once the attempt finishes, by manual submit or by the timer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the session is abandoned instead.
    pub async fn finished(&self) -> Result<ExamResult, SessionError> {
        let mut rx = self.shared.outcome.subscribe();
        let outcome = rx
            .wait_for(|outcome| !outcome.is_pending())
            .await
            .map_err(|_| SessionError::Closed)?;
        match &*outcome {
            SessionOutcome::Finished(result) => Ok(result.clone()),
            _ => Err(SessionError::Closed),
        }
    }
}

impl Drop for ExamSession {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.shared.state.lock() {
            abandon_locked(&mut guard, &self.shared);
        }
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("attempt_id", &self.shared.attempt_id)
            .field("exam_id", self.shared.exam.id())
            .field("deadline", &self.shared.deadline)
            .finish_non_exhaustive()
    }
}

fn abandon_locked(guard: &mut Guarded, shared: &Shared) {
    if guard.abandoned || guard.attempt.status().is_terminal() {
        return;
    }
    guard.abandoned = true;
    if let Some(timer) = guard.timer.take() {
        timer.disarm();
    }
    shared.outcome.send_replace(SessionOutcome::Abandoned);
    tracing::info!(attempt_id = %shared.attempt_id, "exam session abandoned");
}

fn submit_at_deadline(weak: &Weak<Shared>) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let Ok(mut guard) = shared.state.lock() else {
        tracing::error!(attempt_id = %shared.attempt_id, "deadline fired on poisoned session");
        return;
    };
    if let Some(timer) = guard.timer.take() {
        timer.detach();
    }
    if guard.abandoned || guard.attempt.status().is_terminal() {
        return;
    }

    // The tokio timer and the session clock may disagree; never grade before the deadline.
    let now = shared.clock.now().max(shared.deadline);
    match guard.attempt.submit(&shared.exam, now) {
        Ok(result) => {
            guard.finish(&result, &shared.outcome);
            tracing::info!(
                attempt_id = %shared.attempt_id,
                status = %result.status(),
                obtained_marks = result.obtained_marks(),
                "deadline reached, exam submitted"
            );
        }
        Err(err) => {
            tracing::warn!(attempt_id = %shared.attempt_id, error = %err, "deadline submit failed");
        }
    }
}
