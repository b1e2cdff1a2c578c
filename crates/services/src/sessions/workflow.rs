use std::sync::Arc;

use exam_core::model::{Answer, AttemptError, ExamId, ExamResult, ExamSummary, QuestionId, UserId};
use storage::repository::{ExamCatalog, ResultRepository, Storage, StorageError};

use super::service::ExamSession;
use crate::Clock;
use crate::error::SessionError;

/// Outcome of answering through the workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Recorded,
    /// The deadline had passed; the attempt was submitted and persisted instead.
    Expired(ExamResult),
}

/// Orchestrates exam start, answering, submission and persistence.
#[derive(Clone)]
pub struct ExamWorkflow {
    clock: Clock,
    exams: Arc<dyn ExamCatalog>,
    results: Arc<dyn ResultRepository>,
}

impl ExamWorkflow {
    #[must_use]
    pub fn new(
        clock: Clock,
        exams: Arc<dyn ExamCatalog>,
        results: Arc<dyn ResultRepository>,
    ) -> Self {
        Self {
            clock,
            exams,
            results,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.exams),
            Arc::clone(&storage.results),
        )
    }

    /// Catalog exams the user has not attempted yet.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the catalog or results cannot be read.
    pub async fn available_exams(&self, user: &UserId) -> Result<Vec<ExamSummary>, SessionError> {
        let exams = self.exams.list_exams().await?;
        let taken = self.results.list_results(user).await?;
        Ok(exams
            .into_iter()
            .filter(|exam| !taken.iter().any(|result| result.exam_id() == &exam.id))
            .collect())
    }

    /// Start a timed attempt.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyAttempted` if the user already has a result, or
    /// `SessionError::Storage` if the exam cannot be loaded.
    pub async fn start_exam(
        &self,
        user: &UserId,
        exam_id: &ExamId,
    ) -> Result<ExamSession, SessionError> {
        let prior = self.results.has_result(user, exam_id).await?;
        if prior {
            tracing::info!(user_id = %user, exam_id = %exam_id, "exam already attempted");
            return Err(AttemptError::AlreadyAttempted.into());
        }
        let exam = self.exams.get_exam(exam_id).await?;
        ExamSession::start(exam, prior, self.clock.clone())
    }

    /// Forward an answer to the session.
    ///
    /// When the deadline has passed the session is submitted as expired and
    /// persisted; the result is returned as `AnswerOutcome::Expired`.
    ///
    /// # Errors
    ///
    /// Returns the session error for any other rejection, or a storage error
    /// if persisting the expired result fails.
    pub async fn answer(
        &self,
        user: &UserId,
        session: &ExamSession,
        question_id: &QuestionId,
        value: Answer,
    ) -> Result<AnswerOutcome, SessionError> {
        match session.answer_question(question_id, value) {
            Ok(()) => Ok(AnswerOutcome::Recorded),
            Err(err) if err.is_deadline_exceeded() => {
                let result = submit_or_take_timer_result(session).await?;
                self.persist(user, &result).await?;
                Ok(AnswerOutcome::Expired(result))
            }
            Err(err) => Err(err),
        }
    }

    /// Submit the attempt and persist its result.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyAttempted` (after abandoning the session) if a result
    /// was stored in the meantime, the session's submit error, or a storage
    /// error if persisting fails. A failed persist can be retried with
    /// `persist` using `session.result()`.
    pub async fn submit(
        &self,
        user: &UserId,
        session: &ExamSession,
    ) -> Result<ExamResult, SessionError> {
        if self.results.has_result(user, session.exam().id()).await? {
            session.abandon()?;
            tracing::warn!(
                user_id = %user,
                exam_id = %session.exam().id(),
                "result appeared during attempt, session abandoned"
            );
            return Err(AttemptError::AlreadyAttempted.into());
        }
        let result = submit_or_take_timer_result(session).await?;
        self.persist(user, &result).await?;
        Ok(result)
    }

    /// Store a finished result. Re-sending the same result is accepted.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyAttempted` if a different attempt is already stored,
    /// or other storage errors.
    pub async fn persist(&self, user: &UserId, result: &ExamResult) -> Result<(), SessionError> {
        match self.results.record_result(user, result).await {
            Ok(()) => {
                tracing::info!(
                    user_id = %user,
                    exam_id = %result.exam_id(),
                    attempt_id = %result.attempt_id(),
                    "result persisted"
                );
                Ok(())
            }
            Err(err) => {
                if matches!(err, StorageError::Conflict) {
                    tracing::warn!(
                        user_id = %user,
                        exam_id = %result.exam_id(),
                        "another attempt is already stored"
                    );
                    return Err(AttemptError::AlreadyAttempted.into());
                }
                tracing::error!(user_id = %user, error = %err, "failed to persist result");
                Err(err.into())
            }
        }
    }

    /// Wait for the session to finish, by timer or manual submit, and persist the result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the session is abandoned,
    /// `AlreadyAttempted` if another attempt was stored first, or a storage
    /// error if persisting fails.
    pub async fn complete_on_deadline(
        &self,
        user: &UserId,
        session: &ExamSession,
    ) -> Result<ExamResult, SessionError> {
        let result = session.finished().await?;
        self.persist(user, &result).await?;
        Ok(result)
    }

    /// Results stored for the user, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the lookup fails.
    pub async fn results(&self, user: &UserId) -> Result<Vec<ExamResult>, SessionError> {
        Ok(self.results.list_results(user).await?)
    }
}

/// Submit now, or hand back the result the deadline timer already produced.
async fn submit_or_take_timer_result(session: &ExamSession) -> Result<ExamResult, SessionError> {
    match session.submit() {
        Ok(result) => Ok(result),
        Err(SessionError::Attempt(AttemptError::AlreadySubmitted)) => session.finished().await,
        Err(err) => Err(err),
    }
}
