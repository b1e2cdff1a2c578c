use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::grading::grade;
use crate::model::exam::Exam;
use crate::model::ids::{AttemptId, ExamId, QuestionId};
use crate::model::question::{Answer, AnswerShape};
use crate::model::result::ExamResult;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    /// A result already exists for this user and exam.
    #[error("exam has already been attempted")]
    AlreadyAttempted,

    /// A mutation was attempted after the attempt reached a terminal state.
    #[error("attempt is closed")]
    SessionClosed,

    /// A mutation was attempted at or after the deadline; submit instead.
    #[error("attempt deadline has passed")]
    DeadlineExceeded,

    #[error("attempt has already been submitted")]
    AlreadySubmitted,

    #[error("answer for question {question_id} must be {expected}")]
    InvalidAnswerShape {
        question_id: QuestionId,
        expected: AnswerShape,
    },

    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),

    #[error("attempt belongs to exam {expected}, not {actual}")]
    ExamMismatch { expected: ExamId, actual: ExamId },
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of an attempt. Transitions only leave `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Expired,
}

impl AttemptStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ATTEMPT STATE ─────────────────────────────────────────────────────────────
//

/// Mutable state of one timed attempt at one exam.
///
/// Every operation takes the current instant from the caller so the state
/// machine stays deterministic; the services layer supplies it from a `Clock`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptState {
    attempt_id: AttemptId,
    exam_id: ExamId,
    answers: BTreeMap<QuestionId, Answer>,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    status: AttemptStatus,
    finished_at: Option<DateTime<Utc>>,
}

impl AttemptState {
    /// Start a new attempt at `now`.
    ///
    /// `prior_result_exists` must come from the result store; it is asserted
    /// here again even if the caller already checked it.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadyAttempted` if a prior result exists.
    pub fn start(
        exam: &Exam,
        prior_result_exists: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        if prior_result_exists {
            return Err(AttemptError::AlreadyAttempted);
        }

        Ok(Self {
            attempt_id: AttemptId::generate(),
            exam_id: exam.id().clone(),
            answers: BTreeMap::new(),
            started_at: now,
            deadline: now + exam.duration(),
            status: AttemptStatus::InProgress,
            finished_at: None,
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn exam_id(&self) -> &ExamId {
        &self.exam_id
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Answer> {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, question_id: &QuestionId) -> Option<&Answer> {
        self.answers.get(question_id)
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.deadline - now).max(chrono::Duration::zero())
    }

    /// Record or overwrite the answer to one question.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` after a terminal transition, `DeadlineExceeded` at
    /// or after the deadline, `UnknownQuestion` for an id outside the exam and
    /// `InvalidAnswerShape` when the value does not fit the question kind or is empty.
    pub fn answer_question(
        &mut self,
        exam: &Exam,
        question_id: &QuestionId,
        value: Answer,
        now: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        self.ensure_mutable(exam, now)?;

        let question = exam
            .question(question_id)
            .ok_or_else(|| AttemptError::UnknownQuestion(question_id.clone()))?;
        if !question.kind().accepts(&value) || value.is_empty() {
            return Err(AttemptError::InvalidAnswerShape {
                question_id: question_id.clone(),
                expected: question.kind().expected_shape(),
            });
        }

        self.answers.insert(question_id.clone(), value);
        Ok(())
    }

    /// Remove the answer to one question, if any.
    ///
    /// # Errors
    ///
    /// Same failure modes as `answer_question`, minus the shape check.
    pub fn clear_answer(
        &mut self,
        exam: &Exam,
        question_id: &QuestionId,
        now: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        self.ensure_mutable(exam, now)?;

        if exam.question(question_id).is_none() {
            return Err(AttemptError::UnknownQuestion(question_id.clone()));
        }
        self.answers.remove(question_id);
        Ok(())
    }

    /// Grade the attempt and freeze it.
    ///
    /// Status becomes `Expired` when `now` is at or past the deadline and
    /// `Submitted` otherwise. Time taken is capped at the exam duration.
    ///
    /// # Errors
    ///
    /// Returns `AlreadySubmitted` if the attempt is already terminal; the
    /// earlier result is left untouched. Returns `ExamMismatch` if `exam` is
    /// not the exam this attempt was started for.
    pub fn submit(&mut self, exam: &Exam, now: DateTime<Utc>) -> Result<ExamResult, AttemptError> {
        if self.status.is_terminal() {
            return Err(AttemptError::AlreadySubmitted);
        }
        self.ensure_exam(exam)?;

        let status = if self.is_expired_at(now) {
            AttemptStatus::Expired
        } else {
            AttemptStatus::Submitted
        };
        let effective_end = now.min(self.deadline).max(self.started_at);
        let time_taken_seconds =
            u64::try_from((effective_end - self.started_at).num_seconds()).unwrap_or(0);

        let breakdown = grade(exam.questions(), &self.answers);

        self.status = status;
        self.finished_at = Some(now);

        Ok(ExamResult::from_breakdown(
            self.attempt_id,
            self.exam_id.clone(),
            status,
            self.started_at,
            now.max(self.started_at),
            time_taken_seconds,
            breakdown,
            self.answers.clone(),
        ))
    }

    fn ensure_exam(&self, exam: &Exam) -> Result<(), AttemptError> {
        if exam.id() == &self.exam_id {
            Ok(())
        } else {
            Err(AttemptError::ExamMismatch {
                expected: self.exam_id.clone(),
                actual: exam.id().clone(),
            })
        }
    }

    fn ensure_mutable(&self, exam: &Exam, now: DateTime<Utc>) -> Result<(), AttemptError> {
        if self.status.is_terminal() {
            return Err(AttemptError::SessionClosed);
        }
        if self.is_expired_at(now) {
            return Err(AttemptError::DeadlineExceeded);
        }
        self.ensure_exam(exam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExamDraft, QuestionDraft, QuestionKind, Subject};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn exam() -> Exam {
        let single = |id: &str, correct: &str| QuestionDraft {
            id: id.into(),
            kind: QuestionKind::SingleChoice,
            prompt: String::new(),
            options: vec!["A".into(), "B".into(), "C".into()],
            correct_answer: Answer::single(correct),
            marks: 4.0,
            negative_marks: 1.0,
            subject: Subject::new("maths"),
        };
        ExamDraft {
            id: "e1".into(),
            title: "Mock".into(),
            duration_seconds: 600,
            questions: vec![single("q1", "A"), single("q2", "B"), single("q3", "C")],
            total_questions: Some(3),
            total_marks: Some(12.0),
        }
        .validate()
        .unwrap()
    }

    fn qid(id: &str) -> QuestionId {
        QuestionId::new(id).unwrap()
    }

    #[test]
    fn start_sets_deadline_and_status() {
        let exam = exam();
        let state = AttemptState::start(&exam, false, fixed_now()).unwrap();
        assert_eq!(state.status(), AttemptStatus::InProgress);
        assert_eq!(state.deadline(), fixed_now() + Duration::seconds(600));
        assert!(state.answers().is_empty());
    }

    #[test]
    fn longest_accepted_duration_starts_cleanly() {
        let exam = Exam::new(
            ExamId::new("long").unwrap(),
            "Long",
            crate::model::MAX_DURATION_SECONDS,
            exam().questions().to_vec(),
        )
        .unwrap();
        let state = AttemptState::start(&exam, false, fixed_now()).unwrap();
        assert_eq!(state.deadline(), fixed_now() + Duration::days(365));
        assert_eq!(state.remaining_at(fixed_now()), Duration::days(365));
    }

    #[test]
    fn start_refuses_prior_result() {
        let err = AttemptState::start(&exam(), true, fixed_now()).unwrap_err();
        assert_eq!(err, AttemptError::AlreadyAttempted);
    }

    #[test]
    fn answers_can_be_overwritten_and_cleared() {
        let exam = exam();
        let now = fixed_now();
        let mut state = AttemptState::start(&exam, false, now).unwrap();

        state
            .answer_question(&exam, &qid("q1"), Answer::single("B"), now)
            .unwrap();
        state
            .answer_question(&exam, &qid("q1"), Answer::single("A"), now)
            .unwrap();
        assert_eq!(state.answer(&qid("q1")), Some(&Answer::single("A")));

        state.clear_answer(&exam, &qid("q1"), now).unwrap();
        assert!(state.answer(&qid("q1")).is_none());
        // clearing again is a no-op
        state.clear_answer(&exam, &qid("q1"), now).unwrap();
    }

    #[test]
    fn wrong_shape_and_unknown_question_are_rejected() {
        let exam = exam();
        let now = fixed_now();
        let mut state = AttemptState::start(&exam, false, now).unwrap();

        let err = state
            .answer_question(&exam, &qid("q1"), Answer::multiple(["A"]), now)
            .unwrap_err();
        assert!(matches!(err, AttemptError::InvalidAnswerShape { .. }));

        let err = state
            .answer_question(&exam, &qid("q1"), Answer::single("  "), now)
            .unwrap_err();
        assert!(matches!(err, AttemptError::InvalidAnswerShape { .. }));

        let err = state
            .answer_question(&exam, &qid("q9"), Answer::single("A"), now)
            .unwrap_err();
        assert_eq!(err, AttemptError::UnknownQuestion(qid("q9")));
    }

    #[test]
    fn mutation_at_deadline_fails() {
        let exam = exam();
        let now = fixed_now();
        let mut state = AttemptState::start(&exam, false, now).unwrap();
        state
            .answer_question(&exam, &qid("q1"), Answer::single("A"), now)
            .unwrap();

        let at_deadline = state.deadline();
        let err = state
            .answer_question(&exam, &qid("q2"), Answer::single("B"), at_deadline)
            .unwrap_err();
        assert_eq!(err, AttemptError::DeadlineExceeded);
        let err = state.clear_answer(&exam, &qid("q1"), at_deadline).unwrap_err();
        assert_eq!(err, AttemptError::DeadlineExceeded);
    }

    #[test]
    fn scenario_mixed_answers() {
        let exam = exam();
        let now = fixed_now();
        let mut state = AttemptState::start(&exam, false, now).unwrap();
        state
            .answer_question(&exam, &qid("q1"), Answer::single("A"), now)
            .unwrap();
        state
            .answer_question(&exam, &qid("q2"), Answer::single("X"), now)
            .unwrap();

        let result = state.submit(&exam, now + Duration::seconds(125)).unwrap();
        assert_eq!(result.correct_answers(), 1);
        assert_eq!(result.wrong_answers(), 1);
        assert_eq!(result.unattempted(), 1);
        assert!((result.obtained_marks() - 3.0).abs() < f64::EPSILON);
        assert!((result.total_marks() - 12.0).abs() < f64::EPSILON);
        assert!((result.percentage() - 25.0).abs() < f64::EPSILON);
        assert_eq!(result.time_taken_seconds(), 125);
        assert_eq!(result.status(), AttemptStatus::Submitted);
        assert_eq!(state.status(), AttemptStatus::Submitted);
    }

    #[test]
    fn submit_at_deadline_is_expired() {
        let exam = exam();
        let mut state = AttemptState::start(&exam, false, fixed_now()).unwrap();
        let result = state.submit(&exam, state.deadline()).unwrap();
        assert_eq!(result.status(), AttemptStatus::Expired);
        assert_eq!(result.time_taken_seconds(), exam.duration_seconds());
        assert_eq!(state.status(), AttemptStatus::Expired);
    }

    #[test]
    fn late_submit_caps_time_taken() {
        let exam = exam();
        let mut state = AttemptState::start(&exam, false, fixed_now()).unwrap();
        let result = state
            .submit(&exam, state.deadline() + Duration::minutes(5))
            .unwrap();
        assert_eq!(result.time_taken_seconds(), 600);
    }

    #[test]
    fn second_submit_fails_and_keeps_first_result() {
        let exam = exam();
        let now = fixed_now();
        let mut state = AttemptState::start(&exam, false, now).unwrap();
        state
            .answer_question(&exam, &qid("q1"), Answer::single("A"), now)
            .unwrap();
        let first = state.submit(&exam, now).unwrap();
        let snapshot = first.clone();

        let err = state.submit(&exam, now).unwrap_err();
        assert_eq!(err, AttemptError::AlreadySubmitted);
        assert_eq!(first, snapshot);
        assert_eq!(state.status(), AttemptStatus::Submitted);
    }

    #[test]
    fn mutations_after_submit_are_closed() {
        let exam = exam();
        let now = fixed_now();
        let mut state = AttemptState::start(&exam, false, now).unwrap();
        state.submit(&exam, now).unwrap();

        let err = state
            .answer_question(&exam, &qid("q1"), Answer::single("A"), now)
            .unwrap_err();
        assert_eq!(err, AttemptError::SessionClosed);
        let err = state.clear_answer(&exam, &qid("q1"), now).unwrap_err();
        assert_eq!(err, AttemptError::SessionClosed);
    }

    #[test]
    fn closed_wins_over_deadline() {
        let exam = exam();
        let mut state = AttemptState::start(&exam, false, fixed_now()).unwrap();
        let late = state.deadline() + Duration::seconds(1);
        state.submit(&exam, late).unwrap();
        let err = state
            .answer_question(&exam, &qid("q1"), Answer::single("A"), late)
            .unwrap_err();
        assert_eq!(err, AttemptError::SessionClosed);
    }

    #[test]
    fn submit_with_other_exam_is_rejected() {
        let exam = exam();
        let mut state = AttemptState::start(&exam, false, fixed_now()).unwrap();
        let mut other = exam.summary();
        other.id = ExamId::new("e2").unwrap();
        let other_exam = Exam::new(other.id, "Other", 60, exam.questions().to_vec()).unwrap();
        let err = state.submit(&other_exam, fixed_now()).unwrap_err();
        assert!(matches!(err, AttemptError::ExamMismatch { .. }));
        assert_eq!(state.status(), AttemptStatus::InProgress);
    }
}
