use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::grading::{ScoreBreakdown, SubjectScore, percentage};
use crate::model::attempt::AttemptStatus;
use crate::model::ids::{AttemptId, ExamId, QuestionId};
use crate::model::question::{Answer, Subject};

const PERCENTAGE_EPSILON: f64 = 1e-6;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("submitted_at is before started_at")]
    InvalidTimeRange,

    #[error("a result must record a terminal status, got {0}")]
    NotTerminal(AttemptStatus),

    #[error("question counts ({sum}) do not add up to total questions ({total})")]
    CountMismatch { total: usize, sum: usize },

    #[error("percentage {stated} does not match obtained/total marks ({expected})")]
    PercentageMismatch { stated: f64, expected: f64 },
}

/// Persisted shape of a result, validated into an `ExamResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub attempt_id: AttemptId,
    pub exam_id: ExamId,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub total_questions: usize,
    pub correct_answers: usize,
    pub wrong_answers: usize,
    pub unattempted: usize,
    pub total_marks: f64,
    pub obtained_marks: f64,
    pub percentage: f64,
    pub time_taken_seconds: u64,
    #[serde(default)]
    pub subject_wise_score: BTreeMap<Subject, SubjectScore>,
    #[serde(default)]
    pub answers: BTreeMap<QuestionId, Answer>,
}

/// Final, immutable outcome of one attempt.
///
/// Produced once by `AttemptState::submit` and handed to the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ResultRecord")]
pub struct ExamResult {
    attempt_id: AttemptId,
    exam_id: ExamId,
    status: AttemptStatus,
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    total_questions: usize,
    correct_answers: usize,
    wrong_answers: usize,
    unattempted: usize,
    total_marks: f64,
    obtained_marks: f64,
    percentage: f64,
    time_taken_seconds: u64,
    subject_wise_score: BTreeMap<Subject, SubjectScore>,
    answers: BTreeMap<QuestionId, Answer>,
}

impl ExamResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_breakdown(
        attempt_id: AttemptId,
        exam_id: ExamId,
        status: AttemptStatus,
        started_at: DateTime<Utc>,
        submitted_at: DateTime<Utc>,
        time_taken_seconds: u64,
        breakdown: ScoreBreakdown,
        answers: BTreeMap<QuestionId, Answer>,
    ) -> Self {
        let percentage = breakdown.percentage();
        Self {
            attempt_id,
            exam_id,
            status,
            started_at,
            submitted_at,
            total_questions: breakdown.total_questions,
            correct_answers: breakdown.correct,
            wrong_answers: breakdown.wrong,
            unattempted: breakdown.unattempted,
            total_marks: breakdown.total_marks,
            obtained_marks: breakdown.obtained_marks,
            percentage,
            time_taken_seconds,
            subject_wise_score: breakdown.subject_wise,
            answers,
        }
    }

    /// Rehydrate a result from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if the record breaks a result invariant.
    pub fn from_persisted(record: ResultRecord) -> Result<Self, ResultError> {
        if record.submitted_at < record.started_at {
            return Err(ResultError::InvalidTimeRange);
        }
        if !record.status.is_terminal() {
            return Err(ResultError::NotTerminal(record.status));
        }
        let sum = record.correct_answers + record.wrong_answers + record.unattempted;
        if sum != record.total_questions {
            return Err(ResultError::CountMismatch {
                total: record.total_questions,
                sum,
            });
        }
        let expected = percentage(record.obtained_marks, record.total_marks);
        if (expected - record.percentage).abs() > PERCENTAGE_EPSILON {
            return Err(ResultError::PercentageMismatch {
                stated: record.percentage,
                expected,
            });
        }

        Ok(Self {
            attempt_id: record.attempt_id,
            exam_id: record.exam_id,
            status: record.status,
            started_at: record.started_at,
            submitted_at: record.submitted_at,
            total_questions: record.total_questions,
            correct_answers: record.correct_answers,
            wrong_answers: record.wrong_answers,
            unattempted: record.unattempted,
            total_marks: record.total_marks,
            obtained_marks: record.obtained_marks,
            percentage: record.percentage,
            time_taken_seconds: record.time_taken_seconds,
            subject_wise_score: record.subject_wise_score,
            answers: record.answers,
        })
    }

    /// Flatten into the persisted shape.
    #[must_use]
    pub fn to_record(&self) -> ResultRecord {
        ResultRecord {
            attempt_id: self.attempt_id,
            exam_id: self.exam_id.clone(),
            status: self.status,
            started_at: self.started_at,
            submitted_at: self.submitted_at,
            total_questions: self.total_questions,
            correct_answers: self.correct_answers,
            wrong_answers: self.wrong_answers,
            unattempted: self.unattempted,
            total_marks: self.total_marks,
            obtained_marks: self.obtained_marks,
            percentage: self.percentage,
            time_taken_seconds: self.time_taken_seconds,
            subject_wise_score: self.subject_wise_score.clone(),
            answers: self.answers.clone(),
        }
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn exam_id(&self) -> &ExamId {
        &self.exam_id
    }

    /// `Submitted` or `Expired`; informational only, scoring is identical.
    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.total_questions
    }

    #[must_use]
    pub fn correct_answers(&self) -> usize {
        self.correct_answers
    }

    #[must_use]
    pub fn wrong_answers(&self) -> usize {
        self.wrong_answers
    }

    #[must_use]
    pub fn unattempted(&self) -> usize {
        self.unattempted
    }

    #[must_use]
    pub fn total_marks(&self) -> f64 {
        self.total_marks
    }

    #[must_use]
    pub fn obtained_marks(&self) -> f64 {
        self.obtained_marks
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    #[must_use]
    pub fn time_taken_seconds(&self) -> u64 {
        self.time_taken_seconds
    }

    #[must_use]
    pub fn subject_wise_score(&self) -> &BTreeMap<Subject, SubjectScore> {
        &self.subject_wise_score
    }

    /// Answers as they stood when the attempt was finalized.
    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Answer> {
        &self.answers
    }
}

impl TryFrom<ResultRecord> for ExamResult {
    type Error = ResultError;

    fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
        Self::from_persisted(record)
    }
}
