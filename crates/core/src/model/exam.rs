use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{ExamId, IdError, QuestionId};
use crate::model::question::{AnswerShape, Question, QuestionDraft};

/// Tolerance used when comparing a stated total against the summed marks.
const MARKS_EPSILON: f64 = 1e-9;

/// Longest accepted attempt window: one year.
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ExamError {
    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("exam must contain at least one question")]
    NoQuestions,

    #[error("exam duration must be > 0 seconds")]
    ZeroDuration,

    #[error("exam duration {0}s exceeds the maximum of {MAX_DURATION_SECONDS}s")]
    DurationTooLong(u64),

    #[error("exam states {stated} questions but contains {actual}")]
    QuestionCountMismatch { stated: usize, actual: usize },

    #[error("exam states total marks {stated} but questions sum to {actual}")]
    TotalMarksMismatch { stated: f64, actual: f64 },

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),

    #[error("question {0}: marks must be a finite number >= 0")]
    InvalidMarks(QuestionId),

    #[error("question {0}: negative marks must be a finite number >= 0")]
    InvalidNegativeMarks(QuestionId),

    #[error("question {0}: choice questions need at least one option")]
    MissingOptions(QuestionId),

    #[error("question {0}: numeric questions cannot have options")]
    UnexpectedOptions(QuestionId),

    #[error("question {question_id}: correct answer must be {expected}")]
    CorrectAnswerShape {
        question_id: QuestionId,
        expected: AnswerShape,
    },

    #[error("question {0}: correct answer cannot be empty")]
    EmptyCorrectAnswer(QuestionId),

    #[error("question {question_id}: correct answer `{value}` is not one of the options")]
    CorrectAnswerNotAnOption {
        question_id: QuestionId,
        value: String,
    },
}

//
// ─── EXAM ──────────────────────────────────────────────────────────────────────
//

/// Unvalidated exam payload.
///
/// `total_questions` and `total_marks` are optional on the wire; when present
/// they must agree with the question list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDraft {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub duration_seconds: u64,
    pub questions: Vec<QuestionDraft>,
    #[serde(default)]
    pub total_questions: Option<usize>,
    #[serde(default)]
    pub total_marks: Option<f64>,
}

/// A validated exam definition. Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ExamDraft")]
pub struct Exam {
    id: ExamId,
    title: String,
    duration_seconds: u64,
    total_questions: usize,
    total_marks: f64,
    questions: Vec<Question>,
}

/// Listing entry for an exam, without its questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSummary {
    pub id: ExamId,
    #[serde(default)]
    pub title: String,
    pub duration_seconds: u64,
    pub total_questions: usize,
    pub total_marks: f64,
}

impl ExamDraft {
    /// Validate the draft into an `Exam`.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` if the exam is empty, has a zero or over-long
    /// duration, repeats a
    /// question id, contains an invalid question, or states totals that do not
    /// match its questions.
    pub fn validate(self) -> Result<Exam, ExamError> {
        let id = ExamId::new(self.id)?;

        check_duration(self.duration_seconds)?;
        if self.questions.is_empty() {
            return Err(ExamError::NoQuestions);
        }
        if let Some(stated) = self.total_questions {
            if stated != self.questions.len() {
                return Err(ExamError::QuestionCountMismatch {
                    stated,
                    actual: self.questions.len(),
                });
            }
        }

        let mut seen = HashSet::with_capacity(self.questions.len());
        let mut questions = Vec::with_capacity(self.questions.len());
        for draft in self.questions {
            let question = draft.validate()?;
            if !seen.insert(question.id().clone()) {
                return Err(ExamError::DuplicateQuestion(question.id().clone()));
            }
            questions.push(question);
        }

        let total_marks: f64 = questions.iter().map(Question::marks).sum();
        if let Some(stated) = self.total_marks {
            if (stated - total_marks).abs() > MARKS_EPSILON {
                return Err(ExamError::TotalMarksMismatch {
                    stated,
                    actual: total_marks,
                });
            }
        }

        Ok(Exam {
            id,
            title: self.title,
            duration_seconds: self.duration_seconds,
            total_questions: questions.len(),
            total_marks,
            questions,
        })
    }
}

fn check_duration(seconds: u64) -> Result<(), ExamError> {
    match seconds {
        0 => Err(ExamError::ZeroDuration),
        s if s > MAX_DURATION_SECONDS => Err(ExamError::DurationTooLong(s)),
        _ => Ok(()),
    }
}

impl TryFrom<ExamDraft> for Exam {
    type Error = ExamError;

    fn try_from(draft: ExamDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl Exam {
    /// Build an exam from already validated questions.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` for an empty question list, a duration outside
    /// `1..=MAX_DURATION_SECONDS` or a repeated question id.
    pub fn new(
        id: ExamId,
        title: impl Into<String>,
        duration_seconds: u64,
        questions: Vec<Question>,
    ) -> Result<Self, ExamError> {
        check_duration(duration_seconds)?;
        if questions.is_empty() {
            return Err(ExamError::NoQuestions);
        }
        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(ExamError::DuplicateQuestion(question.id().clone()));
            }
        }
        let total_marks = questions.iter().map(Question::marks).sum();
        Ok(Self {
            id,
            title: title.into(),
            duration_seconds,
            total_questions: questions.len(),
            total_marks,
            questions,
        })
    }

    #[must_use]
    pub fn id(&self) -> &ExamId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// Wall-clock budget for one attempt.
    #[must_use]
    pub fn duration(&self) -> Duration {
        // bounded by MAX_DURATION_SECONDS at construction
        Duration::seconds(i64::try_from(self.duration_seconds).unwrap_or_default())
    }

    /// Questions in display and scoring order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.total_questions
    }

    #[must_use]
    pub fn total_marks(&self) -> f64 {
        self.total_marks
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn summary(&self) -> ExamSummary {
        ExamSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            duration_seconds: self.duration_seconds,
            total_questions: self.total_questions,
            total_marks: self.total_marks,
        }
    }
}
