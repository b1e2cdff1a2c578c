use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::model::exam::ExamError;
use crate::model::ids::QuestionId;

//
// ─── QUESTION KIND ─────────────────────────────────────────────────────────────
//

/// How a question is answered and graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    /// Exactly one option is picked.
    SingleChoice,
    /// Any number of options are picked; graded by exact set match.
    MultiChoice,
    /// Free-form value compared after trimming.
    Numeric,
}

impl QuestionKind {
    /// Choice questions carry an option list, numeric ones never do.
    #[must_use]
    pub fn has_options(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultiChoice)
    }

    /// The answer shape this kind accepts.
    #[must_use]
    pub fn expected_shape(self) -> AnswerShape {
        match self {
            Self::SingleChoice | Self::Numeric => AnswerShape::Single,
            Self::MultiChoice => AnswerShape::Multiple,
        }
    }

    #[must_use]
    pub fn accepts(self, answer: &Answer) -> bool {
        self.expected_shape() == answer.shape()
    }
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// A submitted (or correct) answer.
///
/// On the wire this is either a JSON string or a JSON array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Single(String),
    Multiple(BTreeSet<String>),
}

/// Structural shape of an `Answer`, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerShape {
    Single,
    Multiple,
}

impl fmt::Display for AnswerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerShape::Single => f.write_str("a single value"),
            AnswerShape::Multiple => f.write_str("a set of values"),
        }
    }
}

impl Answer {
    pub fn single(value: impl Into<String>) -> Self {
        Self::Single(value.into())
    }

    pub fn multiple<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Multiple(values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn shape(&self) -> AnswerShape {
        match self {
            Answer::Single(_) => AnswerShape::Single,
            Answer::Multiple(_) => AnswerShape::Multiple,
        }
    }

    /// True for a blank string or an empty set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Answer::Single(value) => value.trim().is_empty(),
            Answer::Multiple(values) => values.is_empty(),
        }
    }
}

//
// ─── SUBJECT ───────────────────────────────────────────────────────────────────
//

/// Tag used to aggregate scores per subject (e.g. `maths`, `physics`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Subject(String);

impl Subject {
    /// Bucket used when a question carries no subject tag.
    pub const GENERAL: &'static str = "general";

    /// Creates a subject tag. Blank tags fall back to `general`.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Self(Self::GENERAL.to_owned())
        } else {
            Self(trimmed.to_owned())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self(Self::GENERAL.to_owned())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Subject {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Subject {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.0
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated question, as received from the catalog or a seed file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: Answer,
    pub marks: f64,
    #[serde(default)]
    pub negative_marks: f64,
    #[serde(default)]
    pub subject: Subject,
}

/// A validated exam question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    #[serde(rename = "type")]
    kind: QuestionKind,
    prompt: String,
    options: Vec<String>,
    correct_answer: Answer,
    marks: f64,
    negative_marks: f64,
    subject: Subject,
}

impl QuestionDraft {
    /// Validate the draft into a `Question`.
    ///
    /// Numeric correct answers are stored trimmed.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` when the id is blank, marks are negative or not finite,
    /// the option list does not fit the kind, or the correct answer is malformed.
    pub fn validate(self) -> Result<Question, ExamError> {
        let id = QuestionId::new(self.id)?;

        if !self.marks.is_finite() || self.marks < 0.0 {
            return Err(ExamError::InvalidMarks(id));
        }
        if !self.negative_marks.is_finite() || self.negative_marks < 0.0 {
            return Err(ExamError::InvalidNegativeMarks(id));
        }

        if self.kind.has_options() {
            if self.options.is_empty() {
                return Err(ExamError::MissingOptions(id));
            }
        } else if !self.options.is_empty() {
            return Err(ExamError::UnexpectedOptions(id));
        }

        if !self.kind.accepts(&self.correct_answer) {
            return Err(ExamError::CorrectAnswerShape {
                question_id: id,
                expected: self.kind.expected_shape(),
            });
        }
        if self.correct_answer.is_empty() {
            return Err(ExamError::EmptyCorrectAnswer(id));
        }

        let correct_answer = match self.correct_answer {
            Answer::Single(value) if self.kind == QuestionKind::Numeric => {
                Answer::Single(value.trim().to_owned())
            }
            other => other,
        };

        if self.kind.has_options() {
            let missing = match &correct_answer {
                Answer::Single(value) => (!self.options.contains(value)).then(|| value.clone()),
                Answer::Multiple(values) => values
                    .iter()
                    .find(|value| !self.options.contains(value))
                    .cloned(),
            };
            if let Some(value) = missing {
                return Err(ExamError::CorrectAnswerNotAnOption {
                    question_id: id,
                    value,
                });
            }
        }

        Ok(Question {
            id,
            kind: self.kind,
            prompt: self.prompt,
            options: self.options,
            correct_answer,
            marks: self.marks,
            negative_marks: self.negative_marks,
            subject: self.subject,
        })
    }
}

impl TryFrom<QuestionDraft> for Question {
    type Error = ExamError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl Question {
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_answer(&self) -> &Answer {
        &self.correct_answer
    }

    #[must_use]
    pub fn marks(&self) -> f64 {
        self.marks
    }

    #[must_use]
    pub fn negative_marks(&self) -> f64 {
        self.negative_marks
    }

    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }
}
