mod attempt;
mod exam;
mod ids;
mod question;
mod result;

pub use attempt::{AttemptError, AttemptState, AttemptStatus};
pub use exam::{Exam, ExamDraft, ExamError, ExamSummary, MAX_DURATION_SECONDS};
pub use ids::{AttemptId, ExamId, IdError, QuestionId, UserId};
pub use question::{Answer, AnswerShape, Question, QuestionDraft, QuestionKind, Subject};
pub use result::{ExamResult, ResultError, ResultRecord};
