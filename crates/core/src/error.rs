use thiserror::Error;

use crate::model::{AttemptError, ExamError, IdError, ResultError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Result(#[from] ResultError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExamDraft, ExamId};

    fn load(id: &str) -> Result<ExamId, Error> {
        let id = ExamId::new(id)?;
        let exam = ExamDraft {
            id: id.as_str().into(),
            title: "t".into(),
            duration_seconds: 0,
            questions: Vec::new(),
            total_questions: None,
            total_marks: None,
        }
        .validate()?;
        Ok(exam.id().clone())
    }

    #[test]
    fn component_errors_convert() {
        assert!(matches!(load("  "), Err(Error::Id(_))));
        assert!(matches!(load("e1"), Err(Error::Exam(_))));
    }
}
