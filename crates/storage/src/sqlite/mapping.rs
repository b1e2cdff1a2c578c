use exam_core::model::{
    AttemptStatus, ExamId, ExamResult, ExamSummary, QuestionDraft, QuestionKind, ResultRecord,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn i64_from_u64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn i64_from_usize(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn usize_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

fn from_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("invalid {field}: {e}")))
}

pub(crate) fn kind_to_str(kind: QuestionKind) -> &'static str {
    match kind {
        QuestionKind::SingleChoice => "single-choice",
        QuestionKind::MultiChoice => "multi-choice",
        QuestionKind::Numeric => "numeric",
    }
}

pub(crate) fn parse_kind(s: &str) -> Result<QuestionKind, StorageError> {
    match s {
        "single-choice" => Ok(QuestionKind::SingleChoice),
        "multi-choice" => Ok(QuestionKind::MultiChoice),
        "numeric" => Ok(QuestionKind::Numeric),
        _ => Err(StorageError::Serialization(format!(
            "invalid question kind: {s}"
        ))),
    }
}

pub(crate) fn parse_status(s: &str) -> Result<AttemptStatus, StorageError> {
    match s {
        "submitted" => Ok(AttemptStatus::Submitted),
        "expired" => Ok(AttemptStatus::Expired),
        "in-progress" => Ok(AttemptStatus::InProgress),
        _ => Err(StorageError::Serialization(format!("invalid status: {s}"))),
    }
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuestionDraft, StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;
    let options: String = row.try_get("options").map_err(ser)?;
    let correct_answer: String = row.try_get("correct_answer").map_err(ser)?;
    let subject: String = row.try_get("subject").map_err(ser)?;

    Ok(QuestionDraft {
        id: row.try_get("id").map_err(ser)?,
        kind: parse_kind(&kind)?,
        prompt: row.try_get("prompt").map_err(ser)?,
        options: from_json("options", &options)?,
        correct_answer: from_json("correct_answer", &correct_answer)?,
        marks: row.try_get("marks").map_err(ser)?,
        negative_marks: row.try_get("negative_marks").map_err(ser)?,
        subject: subject.into(),
    })
}

pub(crate) fn map_summary_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExamSummary, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    Ok(ExamSummary {
        id: ExamId::new(id).map_err(ser)?,
        title: row.try_get("title").map_err(ser)?,
        duration_seconds: u64_from_i64(
            "duration_seconds",
            row.try_get::<i64, _>("duration_seconds").map_err(ser)?,
        )?,
        total_questions: usize_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        total_marks: row.try_get("total_marks").map_err(ser)?,
    })
}

pub(crate) fn map_result_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExamResult, StorageError> {
    let attempt_id: String = row.try_get("attempt_id").map_err(ser)?;
    let exam_id: String = row.try_get("exam_id").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;
    let subject_wise_score: String = row.try_get("subject_wise_score").map_err(ser)?;
    let answers: String = row.try_get("answers").map_err(ser)?;

    let record = ResultRecord {
        attempt_id: attempt_id.parse().map_err(ser)?,
        exam_id: ExamId::new(exam_id).map_err(ser)?,
        status: parse_status(&status)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
        total_questions: usize_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        correct_answers: usize_from_i64(
            "correct_answers",
            row.try_get::<i64, _>("correct_answers").map_err(ser)?,
        )?,
        wrong_answers: usize_from_i64(
            "wrong_answers",
            row.try_get::<i64, _>("wrong_answers").map_err(ser)?,
        )?,
        unattempted: usize_from_i64(
            "unattempted",
            row.try_get::<i64, _>("unattempted").map_err(ser)?,
        )?,
        total_marks: row.try_get("total_marks").map_err(ser)?,
        obtained_marks: row.try_get("obtained_marks").map_err(ser)?,
        percentage: row.try_get("percentage").map_err(ser)?,
        time_taken_seconds: u64_from_i64(
            "time_taken_seconds",
            row.try_get::<i64, _>("time_taken_seconds").map_err(ser)?,
        )?,
        subject_wise_score: from_json("subject_wise_score", &subject_wise_score)?,
        answers: from_json("answers", &answers)?,
    };

    ExamResult::from_persisted(record).map_err(ser)
}
