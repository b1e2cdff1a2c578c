use chrono::Utc;
use exam_core::model::{Exam, ExamDraft, ExamId, ExamSummary};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    i64_from_u64, i64_from_usize, kind_to_str, map_question_row, map_summary_row, ser, to_json,
};
use crate::repository::{ExamCatalog, ExamImport, StorageError};

#[async_trait::async_trait]
impl ExamCatalog for SqliteRepository {
    async fn list_exams(&self) -> Result<Vec<ExamSummary>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                e.id, e.title, e.duration_seconds, e.total_marks,
                COUNT(q.id) AS total_questions
            FROM exams e
            LEFT JOIN questions q ON q.exam_id = e.id
            GROUP BY e.id, e.title, e.duration_seconds, e.total_marks
            ORDER BY e.id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_summary_row(&row)?);
        }
        Ok(out)
    }

    async fn get_exam(&self, id: &ExamId) -> Result<Exam, StorageError> {
        let exam_row = sqlx::query(
            r"
            SELECT id, title, duration_seconds, total_marks
            FROM exams
            WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        let question_rows = sqlx::query(
            r"
            SELECT id, kind, prompt, options, correct_answer, marks, negative_marks, subject
            FROM questions
            WHERE exam_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions = Vec::with_capacity(question_rows.len());
        for row in &question_rows {
            questions.push(map_question_row(row)?);
        }

        let duration: i64 = exam_row.try_get("duration_seconds").map_err(ser)?;
        let draft = ExamDraft {
            id: exam_row.try_get("id").map_err(ser)?,
            title: exam_row.try_get("title").map_err(ser)?,
            duration_seconds: u64::try_from(duration).map_err(|_| {
                StorageError::Serialization(format!("invalid duration_seconds: {duration}"))
            })?,
            total_questions: Some(questions.len()),
            total_marks: Some(exam_row.try_get("total_marks").map_err(ser)?),
            questions,
        };

        draft.validate().map_err(ser)
    }
}

#[async_trait::async_trait]
impl ExamImport for SqliteRepository {
    async fn upsert_exam(&self, exam: &Exam) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO exams (id, title, duration_seconds, total_marks, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                duration_seconds = excluded.duration_seconds,
                total_marks = excluded.total_marks,
                updated_at = excluded.updated_at
            ",
        )
        .bind(exam.id().as_str())
        .bind(exam.title())
        .bind(i64_from_u64("duration_seconds", exam.duration_seconds())?)
        .bind(exam.total_marks())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM questions WHERE exam_id = ?1")
            .bind(exam.id().as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for (position, question) in exam.questions().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO questions (
                    exam_id, id, position, kind, prompt, options,
                    correct_answer, marks, negative_marks, subject
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
            )
            .bind(exam.id().as_str())
            .bind(question.id().as_str())
            .bind(i64_from_usize("position", position)?)
            .bind(kind_to_str(question.kind()))
            .bind(question.prompt())
            .bind(to_json(&question.options())?)
            .bind(to_json(question.correct_answer())?)
            .bind(question.marks())
            .bind(question.negative_marks())
            .bind(question.subject().as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::debug!(exam_id = %exam.id(), questions = exam.total_questions(), "exam stored");
        Ok(())
    }
}
