use exam_core::model::{ExamId, ExamResult, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{i64_from_u64, i64_from_usize, map_result_row, ser, to_json};
use crate::repository::{ResultRepository, StorageError};

const RESULT_COLUMNS: &str = r"
    attempt_id, exam_id, status, started_at, submitted_at,
    total_questions, correct_answers, wrong_answers, unattempted,
    total_marks, obtained_marks, percentage, time_taken_seconds,
    subject_wise_score, answers
";

#[async_trait::async_trait]
impl ResultRepository for SqliteRepository {
    async fn has_result(&self, user: &UserId, exam: &ExamId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM exam_results WHERE user_id = ?1 AND exam_id = ?2")
            .bind(user.as_str())
            .bind(exam.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn record_result(&self, user: &UserId, result: &ExamResult) -> Result<(), StorageError> {
        let attempt_id = result.attempt_id().to_string();

        let res = sqlx::query(
            r"
            INSERT INTO exam_results (
                user_id, exam_id, attempt_id, status, started_at, submitted_at,
                total_questions, correct_answers, wrong_answers, unattempted,
                total_marks, obtained_marks, percentage, time_taken_seconds,
                subject_wise_score, answers
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(user_id, exam_id) DO NOTHING
            ",
        )
        .bind(user.as_str())
        .bind(result.exam_id().as_str())
        .bind(&attempt_id)
        .bind(result.status().as_str())
        .bind(result.started_at())
        .bind(result.submitted_at())
        .bind(i64_from_usize("total_questions", result.total_questions())?)
        .bind(i64_from_usize("correct_answers", result.correct_answers())?)
        .bind(i64_from_usize("wrong_answers", result.wrong_answers())?)
        .bind(i64_from_usize("unattempted", result.unattempted())?)
        .bind(result.total_marks())
        .bind(result.obtained_marks())
        .bind(result.percentage())
        .bind(i64_from_u64("time_taken_seconds", result.time_taken_seconds())?)
        .bind(to_json(result.subject_wise_score())?)
        .bind(to_json(result.answers())?)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() > 0 {
            return Ok(());
        }

        // A row already exists; accept only a retry of the same attempt.
        let existing: String = sqlx::query(
            "SELECT attempt_id FROM exam_results WHERE user_id = ?1 AND exam_id = ?2",
        )
        .bind(user.as_str())
        .bind(result.exam_id().as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .try_get("attempt_id")
        .map_err(ser)?;

        if existing == attempt_id {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %user,
                exam_id = %result.exam_id(),
                "rejected second result for the same exam"
            );
            Err(StorageError::Conflict)
        }
    }

    async fn get_result(
        &self,
        user: &UserId,
        exam: &ExamId,
    ) -> Result<Option<ExamResult>, StorageError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM exam_results WHERE user_id = ?1 AND exam_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(user.as_str())
            .bind(exam.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_result_row).transpose()
    }

    async fn list_results(&self, user: &UserId) -> Result<Vec<ExamResult>, StorageError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM exam_results WHERE user_id = ?1 \
             ORDER BY submitted_at DESC, exam_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_result_row(row)?);
        }
        Ok(out)
    }
}
