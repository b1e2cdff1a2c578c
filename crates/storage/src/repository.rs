use async_trait::async_trait;
use exam_core::model::{Exam, ExamId, ExamResult, ExamSummary, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Read side of the exam catalog.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    /// List every exam in the catalog, without questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn list_exams(&self) -> Result<Vec<ExamSummary>, StorageError>;

    /// Fetch a full exam with its questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_exam(&self, id: &ExamId) -> Result<Exam, StorageError>;
}

/// Loads exam definitions into a local catalog.
#[async_trait]
pub trait ExamImport: Send + Sync {
    /// Persist or replace an exam and its questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the exam cannot be stored.
    async fn upsert_exam(&self, exam: &Exam) -> Result<(), StorageError>;
}

/// Stores at most one result per (user, exam).
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Whether the user already has a result for the exam.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn has_result(&self, user: &UserId, exam: &ExamId) -> Result<bool, StorageError>;

    /// Record a result.
    ///
    /// Re-sending a result with the same attempt id is accepted so that
    /// persistence can be retried.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a different attempt is already
    /// stored for the same user and exam.
    async fn record_result(&self, user: &UserId, result: &ExamResult) -> Result<(), StorageError>;

    /// Fetch the stored result for a user and exam, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_result(
        &self,
        user: &UserId,
        exam: &ExamId,
    ) -> Result<Option<ExamResult>, StorageError>;

    /// All results of a user, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn list_results(&self, user: &UserId) -> Result<Vec<ExamResult>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    exams: Arc<Mutex<Vec<Exam>>>,
    results: Arc<Mutex<HashMap<(UserId, ExamId), ExamResult>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            exams: Arc::new(Mutex::new(Vec::new())),
            results: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ExamCatalog for InMemoryRepository {
    async fn list_exams(&self) -> Result<Vec<ExamSummary>, StorageError> {
        let guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.iter().map(Exam::summary).collect())
    }

    async fn get_exam(&self, id: &ExamId) -> Result<Exam, StorageError> {
        let guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .iter()
            .find(|exam| exam.id() == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ExamImport for InMemoryRepository {
    async fn upsert_exam(&self, exam: &Exam) -> Result<(), StorageError> {
        let mut guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        match guard.iter_mut().find(|existing| existing.id() == exam.id()) {
            Some(existing) => *existing = exam.clone(),
            None => guard.push(exam.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn has_result(&self, user: &UserId, exam: &ExamId) -> Result<bool, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.contains_key(&(user.clone(), exam.clone())))
    }

    async fn record_result(&self, user: &UserId, result: &ExamResult) -> Result<(), StorageError> {
        let mut guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = (user.clone(), result.exam_id().clone());
        match guard.get(&key) {
            Some(existing) if existing.attempt_id() == result.attempt_id() => Ok(()),
            Some(_) => Err(StorageError::Conflict),
            None => {
                guard.insert(key, result.clone());
                Ok(())
            }
        }
    }

    async fn get_result(
        &self,
        user: &UserId,
        exam: &ExamId,
    ) -> Result<Option<ExamResult>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(user.clone(), exam.clone())).cloned())
    }

    async fn list_results(&self, user: &UserId) -> Result<Vec<ExamResult>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut out: Vec<ExamResult> = guard
            .iter()
            .filter(|((owner, _), _)| owner == user)
            .map(|(_, result)| result.clone())
            .collect();
        out.sort_by(|a, b| {
            b.submitted_at()
                .cmp(&a.submitted_at())
                .then_with(|| a.exam_id().cmp(b.exam_id()))
        });
        Ok(out)
    }
}

/// Aggregates the catalog and result repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub exams: Arc<dyn ExamCatalog>,
    pub import: Arc<dyn ExamImport>,
    pub results: Arc<dyn ResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let exams: Arc<dyn ExamCatalog> = Arc::new(repo.clone());
        let import: Arc<dyn ExamImport> = Arc::new(repo.clone());
        let results: Arc<dyn ResultRepository> = Arc::new(repo);
        Self {
            exams,
            import,
            results,
        }
    }
}
