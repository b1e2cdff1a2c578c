//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::AttemptError;
use storage::repository::StorageError;

/// Errors emitted by `HttpCatalog` before they are folded into `StorageError`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogHttpError {
    #[error("exam api request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("exam api returned an unexpected payload: {0}")]
    Payload(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<CatalogHttpError> for StorageError {
    fn from(err: CatalogHttpError) -> Self {
        match err {
            CatalogHttpError::HttpStatus(reqwest::StatusCode::NOT_FOUND) => StorageError::NotFound,
            CatalogHttpError::HttpStatus(reqwest::StatusCode::CONFLICT) => StorageError::Conflict,
            CatalogHttpError::Payload(msg) => StorageError::Serialization(msg),
            other => StorageError::Connection(other.to_string()),
        }
    }
}

/// Errors emitted by exam sessions and the exam workflow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("session state lock poisoned")]
    Poisoned,
    #[error("session was abandoned")]
    Closed,
    #[error("exam sessions require a running Tokio runtime")]
    NoRuntime,
}

impl SessionError {
    /// True when a mutation was refused because the deadline has passed.
    #[must_use]
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::Attempt(AttemptError::DeadlineExceeded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_statuses_map_to_storage_errors() {
        let not_found: StorageError =
            CatalogHttpError::HttpStatus(reqwest::StatusCode::NOT_FOUND).into();
        assert!(matches!(not_found, StorageError::NotFound));

        let conflict: StorageError =
            CatalogHttpError::HttpStatus(reqwest::StatusCode::CONFLICT).into();
        assert!(matches!(conflict, StorageError::Conflict));

        let server: StorageError =
            CatalogHttpError::HttpStatus(reqwest::StatusCode::BAD_GATEWAY).into();
        assert!(matches!(server, StorageError::Connection(_)));
    }

    #[test]
    fn deadline_helper_only_matches_deadline() {
        assert!(SessionError::from(AttemptError::DeadlineExceeded).is_deadline_exceeded());
        assert!(!SessionError::from(AttemptError::SessionClosed).is_deadline_exceeded());
        assert!(!SessionError::Closed.is_deadline_exceeded());
    }
}
