use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{ExamCatalog, ExamImport, ResultRepository, Storage};

mod exam_repo;
mod mapping;
mod migrate;
mod result_repo;

const MAX_FILE_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Exam catalog and result store on a single `SQLite` database.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// How the database behind a URL lives, which decides the pool shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatabaseKind {
    /// A file on disk: WAL journal, several connections.
    File,
    /// `file:<name>?mode=memory&cache=shared`: shared between connections,
    /// dropped once the last one closes.
    SharedMemory,
    /// `sqlite::memory:`: every connection would see its own empty database.
    PrivateMemory,
}

impl DatabaseKind {
    fn of(database_url: &str) -> Self {
        let memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        match (memory, database_url.contains("cache=shared")) {
            (false, _) => Self::File,
            (true, true) => Self::SharedMemory,
            (true, false) => Self::PrivateMemory,
        }
    }

    fn max_connections(self) -> u32 {
        match self {
            Self::PrivateMemory => 1,
            Self::File | Self::SharedMemory => MAX_FILE_CONNECTIONS,
        }
    }
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// File databases are created when missing and run in WAL mode. Memory
    /// databases keep one connection open for the life of the pool so the
    /// migrated schema survives.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the URL cannot be parsed or the connection
    /// cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let kind = DatabaseKind::of(database_url);
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if kind == DatabaseKind::File {
            options = options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool = SqlitePoolOptions::new()
            .max_connections(kind.max_connections())
            .acquire_timeout(BUSY_TIMEOUT);
        if kind != DatabaseKind::File {
            pool = pool.min_connections(1).idle_timeout(None).max_lifetime(None);
        }
        let pool = pool.connect_with(options).await?;
        tracing::debug!(url = database_url, kind = ?kind, "sqlite pool ready");
        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a migrated `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        Ok(Self {
            exams: Arc::new(repo.clone()) as Arc<dyn ExamCatalog>,
            import: Arc::new(repo.clone()) as Arc<dyn ExamImport>,
            results: Arc::new(repo) as Arc<dyn ResultRepository>,
        })
    }
}
