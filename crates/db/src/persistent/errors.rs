//! Failures of the SQLite deposit store.

use thiserror::Error;

/// Why the SQLite store could not serve a request.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The driver reported a failure, e.g. a locked file or a constraint violation.
    #[error("sqlite: {0}")]
    Driver(#[from] sqlx::Error),

    /// The schema could not be brought up to date on startup.
    #[error("schema migration: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row holds a value its column type does not allow.
    #[error("corrupt row: {0}")]
    MismatchedTypes(String),
}
