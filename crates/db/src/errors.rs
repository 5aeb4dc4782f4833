//! Errors surfaced by every [`DepositStore`](crate::deposits::DepositStore) implementation.

use thiserror::Error;

use crate::persistent::errors::StorageError;

/// Errors that can occur when reading or writing deposits.
#[derive(Debug, Error)]
pub enum DbError {
    /// The persistent backend failed.
    #[error("sqlite: {0}")]
    Storage(#[from] StorageError),

    /// The requested status change is not a legal transition.
    #[error("illegal status transition: {0}")]
    IllegalTransition(String),
}

/// Result type of store operations.
pub type DbResult<T> = Result<T, DbError>;
