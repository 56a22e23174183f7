// SPDX-License-Identifier: Apache-2.0
//! The storage adapter's own error type, separate from
//! `theatreos_types::EngineError` so engines decide how an infrastructure
//! fault maps onto their typed `Result` (usually `EngineError::Storage`).

use thiserror::Error;

/// A storage-adapter failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique-constraint violation on a non-idempotent write (e.g. two
    /// memberships for the same `(user, theatre)`).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store itself failed (connection, transaction, I/O).
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<theatreos_types::EngineError> for StorageError {
    fn from(err: theatreos_types::EngineError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<StorageError> for theatreos_types::EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => theatreos_types::EngineError::NotFound(msg),
            StorageError::Conflict(msg) => theatreos_types::EngineError::Conflict(msg),
            StorageError::Backend(msg) => theatreos_types::EngineError::Storage(msg),
        }
    }
}

#[cfg(feature = "__never")]
const _: () = ();

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StorageError::Conflict(db_err.to_string())
            }
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Shorthand result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
