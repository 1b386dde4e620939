//! Storage layer errors.

use thiserror::Error;

/// Errors surfaced by a position store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found
    #[error("position not found: {0}")]
    NotFound(String),

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend failure
    #[error("database error: {0}")]
    Database(String),

    /// Backend unreachable or misconfigured
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Connection(err.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}
