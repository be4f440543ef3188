//! Error types for workq.
//!
//! Handler and observer failures are `anyhow::Error` and never surface here;
//! this enum covers what the caller of `dispatch` or `run_once` can see.

use thiserror::Error;

use crate::model::JobId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no handler registered for job type: {0}")]
    UnregisteredHandler(String),

    #[error("handler already registered for job type: {0}")]
    DuplicateHandler(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors raised by the storage collaborator (including a missing envelope).
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Storage(_) | Error::Database(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
