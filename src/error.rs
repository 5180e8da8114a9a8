//! Error types shared by the engine and its data-access collaborator.

use thiserror::Error;

/// Failures reported by a [`crate::repository::TimeRepository`].
///
/// The engine never retries or hides these; they reach the caller
/// unchanged, wrapped in an [`EngineError`] naming the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("query rejected: {0}")]
    InvalidQuery(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A repository read failed while running `operation`.
    #[error("{operation} failed: {source}")]
    Repository {
        operation: &'static str,
        #[source]
        source: RepositoryError,
    },
    /// The caller supplied a date range whose end precedes its start.
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
}

impl EngineError {
    pub(crate) fn repository(operation: &'static str) -> impl FnOnce(RepositoryError) -> Self {
        move |source| EngineError::Repository { operation, source }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
