//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{QuestionError, SnapshotError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors raised by the browser/environment shim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EnvironmentError {
    #[error("fullscreen request was denied: {0}")]
    FullscreenDenied(String),
    #[error("event listeners could not be attached: {0}")]
    ListenersUnavailable(String),
}

/// Errors emitted when arming the proctoring monitor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProctorError {
    #[error("attempt is already submitted")]
    AlreadySubmitted,
    #[error("no async runtime available to run the monitor")]
    NoRuntime,
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

/// Errors emitted by `HttpQuestionSource`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionSourceError {
    #[error("question source is not configured")]
    Disabled,
    #[error("question source request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl From<QuestionSourceError> for StorageError {
    fn from(err: QuestionSourceError) -> Self {
        match err {
            QuestionSourceError::HttpStatus(status) if status == reqwest::StatusCode::NOT_FOUND => {
                StorageError::NotFound
            }
            QuestionSourceError::Http(err) if err.is_decode() => {
                StorageError::Serialization(err.to_string())
            }
            other => StorageError::Connection(other.to_string()),
        }
    }
}

/// Input on the results screen that names no known action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown results action: {0}")]
pub struct ParseActionError(pub String);

/// Errors emitted by attempt orchestration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("no attempt is in progress")]
    NoAttempt,
    #[error(transparent)]
    Questions(#[from] QuestionError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
