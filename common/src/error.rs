use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to persist staged blob: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Transient SurrealDB transaction conflicts are safe to retry.
    pub fn is_retryable_conflict(&self) -> bool {
        match self {
            AppError::Database(err) => err
                .to_string()
                .contains("Failed to commit transaction due to a read or write conflict"),
            _ => false,
        }
    }
}
