//! Service level errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller does not own the resource it tries to change.
    #[error("conversation belongs to another user")]
    Forbidden,

    /// The action is not allowed in the current lifecycle state.
    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    /// Maps unique constraint violations to `Conflict`, everything else to `Database`.
    pub fn from_write(error: sqlx::Error, conflict: &str) -> ServiceError {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ServiceError::Conflict(conflict.to_owned())
            }
            _ => ServiceError::Database(error),
        }
    }
}
