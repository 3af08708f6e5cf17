//! Error taxonomy for the Genesis integration core.
//!
//! Separates caller mistakes (validation), missing entities, and illegal
//! state-machine moves from infrastructure failures so callers can decide
//! what is retryable and what is a bug.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for domain and storage operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid input from the caller.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A status transition the state machine does not permit.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the row was actually in.
        from: String,
        /// Status the caller tried to move to.
        to: String,
    },

    /// Database constraint violation.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {}", db_err))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key constraint violation: {}", db_err))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {}", db_err))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}
