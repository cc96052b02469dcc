//! Error types for Registrar.

use thiserror::Error;

/// Common error type for Registrar infrastructure.
#[derive(Error, Debug)]
pub enum RegistrarError {
    /// Database error.
    ///
    /// Errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for RegistrarError {
    fn from(e: sqlx::Error) -> Self {
        RegistrarError::Database(e.to_string())
    }
}

/// Result type alias for Registrar operations.
pub type Result<T> = std::result::Result<T, RegistrarError>;
