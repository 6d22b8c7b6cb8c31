//! Common error types for TuneQuiz

use thiserror::Error;

/// Common result type for TuneQuiz operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across TuneQuiz services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested item, record or session not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected by a business rule (e.g. no eligible items)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Another writer changed the same row first; caller may retry
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Stored history breaks the ADDED / DELETED / RESTORED alternation
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for SQLite busy/locked failures that are worth retrying
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(db_err) => {
                let msg = db_err.to_string();
                msg.contains("database is locked") || msg.contains("database table is locked")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_category() {
        let err = Error::Validation("no eligible items".to_string());
        assert_eq!(err.to_string(), "Validation failed: no eligible items");

        let err = Error::ConcurrencyConflict("item changed".to_string());
        assert!(err.to_string().starts_with("Concurrency conflict"));
    }

    #[test]
    fn test_non_database_errors_are_not_lock_contention() {
        assert!(!Error::Internal("database is locked".to_string()).is_lock_contention());
        assert!(!Error::NotFound("x".to_string()).is_lock_contention());
    }

    #[test]
    fn test_database_lock_is_contention() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "database is locked");
        let err = Error::Database(sqlx::Error::Io(io));
        assert!(err.is_lock_contention());
    }
}
