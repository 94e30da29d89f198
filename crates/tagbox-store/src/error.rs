//! Error types for the store.

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A transaction failed to commit. None of its statements took effect.
    #[error("commit failed: {0}")]
    Commit(#[source] sqlx::Error),
}

impl Error {
    /// Whether the underlying database rejected a row for violating a
    /// UNIQUE constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        let (Self::Database(source) | Self::Commit(source)) = self;
        match source {
            sqlx::Error::Database(db) => matches!(db.kind(), ErrorKind::UniqueViolation),
            _ => false,
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_database_unique_violations_are_flagged() {
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_unique_violation());
        assert!(!Error::Commit(sqlx::Error::PoolClosed).is_unique_violation());
    }
}
