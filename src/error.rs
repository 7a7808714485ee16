//! error types for quote storage.

use thiserror::Error;

/// a quote was rejected before anything was written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("timestamp \"{value}\" is not in YYYY-MM-DD HH:MM:SS format")]
    MalformedTimestamp { value: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid quote: {0}")]
    Validation(#[from] ValidationError),

    /// connection, query, or i/o failure in sqlite.
    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// true when the backing store failed, as opposed to bad input.
    pub fn is_storage(&self) -> bool {
        matches!(self, StoreError::Storage(_) | StoreError::Migration(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
