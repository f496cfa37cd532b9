//! Error types for lendkeeper
//!
//! Provides a unified error type for all operations.
//!
//! Two families live here: rejections (the request was refused and nothing
//! changed) and storage failures (reading or writing the data files went wrong).

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using LendError
pub type Result<T> = std::result::Result<T, LendError>;

/// Unified error type for lendkeeper operations
#[derive(Debug, Error)]
pub enum LendError {
    // -------------------------------------------------------------------------
    // Catalog Errors
    // -------------------------------------------------------------------------
    #[error("Item with identifier '{0}' already exists")]
    DuplicateIdentifier(String),

    #[error("Item '{0}' not found")]
    NotFound(String),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    // -------------------------------------------------------------------------
    // Lending Errors
    // -------------------------------------------------------------------------
    #[error("Cannot borrow '{item_id}': {reason}")]
    BorrowRejected { item_id: String, reason: String },

    #[error("Cannot return '{item_id}': {reason}")]
    ReturnRejected { item_id: String, reason: String },

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Persistence error on {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record in {} line {line}: {reason}", .path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LendError {
    /// True for refused requests that left the engine untouched
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LendError::DuplicateIdentifier(_)
                | LendError::NotFound(_)
                | LendError::InvalidField { .. }
                | LendError::BorrowRejected { .. }
                | LendError::ReturnRejected { .. }
        )
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LendError::Persistence {
            path: path.into(),
            source,
        }
    }
}
