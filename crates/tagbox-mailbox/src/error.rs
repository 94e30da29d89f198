//! Error types for the mailbox engine.

use thiserror::Error;

/// Errors that can occur in mailbox operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced tag, folder, message, or sequence number does not
    /// exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A query expression is malformed: an even-length compound, an
    /// unknown operator, or undecodable stored JSON.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A sequence set string could not be parsed.
    #[error("invalid sequence set: {0}")]
    InvalidSet(String),

    /// A tag or folder with this name already exists.
    #[error("name already in use: {0}")]
    DuplicateName(String),

    /// A write was attempted on a mailbox backed by a compound query.
    #[error("mailbox is read-only: {0}")]
    ReadOnly(String),

    /// The operation is delegated to an outer collaborator and is not
    /// available on this engine.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// The store failed. For multi-step writes this means the whole batch
    /// was rolled back.
    #[error(transparent)]
    Store(#[from] tagbox_store::Error),
}

/// Result type alias for mailbox operations.
pub type Result<T> = std::result::Result<T, Error>;
