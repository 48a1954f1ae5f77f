//! Error types for docfork Core

use crate::revision::RevisionId;
use crate::store::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Why a write was rejected as a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The resolver returned no document
    ResolverGaveUp,
    /// Another writer kept committing between read and write
    StaleHistory,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::ResolverGaveUp => write!(f, "conflict resolver gave up"),
            ConflictReason::StaleHistory => write!(f, "revision history went stale"),
        }
    }
}

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Revision not found: {doc_id} @ {revision}")]
    RevisionNotFound { doc_id: String, revision: RevisionId },

    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("Invalid strategy: {0}")]
    InvalidStrategy(String),

    #[error("Conflict on document {doc_id}: {reason}")]
    Conflict { doc_id: String, reason: ConflictReason },

    #[error("Conflict resolver failed on document {doc_id}: {message}")]
    ResolverFault { doc_id: String, message: String },

    #[error("Conflict resolver on document {doc_id} took {elapsed:?} (limit {limit:?})")]
    ResolverTimeout {
        doc_id: String,
        elapsed: Duration,
        limit: Duration,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl Error {
    /// True for `Conflict` errors, regardless of reason
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// True when the document (or one of its revisions) is absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::DocumentNotFound(_)
                | Error::RevisionNotFound { .. }
                | Error::Storage(StorageError::NotFound(_))
        )
    }
}

/// Result type alias for docfork Core operations
pub type Result<T> = std::result::Result<T, Error>;
