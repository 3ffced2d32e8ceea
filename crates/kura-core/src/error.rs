//! Error types for engines and the store handle

use thiserror::Error;

/// Failures reported by a storage engine.
///
/// Variants follow the DOMException names IndexedDB raises so the browser
/// backend can map them one-to-one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The engine is not available in this environment
    #[error("storage engine not available: {0}")]
    NotAvailable(String),

    /// An argument was rejected before reaching the engine (e.g. version 0)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The named collection does not exist in the opened database
    #[error("no such collection: {0}")]
    NotFound(String),

    /// The requested version is older than the one on disk
    #[error("requested version {requested} is lower than existing version {existing}")]
    Version { requested: u32, existing: u32 },

    /// Invalid key, or key/key-path mismatch
    #[error("data error: {0}")]
    Data(String),

    /// Constraint violation (e.g. key generator exhausted)
    #[error("constraint error: {0}")]
    Constraint(String),

    /// Operation on a closed connection or finished transaction
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Transaction aborted before commit
    #[error("transaction aborted: {0}")]
    Aborted(String),

    /// Any other engine failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by [`Store`](crate::Store) operations.
///
/// `Clone` because a single open attempt is shared by every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Opening the database (or its schema upgrade) failed
    #[error("open failed: {0}")]
    Open(#[source] EngineError),

    /// A read transaction, request or cursor failed
    #[error("read failed: {0}")]
    Read(#[source] EngineError),

    /// A read-write transaction failed or aborted
    #[error("write failed: {0}")]
    Write(#[source] EngineError),

    /// A record could not be converted to or from its stored form
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store configuration is invalid
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// The engine error behind an open/read/write failure, if any.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            StoreError::Open(e) | StoreError::Read(e) | StoreError::Write(e) => Some(e),
            StoreError::Serialization(_) | StoreError::Config(_) => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_accessor() {
        let err = StoreError::Read(EngineError::NotFound("notes".into()));
        assert_eq!(
            err.engine_error(),
            Some(&EngineError::NotFound("notes".into()))
        );
        assert!(StoreError::Config("bad".into()).engine_error().is_none());
    }

    #[test]
    fn test_display_includes_engine_detail() {
        let err = StoreError::Open(EngineError::Version {
            requested: 1,
            existing: 3,
        });
        assert_eq!(
            err.to_string(),
            "open failed: requested version 1 is lower than existing version 3"
        );
    }
}
