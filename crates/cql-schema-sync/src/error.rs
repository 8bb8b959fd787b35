//! Error types for the schema synchronization engine.

use thiserror::Error;

/// Main error type for schema synchronization operations.
///
/// Most variants are contained close to where they occur (see the
/// documentation of each variant); none of them is ever returned to the
/// caller of a refresh pass, which only observes a
/// [`RefreshStatus`](crate::refresher::RefreshStatus).
#[derive(Error, Debug)]
pub enum SyncError {
    /// A catalog query failed at the gateway (network error, timeout, or
    /// server error). Fatal to the current refresh pass only; the previously
    /// synchronized store is left untouched.
    #[error("catalog query failed: {0}")]
    CatalogFetch(String),

    /// A single catalog row was malformed or incomplete. The affected entity
    /// is logged and skipped; the rest of the pass continues.
    #[error("malformed catalog row: {0}")]
    RowParse(String),

    /// User-defined types in one keyspace reference each other cyclically.
    /// Fatal to building that keyspace's types for this pass; the previously
    /// built types stay visible until a later pass succeeds.
    #[error("cyclic user type references in keyspace {keyspace}")]
    DependencyCycle { keyspace: String },

    /// A targeted refresh named a keyspace the local store does not know.
    /// Never surfaced as a failure: the refresher falls back to scheduling a
    /// full-cluster refresh.
    #[error("keyspace {keyspace} is not known to the local schema")]
    ScopeInconsistency { keyspace: String },

    /// The owning client has been shut down; refreshes become no-ops.
    #[error("client has been shut down")]
    ClosedClient,
}

impl SyncError {
    /// Create a `CatalogFetch` error from any displayable gateway failure.
    pub fn catalog_fetch(message: impl Into<String>) -> Self {
        SyncError::CatalogFetch(message.into())
    }

    /// Create a `RowParse` error with context about the offending row.
    pub fn row_parse(message: impl Into<String>) -> Self {
        SyncError::RowParse(message.into())
    }
}

/// Result type alias for schema synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
