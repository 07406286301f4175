//! Error types shared across the store, staging and promotion layers.

use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Manifest is empty")]
    Empty,

    #[error("Duplicate manifest entry: {0}")]
    Duplicate(String),

    #[error("Manifest entry is not an absolute path: {0}")]
    NotAbsolute(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt entry metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Invalid container name: {0:?}")]
    InvalidName(String),

    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Container already exists: {0}")]
    AlreadyExists(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Why a staging cycle did not produce a complete staging container.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Failed to fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },

    #[error("Failed to write staged entry {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to open staging container: {0}")]
    Open(#[source] StoreError),
}

/// Why a promotion left the live container untouched.
#[derive(Error, Debug)]
pub enum RollbackReason {
    #[error("staging failed: {0}")]
    StagingFailed(#[from] StageError),

    #[error("incomplete staging: {staged} staged keys, {expected} expected ({missing} missing, {unexpected} unexpected)")]
    IncompleteStaging {
        staged: usize,
        expected: usize,
        missing: usize,
        unexpected: usize,
    },

    #[error("store error during promotion: {0}")]
    Store(#[from] StoreError),
}
