//! Error types for the memory store.

use std::path::PathBuf;

/// Errors produced by memory store operations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    #[error("invalid priority: {0:?} (expected critical, normal or low)")]
    InvalidPriority(String),

    #[error("unsupported snapshot version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for memory operations.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
