//! Error types for champ_db

use crate::model::Hash;
use thiserror::Error;

/// Result type alias for champ_db operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in champ_db operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The expected value of a compare-and-swap did not match the stored one
    #[error("Conflict on key {key}: expected {expected:?}, found {actual:?}")]
    Conflict {
        key: String,
        expected: Option<Hash>,
        actual: Option<Hash>,
    },

    /// A merge found keys changed independently on both branches
    #[error("Concurrent modification of keys: {}", .0.join(", "))]
    ConcurrentModification(Vec<String>),

    /// Two distinct keys share every bit of their digest
    #[error("Hash collision overflow at depth {depth}")]
    HashCollisionOverflow { depth: usize },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A block referenced by a node is missing from the store
    #[error("Corrupt reference: block {0} is missing")]
    CorruptReference(Hash),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid database file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Root pointer '{name}' was moved concurrently")]
    RootConflict { name: String },

    #[error("Root not found: {0}")]
    RootNotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying from a fresh read can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. } | Error::RootConflict { .. })
    }
}
