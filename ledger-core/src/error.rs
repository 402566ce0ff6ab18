//! Error types for the ledger

use crate::types::Hash;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Appended block does not link to the chain tip
    #[error("Invalid linkage: block links to {found}, chain tip is {expected}")]
    InvalidLinkage {
        /// Current tip hash of the chain
        expected: Hash,
        /// Previous hash carried by the rejected block
        found: Hash,
    },

    /// Appended block carries the wrong sequence number
    #[error("Sequence mismatch: expected {expected}, found {found}")]
    SequenceMismatch {
        /// Next sequence number of the chain
        expected: u64,
        /// Sequence number carried by the rejected block
        found: u64,
    },

    /// Stored hash does not match recomputation
    #[error("Tampered block at sequence {sequence}")]
    TamperedBlock {
        /// Sequence number of the first failing block
        sequence: u64,
    },

    /// Operation requires at least one block
    #[error("Chain is empty")]
    EmptyChain,

    /// Replica name not present in the set
    #[error("Unknown replica: {0}")]
    UnknownReplica(String),

    /// Replica name registered twice
    #[error("Duplicate replica: {0}")]
    DuplicateReplica(String),

    /// Persisted record cannot be turned back into a chain
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Hex digest could not be parsed
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
