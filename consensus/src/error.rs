//! Error types for consensus

use smartlog_ledger::Tip;
use thiserror::Error;

/// Result type for consensus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Consensus errors
///
/// A proposal that misses its quorum is not an error; see
/// [`crate::engine::CommitOutcome::Rejected`].
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] smartlog_ledger::Error),

    /// Operation requires at least one replica
    #[error("Replica set is empty")]
    EmptySet,

    /// Quorum outside `1..=replicas`
    #[error("Invalid quorum {quorum} for {replicas} replicas")]
    InvalidQuorum {
        /// Requested quorum
        quorum: usize,
        /// Size of the replica set
        replicas: usize,
    },

    /// No replica holds the majority tip
    #[error("No replica matches majority tip {0}")]
    NoValidSource(Tip),

    /// Remote transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
