//! SmartLog Ledger Core
//!
//! Hash-linked, append-only ledger of logistics events replicated across a
//! small set of permissioned nodes.
//!
//! # Architecture
//!
//! - **Chain**: Ordered blocks, each hashing its payload, transaction id and predecessor
//! - **Genesis**: One constant block, so every replica starts byte-identical
//! - **Replica**: A named node owning its chain and signing credential
//! - **Fault injection**: Out-of-protocol tampering for detection drills
//!
//! # Invariants
//!
//! - Hash integrity: a block's stored hash equals recomputation over its fields
//! - Append-only: blocks enter a chain only by linking to its tip
//! - Deterministic hashing: no wall-clock input, every replica recomputes the same digest

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fault;
pub mod replica;
pub mod storage;
pub mod types;

// Re-exports
pub use chain::{genesis_block, Chain};
pub use config::Config;
pub use crypto::{KeyPair, SecretSigner, Signer};
pub use error::{Error, Result};
pub use fault::{FaultKind, FaultReport};
pub use replica::{Replica, ReplicaSet};
pub use storage::{ChainRecord, ChainStore};
pub use types::{Block, Event, Hash, Payload, RiskLevel, Stage, Tip};
