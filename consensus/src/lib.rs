//! SmartLog Proof-of-Authority consensus
//!
//! Drives the replicas of the ledger core through propose/vote/commit rounds,
//! detects divergent replicas and restores them from the majority.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        Driver (simulator CLI / node services)        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ NetworkHandle
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │                 NetworkActor                         │
//! │  ConsensusEngine ─ VoteTransport (local | HTTP)     │
//! │  IntegrityMonitor ─ FaultInjector ─ AuditSink       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              Ledger Core (ReplicaSet)                │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Round
//!
//! - **Propose**: fresh transaction id, candidate hash over the majority tip
//! - **Vote**: each replica signs iff its tip equals the previous hash
//! - **Commit**: on quorum, one block appended to every delivery target
//!
//! # Fault model
//!
//! Benign but unreliable replicas. By default a replica that voted to reject
//! still receives the block; a divergent one is caught up to the signers'
//! chain. Nothing here tolerates a malicious majority.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod integrity;
pub mod metrics;
pub mod node;
pub mod transport;

// Re-exports
pub use actor::{spawn_network_actor, NetworkActor, NetworkHandle};
pub use audit::{AuditAction, AuditEvent, AuditLog, AuditSink, TracingAuditSink};
pub use config::Config;
pub use engine::{
    commit, propose, vote, CommitOutcome, ConsensusEngine, DeliveryPolicy, Proposal,
    RejectReason, RoundReport, Vote,
};
pub use error::{Error, Result};
pub use integrity::{DivergenceReport, RecoveryReport, ReplicaSummary};
pub use metrics::Metrics;
pub use transport::{HttpTransport, InProcessTransport, VoteTransport};
