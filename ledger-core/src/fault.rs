//! Fault injection
//!
//! Deliberate, out-of-protocol mutation of one replica's last block, used to
//! demonstrate divergence detection and recovery. Only the targeted replica
//! is touched.

use crate::crypto::hash_bytes;
use crate::replica::{Replica, ReplicaSet};
use crate::types::Hash;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Kind of tampering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Rewrite the payload and reseal the hash
    Payload,
    /// Overwrite the stored hash only
    Hash,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Payload => write!(f, "payload"),
            FaultKind::Hash => write!(f, "hash"),
        }
    }
}

/// What an injected fault changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    /// Target replica
    pub replica: String,
    /// Kind of tampering
    pub kind: FaultKind,
    /// Sequence number of the altered block
    pub sequence: u64,
    /// Stored hash before
    pub before: Hash,
    /// Stored hash after
    pub after: Hash,
}

/// Alter the last block's payload and reseal it
///
/// The new hash covers the altered payload and the untouched previous hash
/// but not the transaction id, so the replica's tip diverges while chain
/// verification still flags the block.
pub fn corrupt_payload(replica: &mut Replica) -> Result<FaultReport> {
    let name = replica.name().to_string();
    let block = replica.chain_mut().tip_mut().ok_or(Error::EmptyChain)?;
    let before = block.current_hash;

    block.payload = block.payload.falsified();
    let mut hasher = Sha256::new();
    hasher.update(block.payload.canonical_bytes());
    hasher.update(block.previous_hash.as_bytes());
    block.current_hash = Hash::from_bytes(hasher.finalize().into());

    let report = FaultReport {
        replica: name,
        kind: FaultKind::Payload,
        sequence: block.sequence,
        before,
        after: block.current_hash,
    };
    tracing::warn!(
        replica = %report.replica,
        sequence = report.sequence,
        before = %before.short(),
        after = %report.after.short(),
        "Payload tampered"
    );
    Ok(report)
}

/// Overwrite the last block's stored hash, leaving the payload intact
pub fn corrupt_hash(replica: &mut Replica) -> Result<FaultReport> {
    let name = replica.name().to_string();
    let block = replica.chain_mut().tip_mut().ok_or(Error::EmptyChain)?;
    let before = block.current_hash;

    let mut material = b"forged:".to_vec();
    material.extend_from_slice(block.previous_hash.as_bytes());
    block.current_hash = hash_bytes(&material);

    let report = FaultReport {
        replica: name,
        kind: FaultKind::Hash,
        sequence: block.sequence,
        before,
        after: block.current_hash,
    };
    tracing::warn!(
        replica = %report.replica,
        sequence = report.sequence,
        before = %before.short(),
        after = %report.after.short(),
        "Hash tampered"
    );
    Ok(report)
}

/// Tamper with the named replica of a set
pub fn inject(replicas: &mut ReplicaSet, name: &str, kind: FaultKind) -> Result<FaultReport> {
    let replica = replicas.get_mut(name)?;
    match kind {
        FaultKind::Payload => corrupt_payload(replica),
        FaultKind::Hash => corrupt_hash(replica),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{genesis_block, Chain};
    use crate::types::{Block, Event, Payload, RiskLevel, Stage, Tip};
    use uuid::Uuid;

    fn set_with_one_block() -> ReplicaSet {
        let mut chain = Chain::new();
        let event = Event::new("7", "Depot_RJ", "Center_BA", Stage::Arrived, RiskLevel::Low);
        let block = Block::new(1, Payload::Event(event), chain.tip_block_hash().unwrap(), Uuid::new_v4());
        chain.append(block).unwrap();
        ReplicaSet::from_chain(&chain, ["Node_A", "Node_B", "Node_C"]).unwrap()
    }

    #[test]
    fn test_corrupt_payload_diverges_and_fails_verification() {
        let mut set = set_with_one_block();
        let before = set.get("Node_B").unwrap().tip_hash();

        let report = inject(&mut set, "Node_B", FaultKind::Payload).unwrap();
        let target = set.get("Node_B").unwrap();

        assert_eq!(report.sequence, 1);
        assert_ne!(target.tip_hash(), before);
        assert_eq!(target.tip_hash(), Tip::Block(report.after));
        assert!(!target.chain().is_valid());
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_corrupt_hash_keeps_payload() {
        let mut set = set_with_one_block();
        let payload = set.get("Node_C").unwrap().chain().tip().unwrap().payload.clone();

        let report = inject(&mut set, "Node_C", FaultKind::Hash).unwrap();
        let target = set.get("Node_C").unwrap();

        assert_eq!(target.chain().tip().unwrap().payload, payload);
        assert_ne!(report.before, report.after);
        assert!(matches!(
            target.chain().verify(),
            Err(Error::TamperedBlock { sequence: 1 })
        ));
    }

    #[test]
    fn test_other_replicas_untouched() {
        let mut set = set_with_one_block();
        let untouched = set.get("Node_A").unwrap().chain().clone();

        inject(&mut set, "Node_B", FaultKind::Payload).unwrap();
        inject(&mut set, "Node_C", FaultKind::Hash).unwrap();

        assert_eq!(set.get("Node_A").unwrap().chain(), &untouched);
        assert!(set.get("Node_A").unwrap().chain().is_valid());
    }

    #[test]
    fn test_corrupt_genesis_only_chain() {
        let mut set = ReplicaSet::from_genesis(&genesis_block(), ["Node_A"]).unwrap();
        let report = inject(&mut set, "Node_A", FaultKind::Payload).unwrap();
        assert_eq!(report.sequence, 0);
        assert!(!set.get("Node_A").unwrap().chain().is_valid());
    }

    #[test]
    fn test_empty_and_unknown_targets() {
        let mut empty = Replica::with_default_secret("Node_A", Chain::empty());
        assert!(matches!(corrupt_hash(&mut empty), Err(Error::EmptyChain)));
        assert!(matches!(corrupt_payload(&mut empty), Err(Error::EmptyChain)));

        let mut set = set_with_one_block();
        assert!(matches!(
            inject(&mut set, "Node_Z", FaultKind::Hash),
            Err(Error::UnknownReplica(_))
        ));
    }
}
