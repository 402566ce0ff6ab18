//! Divergence detection and majority recovery
//!
//! Replicas are compared by tip only. The majority tip is the most frequent
//! one; on a tie the smallest [`Tip`] wins (`Empty` first, then by digest
//! bytes). That tie-break is arbitrary and carries no security meaning.
//!
//! [`recover`] overwrites whole chains and must not interleave with a
//! commit on the same set. The network actor serializes both.

use crate::audit::{AuditAction, AuditEvent};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use smartlog_ledger::{ReplicaSet, Tip};
use std::collections::{BTreeMap, BTreeSet};

/// True iff every replica has the same tip
pub fn is_consistent(replicas: &ReplicaSet) -> bool {
    let mut tips = replicas.iter().map(|r| r.tip_hash());
    match tips.next() {
        Some(first) => tips.all(|tip| tip == first),
        None => true,
    }
}

/// Most frequent tip across the set
pub fn majority_hash(replicas: &ReplicaSet) -> Result<Tip> {
    let mut counts: BTreeMap<Tip, usize> = BTreeMap::new();
    for replica in replicas.iter() {
        *counts.entry(replica.tip_hash()).or_default() += 1;
    }

    // Ascending iteration plus strict comparison keeps the smallest tip on ties
    let mut best: Option<(Tip, usize)> = None;
    for (tip, count) in counts {
        if best.map_or(true, |(_, n)| count > n) {
            best = Some((tip, count));
        }
    }
    best.map(|(tip, _)| tip).ok_or(Error::EmptySet)
}

/// Names of replicas whose tip differs from the majority
pub fn corrupted_replicas(replicas: &ReplicaSet) -> Result<BTreeSet<String>> {
    let majority = majority_hash(replicas)?;
    Ok(off_majority(replicas, majority))
}

fn off_majority(replicas: &ReplicaSet, majority: Tip) -> BTreeSet<String> {
    replicas
        .iter()
        .filter(|r| r.tip_hash() != majority)
        .map(|r| r.name().to_string())
        .collect()
}

/// Consistency snapshot of a set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceReport {
    /// Whether all tips agree
    pub consistent: bool,
    /// Majority tip
    pub majority: Tip,
    /// Replicas off the majority
    pub corrupted: BTreeSet<String>,
}

impl DivergenceReport {
    /// Audit record, only when replicas diverge
    pub fn audit_event(&self, actor: impl Into<String>) -> Option<AuditEvent> {
        if self.consistent {
            return None;
        }
        let names: Vec<&str> = self.corrupted.iter().map(String::as_str).collect();
        Some(AuditEvent::new(
            actor,
            AuditAction::DivergenceDetected,
            format!("divergent replicas: {} (majority {})", names.join(", "), self.majority),
        ))
    }
}

/// Compute consistency, majority and divergent replicas in one pass
pub fn inspect(replicas: &ReplicaSet) -> Result<DivergenceReport> {
    let majority = majority_hash(replicas)?;
    let corrupted = off_majority(replicas, majority);

    if !corrupted.is_empty() {
        tracing::warn!(
            majority = %majority,
            divergent = corrupted.len(),
            "Replica divergence detected"
        );
    }

    Ok(DivergenceReport {
        consistent: corrupted.is_empty(),
        majority,
        corrupted,
    })
}

/// Per-replica audit row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSummary {
    /// Replica name
    pub name: String,
    /// Current tip
    pub tip: Tip,
    /// Chain length
    pub length: usize,
    /// Result of full chain verification
    pub valid: bool,
}

/// One row per replica, in name order
pub fn summarize(replicas: &ReplicaSet) -> Vec<ReplicaSummary> {
    replicas
        .iter()
        .map(|r| ReplicaSummary {
            name: r.name().to_string(),
            tip: r.tip_hash(),
            length: r.len(),
            valid: r.chain().is_valid(),
        })
        .collect()
}

/// What a recovery overwrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Replica whose chain was copied
    pub source: String,
    /// Tip every replica now shares
    pub majority: Tip,
    /// Replicas whose chain was replaced
    pub restored: Vec<String>,
}

impl RecoveryReport {
    /// Audit record for this recovery
    pub fn audit_event(&self, actor: impl Into<String>) -> AuditEvent {
        let detail = if self.restored.is_empty() {
            format!("no divergent replicas (source {})", self.source)
        } else {
            format!(
                "restored {} from {} (tip {})",
                self.restored.join(", "),
                self.source,
                self.majority
            )
        };
        AuditEvent::new(actor, AuditAction::ReplicasRecovered, detail)
    }
}

/// Replace every chain off `majority` with a copy of a majority chain
pub fn recover(replicas: &mut ReplicaSet, majority: Tip) -> Result<RecoveryReport> {
    let source = replicas
        .iter()
        .find(|r| r.tip_hash() == majority)
        .ok_or(Error::NoValidSource(majority))?;
    let source_name = source.name().to_string();
    let source_chain = source.chain().clone();

    if !source_chain.is_valid() {
        tracing::warn!(source = %source_name, "Recovery source chain fails verification");
    }

    let mut restored = Vec::new();
    for replica in replicas.iter_mut() {
        if replica.tip_hash() != majority {
            replica.replace_chain(source_chain.clone());
            restored.push(replica.name().to_string());
        }
    }

    tracing::info!(
        source = %source_name,
        majority = %majority,
        restored = restored.len(),
        "Replicas recovered"
    );

    Ok(RecoveryReport {
        source: source_name,
        majority,
        restored,
    })
}
