//! Proof-of-Authority rounds: propose, vote, commit
//!
//! A round moves through `Proposed -> Voted -> {Committed | Rejected}` with
//! no retries. Missing the quorum is an ordinary [`CommitOutcome::Rejected`],
//! never an error. A commit validates the block against every signer
//! before the first chain is touched, so either the round lands everywhere
//! it is delivered or nowhere.

use crate::audit::{AuditAction, AuditEvent};
use crate::integrity;
use crate::transport::VoteTransport;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartlog_ledger::crypto::hash_block;
use smartlog_ledger::{Block, Hash, Payload, Replica, ReplicaSet, Tip};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Why a replica refused to sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Replica tip differs from the proposal's previous hash
    TipMismatch,
    /// Remote replica computed a different candidate hash
    HashMismatch,
    /// Remote replica could not be reached
    Unreachable,
    /// Remote replica did not answer in time
    Timeout,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::TipMismatch => "tip_mismatch",
            RejectReason::HashMismatch => "hash_mismatch",
            RejectReason::Unreachable => "unreachable",
            RejectReason::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// One replica's answer to a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Vote {
    /// Affirmative vote carrying the replica's signature over the candidate hash
    Signed {
        /// Signer token
        signature: String,
    },
    /// Rejection marker
    Rejected {
        /// Reason for rejecting
        reason: RejectReason,
    },
}

impl Vote {
    /// Rejection with the given reason
    pub fn rejected(reason: RejectReason) -> Self {
        Vote::Rejected { reason }
    }

    /// True for a signed vote
    pub fn is_affirmative(&self) -> bool {
        matches!(self, Vote::Signed { .. })
    }
}

/// Round state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Candidate computed, no votes yet
    Proposed,
    /// Votes collected
    Voted,
    /// Quorum reached and block appended
    Committed,
    /// Quorum missed
    Rejected,
}

/// Candidate block in flight
///
/// Never stored in a chain; [`commit`] consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Proposing replica
    pub proposer: String,

    /// Events carried by the candidate block
    pub payload: Payload,

    /// Tip the candidate links to
    pub previous_hash: Hash,

    /// Hash of the candidate block
    pub candidate_hash: Hash,

    /// Fresh token bound into the candidate hash
    pub transaction_id: Uuid,

    /// Votes by replica name
    pub votes: BTreeMap<String, Vote>,

    /// Round state
    pub status: RoundStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    /// Number of signed votes from any voter
    pub fn affirmative_votes(&self) -> usize {
        self.votes.values().filter(|v| v.is_affirmative()).count()
    }

    /// Replace the vote map and mark the proposal voted
    pub fn record_votes(&mut self, votes: BTreeMap<String, Vote>) {
        self.votes = votes;
        self.status = RoundStatus::Voted;
    }
}

/// Create a proposal with a fresh transaction id and an empty vote map
///
/// The transaction id is random, so re-proposing identical content yields a
/// different candidate hash.
pub fn propose(proposer: impl Into<String>, payload: Payload, previous_hash: Hash) -> Proposal {
    let transaction_id = Uuid::new_v4();
    let candidate_hash = hash_block(&payload, &transaction_id, &previous_hash);
    let proposer = proposer.into();

    tracing::debug!(
        proposer = %proposer,
        %transaction_id,
        candidate = %candidate_hash.short(),
        events = payload.event_count(),
        "Proposal created"
    );

    Proposal {
        proposer,
        payload,
        previous_hash,
        candidate_hash,
        transaction_id,
        votes: BTreeMap::new(),
        status: RoundStatus::Proposed,
        created_at: Utc::now(),
    }
}

/// Voting rule applied by each replica
///
/// A replica signs the candidate iff its own tip equals `previous_hash`.
pub fn cast_vote(replica: &Replica, previous_hash: &Hash, candidate_hash: &Hash) -> Vote {
    if replica.tip_hash().is(previous_hash) {
        Vote::Signed {
            signature: replica.sign(candidate_hash),
        }
    } else {
        Vote::rejected(RejectReason::TipMismatch)
    }
}

/// Collect one vote per replica in the set
pub fn vote(mut proposal: Proposal, replicas: &ReplicaSet) -> Proposal {
    let votes = replicas
        .iter()
        .map(|replica| {
            let vote = cast_vote(replica, &proposal.previous_hash, &proposal.candidate_hash);
            (replica.name().to_string(), vote)
        })
        .collect();
    proposal.record_votes(votes);

    tracing::debug!(
        transaction_id = %proposal.transaction_id,
        affirmative = proposal.affirmative_votes(),
        replicas = replicas.len(),
        "Votes collected"
    );
    proposal
}

/// Which replicas receive a committed block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Every replica, including those that voted to reject
    #[default]
    AllReplicas,
    /// Only replicas that signed; the rest lag until recovery
    SignersOnly,
}

/// Result of [`commit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Quorum reached
    Committed {
        /// Transaction id of the appended block
        transaction_id: Uuid,
        /// The appended block
        block: Block,
        /// Signed votes counted
        affirmative: usize,
        /// Required quorum
        quorum: usize,
        /// Replicas that received the block, in name order
        delivered_to: Vec<String>,
        /// Divergent non-signers whose chain was replaced by the agreed one
        caught_up: Vec<String>,
    },
    /// Quorum missed, no chain touched
    Rejected {
        /// Signed votes counted
        affirmative: usize,
        /// Required quorum
        quorum: usize,
    },
}

impl CommitOutcome {
    /// True when the block was appended
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    /// Transaction id of a committed block
    pub fn transaction_id(&self) -> Option<Uuid> {
        match self {
            CommitOutcome::Committed { transaction_id, .. } => Some(*transaction_id),
            CommitOutcome::Rejected { .. } => None,
        }
    }

    /// Signed votes counted
    pub fn affirmative(&self) -> usize {
        match self {
            CommitOutcome::Committed { affirmative, .. }
            | CommitOutcome::Rejected { affirmative, .. } => *affirmative,
        }
    }

    /// Audit record for this outcome
    pub fn audit_event(&self, actor: impl Into<String>) -> AuditEvent {
        match self {
            CommitOutcome::Committed {
                transaction_id,
                block,
                affirmative,
                quorum,
                delivered_to,
                caught_up,
            } => {
                let mut detail = format!(
                    "block {} ({}) committed with {affirmative}/{quorum} votes to {}; tx {transaction_id}",
                    block.sequence,
                    block.current_hash.short(),
                    delivered_to.join(", ")
                );
                if !caught_up.is_empty() {
                    detail.push_str(&format!("; caught up {}", caught_up.join(", ")));
                }
                AuditEvent::new(actor, AuditAction::ConsensusCommitted, detail)
            }
            CommitOutcome::Rejected {
                affirmative,
                quorum,
            } => AuditEvent::new(
                actor,
                AuditAction::ConsensusRejected,
                format!("proposal rejected: {affirmative}/{quorum} votes"),
            ),
        }
    }
}

/// Reject a quorum outside `1..=replicas`
pub fn check_quorum(quorum: usize, replicas: usize) -> Result<()> {
    if quorum == 0 || quorum > replicas {
        return Err(Error::InvalidQuorum { quorum, replicas });
    }
    Ok(())
}

/// Count the votes and, on quorum, append the block
///
/// Only signed votes from members of the set count. Every signer is checked
/// with [`smartlog_ledger::Chain::check_append`] before any append, so a
/// linkage failure leaves all chains untouched.
///
/// Under [`DeliveryPolicy::AllReplicas`] non-signers receive the block too.
/// One that still links to the previous hash gets a plain append; a
/// divergent one has its chain replaced by the signers' chain plus the new
/// block and is listed in `caught_up`.
pub fn commit(
    proposal: Proposal,
    replicas: &mut ReplicaSet,
    quorum: usize,
    policy: DeliveryPolicy,
) -> Result<CommitOutcome> {
    if replicas.is_empty() {
        return Err(Error::EmptySet);
    }
    check_quorum(quorum, replicas.len())?;

    let signers: Vec<String> = proposal
        .votes
        .iter()
        .filter(|(name, vote)| vote.is_affirmative() && replicas.contains(name))
        .map(|(name, _)| name.clone())
        .collect();
    let affirmative = signers.len();

    if affirmative < quorum {
        tracing::info!(
            transaction_id = %proposal.transaction_id,
            affirmative,
            quorum,
            "Proposal rejected"
        );
        return Ok(CommitOutcome::Rejected {
            affirmative,
            quorum,
        });
    }

    // Signers sit on the proposal's previous hash, so their length is the
    // next sequence number.
    let sequence = replicas.get(&signers[0])?.len() as u64;
    let block = Block::new(
        sequence,
        proposal.payload,
        proposal.previous_hash,
        proposal.transaction_id,
    );

    for name in &signers {
        replicas.get(name)?.chain().check_append(&block)?;
    }

    let mut agreed = replicas.get(&signers[0])?.chain().clone();
    agreed.append(block.clone())?;

    let targets: Vec<String> = match policy {
        DeliveryPolicy::AllReplicas => replicas.names().map(str::to_string).collect(),
        DeliveryPolicy::SignersOnly => signers.clone(),
    };

    let mut caught_up = Vec::new();
    for name in &targets {
        let replica = replicas.get_mut(name)?;
        if signers.contains(name) || replica.chain().check_append(&block).is_ok() {
            replica.append(block.clone())?;
        } else {
            tracing::warn!(
                replica = %name,
                tip = %replica.tip_hash(),
                sequence = block.sequence,
                "Divergent replica caught up to committed chain"
            );
            replica.replace_chain(agreed.clone());
            caught_up.push(name.clone());
        }
    }

    tracing::info!(
        transaction_id = %block.transaction_id,
        sequence = block.sequence,
        hash = %block.current_hash.short(),
        affirmative,
        quorum,
        delivered = targets.len(),
        caught_up = caught_up.len(),
        "Proposal committed"
    );

    Ok(CommitOutcome::Committed {
        transaction_id: block.transaction_id,
        block,
        affirmative,
        quorum,
        delivered_to: targets,
        caught_up,
    })
}

/// Votes and outcome of one round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    /// Proposing replica
    pub proposer: String,
    /// Candidate hash voted on
    pub candidate_hash: Hash,
    /// Votes by replica name
    pub votes: BTreeMap<String, Vote>,
    /// Commit result
    pub outcome: CommitOutcome,
}

/// Round driver holding the quorum and delivery policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusEngine {
    quorum: usize,
    delivery: DeliveryPolicy,
}

impl ConsensusEngine {
    /// Create an engine delivering to every replica
    pub fn new(quorum: usize) -> Self {
        Self {
            quorum,
            delivery: DeliveryPolicy::AllReplicas,
        }
    }

    /// Set the delivery policy
    pub fn with_delivery(mut self, delivery: DeliveryPolicy) -> Self {
        self.delivery = delivery;
        self
    }

    /// Required affirmative votes
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Delivery policy
    pub fn delivery(&self) -> DeliveryPolicy {
        self.delivery
    }

    /// Build a proposal on top of the set's majority tip
    pub fn propose_next(
        &self,
        replicas: &ReplicaSet,
        proposer: &str,
        payload: Payload,
    ) -> Result<Proposal> {
        if replicas.is_empty() {
            return Err(Error::EmptySet);
        }
        check_quorum(self.quorum, replicas.len())?;
        replicas.get(proposer)?;

        let previous_hash = match integrity::majority_hash(replicas)? {
            Tip::Block(hash) => hash,
            Tip::Empty => Hash::ZERO,
        };
        Ok(propose(proposer, payload, previous_hash))
    }

    /// Run a full round with in-process voting
    pub fn run_local(
        &self,
        replicas: &mut ReplicaSet,
        proposer: &str,
        payload: Payload,
    ) -> Result<RoundReport> {
        let proposal = vote(self.propose_next(replicas, proposer, payload)?, replicas);
        self.finish(proposal, replicas)
    }

    /// Run a full round, collecting votes and delivering through `transport`
    ///
    /// Delivery failures after a local commit are logged, not returned; the
    /// lagging replicas show up as divergent on the next inspection.
    pub async fn run_round(
        &self,
        replicas: &mut ReplicaSet,
        transport: &dyn VoteTransport,
        proposer: &str,
        payload: Payload,
    ) -> Result<RoundReport> {
        let mut proposal = self.propose_next(replicas, proposer, payload)?;
        let votes = transport.collect_votes(&proposal, replicas).await;
        proposal.record_votes(votes);

        let report = self.finish(proposal, replicas)?;
        if let CommitOutcome::Committed {
            block,
            delivered_to,
            ..
        } = &report.outcome
        {
            if let Err(e) = transport.deliver(block, delivered_to).await {
                tracing::warn!(
                    transport = transport.name(),
                    sequence = block.sequence,
                    error = %e,
                    "Block delivery incomplete"
                );
            }
        }
        Ok(report)
    }

    fn finish(&self, proposal: Proposal, replicas: &mut ReplicaSet) -> Result<RoundReport> {
        let proposer = proposal.proposer.clone();
        let candidate_hash = proposal.candidate_hash;
        let votes = proposal.votes.clone();
        let outcome = commit(proposal, replicas, self.quorum, self.delivery)?;
        Ok(RoundReport {
            proposer,
            candidate_hash,
            votes,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartlog_ledger::{fault, genesis_block, Event, FaultKind, RiskLevel, Stage};

    fn replicas() -> ReplicaSet {
        ReplicaSet::from_genesis(&genesis_block(), ["Node_A", "Node_B", "Node_C"]).unwrap()
    }

    fn batch() -> Payload {
        vec![
            Event::new("1001", "Depot_SP", "Center_RJ", Stage::Departed, RiskLevel::Low),
            Event::new("1002", "Depot_SP", "Center_MG", Stage::InTransit, RiskLevel::Medium),
        ]
        .into()
    }

    fn tip(set: &ReplicaSet) -> Hash {
        set.get("Node_A").unwrap().chain().tip_block_hash().unwrap()
    }

    #[test]
    fn test_propose_computes_candidate() {
        let prev = genesis_block().current_hash;
        let proposal = propose("Node_A", batch(), prev);

        assert_eq!(proposal.status, RoundStatus::Proposed);
        assert!(proposal.votes.is_empty());
        assert_eq!(
            proposal.candidate_hash,
            hash_block(&proposal.payload, &proposal.transaction_id, &prev)
        );
    }

    #[test]
    fn test_repeated_proposals_differ() {
        let prev = genesis_block().current_hash;
        let a = propose("Node_A", batch(), prev);
        let b = propose("Node_A", batch(), prev);
        assert_ne!(a.candidate_hash, b.candidate_hash);
    }

    #[test]
    fn test_vote_signs_on_matching_tip() {
        let set = replicas();
        let proposal = vote(propose("Node_A", batch(), tip(&set)), &set);

        assert_eq!(proposal.status, RoundStatus::Voted);
        assert_eq!(proposal.affirmative_votes(), 3);
        let Vote::Signed { signature } = &proposal.votes["Node_B"] else {
            panic!("expected signature");
        };
        assert!(set
            .get("Node_B")
            .unwrap()
            .signer()
            .verify(&proposal.candidate_hash, signature));
    }

    #[test]
    fn test_vote_rejects_on_stale_tip() {
        let mut set = replicas();
        fault::inject(&mut set, "Node_C", FaultKind::Hash).unwrap();

        let proposal = vote(propose("Node_A", batch(), tip(&set)), &set);
        assert_eq!(
            proposal.votes["Node_C"],
            Vote::rejected(RejectReason::TipMismatch)
        );
        assert_eq!(proposal.affirmative_votes(), 2);
    }

    #[test]
    fn test_commit_appends_to_all() {
        let mut set = replicas();
        let proposal = vote(propose("Node_A", batch(), tip(&set)), &set);
        let candidate = proposal.candidate_hash;

        let outcome = commit(proposal, &mut set, 2, DeliveryPolicy::AllReplicas).unwrap();
        assert!(outcome.is_committed());
        assert!(outcome.transaction_id().is_some());
        for replica in set.iter() {
            assert_eq!(replica.len(), 2);
            assert_eq!(replica.tip_hash(), Tip::Block(candidate));
        }
    }

    #[test]
    fn test_commit_below_quorum_is_rejected() {
        let mut set = replicas();
        let before = set.tip_hashes();
        let mut proposal = propose("Node_A", batch(), tip(&set));
        proposal.record_votes(BTreeMap::from([(
            "Node_A".to_string(),
            Vote::Signed {
                signature: "sig".into(),
            },
        )]));

        let outcome = commit(proposal, &mut set, 2, DeliveryPolicy::AllReplicas).unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Rejected {
                affirmative: 1,
                quorum: 2
            }
        );
        assert_eq!(outcome.transaction_id(), None);
        assert_eq!(set.tip_hashes(), before);
    }

    #[test]
    fn test_commit_validates_quorum() {
        let mut set = replicas();
        let proposal = propose("Node_A", batch(), tip(&set));
        let err = commit(proposal.clone(), &mut set, 0, DeliveryPolicy::AllReplicas).unwrap_err();
        assert!(matches!(err, Error::InvalidQuorum { quorum: 0, replicas: 3 }));

        let err = commit(proposal.clone(), &mut set, 4, DeliveryPolicy::AllReplicas).unwrap_err();
        assert!(matches!(err, Error::InvalidQuorum { quorum: 4, .. }));

        let err = commit(proposal, &mut ReplicaSet::default(), 1, DeliveryPolicy::AllReplicas)
            .unwrap_err();
        assert!(matches!(err, Error::EmptySet));
    }

    #[test]
    fn test_rejecting_replica_is_caught_up_on_commit() {
        let mut set = replicas();
        fault::inject(&mut set, "Node_C", FaultKind::Payload).unwrap();

        let proposal = vote(propose("Node_A", batch(), tip(&set)), &set);
        let candidate = proposal.candidate_hash;
        assert_eq!(proposal.affirmative_votes(), 2);

        let outcome = commit(proposal, &mut set, 2, DeliveryPolicy::AllReplicas).unwrap();
        let CommitOutcome::Committed {
            delivered_to,
            caught_up,
            ..
        } = &outcome
        else {
            panic!("expected commit, got {outcome:?}");
        };
        assert_eq!(delivered_to.len(), 3);
        assert_eq!(caught_up, &vec!["Node_C".to_string()]);
        for replica in set.iter() {
            assert_eq!(replica.tip_hash(), Tip::Block(candidate));
            assert_eq!(replica.len(), 2);
            assert!(replica.chain().is_valid());
        }
        assert!(outcome.audit_event("Node_A").detail.contains("caught up Node_C"));
    }

    #[test]
    fn test_signer_off_previous_hash_aborts_whole_commit() {
        let mut set = replicas();
        fault::inject(&mut set, "Node_C", FaultKind::Hash).unwrap();
        let before = set.tip_hashes();

        // A forged signature from the divergent replica
        let mut proposal = propose("Node_A", batch(), tip(&set));
        proposal.record_votes(BTreeMap::from([
            (
                "Node_A".to_string(),
                Vote::Signed {
                    signature: "sig".into(),
                },
            ),
            (
                "Node_C".to_string(),
                Vote::Signed {
                    signature: "sig".into(),
                },
            ),
        ]));

        let err = commit(proposal, &mut set, 2, DeliveryPolicy::AllReplicas).unwrap_err();
        assert!(matches!(
            err,
            Error::Ledger(smartlog_ledger::Error::InvalidLinkage { .. })
        ));
        assert_eq!(set.tip_hashes(), before);
    }

    #[test]
    fn test_signers_only_skips_rejecting_replica() {
        let mut set = replicas();
        fault::inject(&mut set, "Node_C", FaultKind::Hash).unwrap();
        let lagging = set.get("Node_C").unwrap().tip_hash();

        let proposal = vote(propose("Node_A", batch(), tip(&set)), &set);
        let outcome = commit(proposal, &mut set, 2, DeliveryPolicy::SignersOnly).unwrap();

        let CommitOutcome::Committed {
            delivered_to,
            caught_up,
            ..
        } = &outcome
        else {
            panic!("expected commit");
        };
        assert_eq!(delivered_to, &vec!["Node_A".to_string(), "Node_B".to_string()]);
        assert!(caught_up.is_empty());
        assert_eq!(set.get("Node_A").unwrap().len(), 2);
        assert_eq!(set.get("Node_C").unwrap().tip_hash(), lagging);
    }

    #[test]
    fn test_votes_from_strangers_do_not_count() {
        let mut set = replicas();
        let mut proposal = propose("Node_A", batch(), tip(&set));
        proposal.record_votes(BTreeMap::from([(
            "Node_Z".to_string(),
            Vote::Signed {
                signature: "sig".into(),
            },
        )]));

        let outcome = commit(proposal, &mut set, 1, DeliveryPolicy::AllReplicas).unwrap();
        assert!(!outcome.is_committed());
    }

    #[test]
    fn test_run_local_requires_member_proposer() {
        let mut set = replicas();
        let engine = ConsensusEngine::new(2);
        let err = engine.run_local(&mut set, "Node_Z", batch()).unwrap_err();
        assert!(matches!(
            err,
            Error::Ledger(smartlog_ledger::Error::UnknownReplica(_))
        ));
    }

    #[test]
    fn test_run_local_round() {
        let mut set = replicas();
        let report = ConsensusEngine::new(3).run_local(&mut set, "Node_B", batch()).unwrap();

        assert_eq!(report.proposer, "Node_B");
        assert_eq!(report.votes.len(), 3);
        assert!(report.outcome.is_committed());
        assert!(integrity::is_consistent(&set));
    }

    #[test]
    fn test_outcome_audit_events() {
        let rejected = CommitOutcome::Rejected {
            affirmative: 2,
            quorum: 3,
        };
        let event = rejected.audit_event("Node_A");
        assert_eq!(event.action, AuditAction::ConsensusRejected);
        assert_eq!(event.actor, "Node_A");
        assert!(event.detail.contains("2/3"));
    }
}
