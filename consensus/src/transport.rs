//! Vote collection and block delivery
//!
//! The engine does not care where votes come from. [`InProcessTransport`]
//! applies [`cast_vote`] to the local replicas; [`HttpTransport`] fans a
//! `POST /proposal` out to every node service and pushes committed blocks
//! with `POST /block`. Remote failures never abort a round: they become
//! rejection votes.

use crate::engine::{cast_vote, Proposal, RejectReason, Vote};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use smartlog_ledger::{Block, Hash, Payload, ReplicaSet};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Source of votes and sink of committed blocks
#[async_trait]
pub trait VoteTransport: Send + Sync {
    /// Short transport name for logs
    fn name(&self) -> &'static str;

    /// One vote per replica in `replicas`
    async fn collect_votes(&self, proposal: &Proposal, replicas: &ReplicaSet)
        -> BTreeMap<String, Vote>;

    /// Push a committed block to the named replicas
    async fn deliver(&self, block: &Block, targets: &[String]) -> Result<()>;
}

/// Votes computed against the local replica set
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessTransport;

#[async_trait]
impl VoteTransport for InProcessTransport {
    fn name(&self) -> &'static str {
        "in_process"
    }

    async fn collect_votes(
        &self,
        proposal: &Proposal,
        replicas: &ReplicaSet,
    ) -> BTreeMap<String, Vote> {
        replicas
            .iter()
            .map(|replica| {
                let vote = cast_vote(replica, &proposal.previous_hash, &proposal.candidate_hash);
                (replica.name().to_string(), vote)
            })
            .collect()
    }

    async fn deliver(&self, _block: &Block, _targets: &[String]) -> Result<()> {
        // Commit already appended to the local chains
        Ok(())
    }
}

/// Body of `POST /proposal`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Proposing replica
    pub proposer: String,
    /// Candidate payload
    pub payload: Payload,
    /// Tip the candidate links to
    pub previous_hash: Hash,
    /// Transaction id bound into the candidate hash
    pub transaction_id: Uuid,
}

impl From<&Proposal> for VoteRequest {
    fn from(proposal: &Proposal) -> Self {
        Self {
            proposer: proposal.proposer.clone(),
            payload: proposal.payload.clone(),
            previous_hash: proposal.previous_hash,
            transaction_id: proposal.transaction_id,
        }
    }
}

/// Reply to `POST /proposal`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    /// Answering node
    pub node: String,
    /// Its vote
    pub vote: Vote,
    /// Candidate hash as the node computed it
    pub current_hash: Hash,
}

/// Votes gathered from remote node services
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoints: BTreeMap<String, String>,
    client: Client,
}

impl HttpTransport {
    /// Create a transport over `name -> base URL` endpoints
    pub fn new(endpoints: BTreeMap<String, String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { endpoints, client })
    }

    /// Configured endpoints
    pub fn endpoints(&self) -> &BTreeMap<String, String> {
        &self.endpoints
    }

    async fn request_vote(
        &self,
        name: &str,
        request: &VoteRequest,
        candidate: &Hash,
    ) -> Vote {
        let Some(base_url) = self.endpoints.get(name) else {
            tracing::warn!(replica = %name, "No endpoint configured");
            return Vote::rejected(RejectReason::Unreachable);
        };
        let url = format!("{}/proposal", base_url.trim_end_matches('/'));

        let response = match self.client.post(&url).json(request).send().await {
            Ok(response) => response,
            Err(e) => return Self::rejection(name, &e),
        };
        if !response.status().is_success() {
            tracing::warn!(replica = %name, status = %response.status(), "Vote request refused");
            return Vote::rejected(RejectReason::Unreachable);
        }

        match response.json::<VoteResponse>().await {
            Ok(reply) if reply.current_hash != *candidate => {
                tracing::warn!(
                    replica = %name,
                    expected = %candidate.short(),
                    found = %reply.current_hash.short(),
                    "Remote candidate hash differs"
                );
                Vote::rejected(RejectReason::HashMismatch)
            }
            Ok(reply) => reply.vote,
            Err(e) => Self::rejection(name, &e),
        }
    }

    fn rejection(name: &str, err: &reqwest::Error) -> Vote {
        if err.is_timeout() {
            tracing::warn!(replica = %name, "Vote request timed out");
            Vote::rejected(RejectReason::Timeout)
        } else {
            tracing::warn!(replica = %name, error = %err, "Vote request failed");
            Vote::rejected(RejectReason::Unreachable)
        }
    }

    async fn push_block(&self, name: &str, block: &Block) -> Result<()> {
        let base_url = self
            .endpoints
            .get(name)
            .ok_or_else(|| Error::Transport(format!("No endpoint for {name}")))?;
        let url = format!("{}/block", base_url.trim_end_matches('/'));

        let response = self.client.post(&url).json(block).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "{name} refused block {} with status {}: {}",
                block.sequence, status, error_text
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VoteTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn collect_votes(
        &self,
        proposal: &Proposal,
        replicas: &ReplicaSet,
    ) -> BTreeMap<String, Vote> {
        let request = VoteRequest::from(proposal);
        let names: Vec<&str> = replicas.names().collect();

        let votes = join_all(
            names
                .iter()
                .map(|name| self.request_vote(name, &request, &proposal.candidate_hash)),
        )
        .await;

        names
            .into_iter()
            .map(str::to_string)
            .zip(votes)
            .collect()
    }

    async fn deliver(&self, block: &Block, targets: &[String]) -> Result<()> {
        let results = join_all(targets.iter().map(|name| self.push_block(name, block))).await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Transport(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::propose;
    use smartlog_ledger::{fault, genesis_block, FaultKind};

    #[tokio::test]
    async fn test_in_process_votes_follow_tips() {
        let mut set =
            ReplicaSet::from_genesis(&genesis_block(), ["Node_A", "Node_B", "Node_C"]).unwrap();
        fault::inject(&mut set, "Node_B", FaultKind::Hash).unwrap();

        let proposal = propose("Node_A", Payload::Batch(Vec::new()), genesis_block().current_hash);
        let votes = InProcessTransport.collect_votes(&proposal, &set).await;

        assert_eq!(votes.len(), 3);
        assert!(votes["Node_A"].is_affirmative());
        assert_eq!(votes["Node_B"], Vote::rejected(RejectReason::TipMismatch));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_unreachable() {
        let set = ReplicaSet::from_genesis(&genesis_block(), ["Node_A"]).unwrap();
        let transport = HttpTransport::new(BTreeMap::new(), Duration::from_millis(200)).unwrap();

        let proposal = propose("Node_A", Payload::Batch(Vec::new()), genesis_block().current_hash);
        let votes = transport.collect_votes(&proposal, &set).await;

        assert_eq!(votes["Node_A"], Vote::rejected(RejectReason::Unreachable));
    }

    #[test]
    fn test_vote_wire_format() {
        let vote = Vote::Signed {
            signature: "abc".into(),
        };
        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "signed", "signature": "abc"}));

        let rejected: Vote =
            serde_json::from_value(serde_json::json!({"kind": "rejected", "reason": "timeout"}))
                .unwrap();
        assert_eq!(rejected, Vote::rejected(RejectReason::Timeout));
    }
}
