//! HTTP service for one replica
//!
//! Routes:
//!
//! - `GET /status` - name, tip, length and verification result
//! - `POST /proposal` - vote on a [`VoteRequest`]
//! - `POST /block` - append a committed block
//! - `GET /chain` - chain as flat records

use crate::engine::cast_vote;
use crate::integrity::ReplicaSummary;
use crate::transport::{VoteRequest, VoteResponse};
use crate::Error;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use smartlog_ledger::crypto::hash_block;
use smartlog_ledger::storage::{to_records, ChainRecord};
use smartlog_ledger::{Block, ChainStore, Replica};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared state of a node service
#[derive(Debug)]
pub struct NodeState {
    replica: Mutex<Replica>,
    store: Option<ChainStore>,
}

impl NodeState {
    /// Serve `replica`, optionally saving its chain after every append
    pub fn new(replica: Replica, store: Option<ChainStore>) -> Arc<Self> {
        Arc::new(Self {
            replica: Mutex::new(replica),
            store,
        })
    }

    /// Copy of the served replica
    pub async fn snapshot(&self) -> Replica {
        self.replica.lock().await.clone()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Ledger(
                smartlog_ledger::Error::InvalidLinkage { .. }
                | smartlog_ledger::Error::SequenceMismatch { .. },
            ) => StatusCode::CONFLICT,
            Error::Ledger(smartlog_ledger::Error::TamperedBlock { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::Ledger(smartlog_ledger::Error::UnknownReplica(_)) => StatusCode::NOT_FOUND,
            Error::InvalidQuorum { .. } | Error::EmptySet => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(serde_json::json!({
                "error": self.to_string(),
                "timestamp": Utc::now(),
            })),
        )
            .into_response()
    }
}

/// Build the node router
pub fn router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/proposal", post(proposal))
        .route("/block", post(block))
        .route("/chain", get(chain))
        .with_state(state)
}

async fn status(State(state): State<Arc<NodeState>>) -> Json<ReplicaSummary> {
    let replica = state.replica.lock().await;
    Json(ReplicaSummary {
        name: replica.name().to_string(),
        tip: replica.tip_hash(),
        length: replica.len(),
        valid: replica.chain().is_valid(),
    })
}

async fn proposal(
    State(state): State<Arc<NodeState>>,
    Json(request): Json<VoteRequest>,
) -> Json<VoteResponse> {
    let replica = state.replica.lock().await;
    let candidate = hash_block(
        &request.payload,
        &request.transaction_id,
        &request.previous_hash,
    );
    let vote = cast_vote(&replica, &request.previous_hash, &candidate);

    tracing::info!(
        node = %replica.name(),
        proposer = %request.proposer,
        transaction_id = %request.transaction_id,
        affirmative = vote.is_affirmative(),
        "Vote cast"
    );

    Json(VoteResponse {
        node: replica.name().to_string(),
        vote,
        current_hash: candidate,
    })
}

async fn block(
    State(state): State<Arc<NodeState>>,
    Json(block): Json<Block>,
) -> Result<StatusCode, Error> {
    let mut replica = state.replica.lock().await;
    if !block.is_intact() {
        return Err(smartlog_ledger::Error::TamperedBlock {
            sequence: block.sequence,
        }
        .into());
    }
    replica.append(block)?;

    if let Some(store) = &state.store {
        store.save(replica.name(), replica.chain())?;
    }
    Ok(StatusCode::CREATED)
}

async fn chain(State(state): State<Arc<NodeState>>) -> Json<Vec<ChainRecord>> {
    let replica = state.replica.lock().await;
    Json(to_records(replica.chain()))
}
