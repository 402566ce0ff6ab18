//! Actor owning the replica network
//!
//! Rounds, fault injection and recovery all mutate the same [`ReplicaSet`]
//! and must never interleave. One task owns the set and processes its
//! mailbox in order; callers talk to it through a cloneable
//! [`NetworkHandle`].
//!
//! ```text
//!   NetworkHandle (Clone) ──mpsc (bounded)──▶ NetworkActor
//!                                              ├─ ReplicaSet
//!                                              ├─ ConsensusEngine + VoteTransport
//!                                              ├─ AuditSink, Metrics
//!                                              └─ ChainStore (optional autosave)
//! ```

use crate::audit::{AuditEvent, AuditSink};
use crate::engine::{ConsensusEngine, RoundReport};
use crate::integrity::{self, DivergenceReport, RecoveryReport, ReplicaSummary};
use crate::metrics::Metrics;
use crate::transport::VoteTransport;
use crate::{Error, Result};
use smartlog_ledger::{fault, Chain, ChainStore, FaultKind, FaultReport, Payload, ReplicaSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the network actor
#[derive(Debug)]
pub enum NetworkMessage {
    /// Run one propose/vote/commit round
    RunRound {
        /// Proposing replica
        proposer: String,
        /// Events to commit
        payload: Payload,
        /// Reply channel
        response: oneshot::Sender<Result<RoundReport>>,
    },

    /// Tamper with one replica
    InjectFault {
        /// Target replica
        replica: String,
        /// Kind of tampering
        kind: FaultKind,
        /// Reply channel
        response: oneshot::Sender<Result<FaultReport>>,
    },

    /// Compare replica tips
    Inspect {
        /// Reply channel
        response: oneshot::Sender<Result<DivergenceReport>>,
    },

    /// Restore divergent replicas from the majority
    Recover {
        /// Reply channel
        response: oneshot::Sender<Result<RecoveryReport>>,
    },

    /// Per-replica audit rows
    Summarize {
        /// Reply channel
        response: oneshot::Sender<Vec<ReplicaSummary>>,
    },

    /// Copy of one replica's chain
    GetChain {
        /// Replica name
        replica: String,
        /// Reply channel
        response: oneshot::Sender<Result<Chain>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the replica set
pub struct NetworkActor {
    replicas: ReplicaSet,
    engine: ConsensusEngine,
    transport: Arc<dyn VoteTransport>,
    audit: Arc<dyn AuditSink>,
    metrics: Option<Metrics>,
    store: Option<ChainStore>,
    actor_name: String,
}

impl std::fmt::Debug for NetworkActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkActor")
            .field("replicas", &self.replicas.len())
            .field("engine", &self.engine)
            .field("transport", &self.transport.name())
            .field("actor_name", &self.actor_name)
            .finish()
    }
}

impl NetworkActor {
    /// Create new actor
    pub fn new(
        replicas: ReplicaSet,
        engine: ConsensusEngine,
        transport: Arc<dyn VoteTransport>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            replicas,
            engine,
            transport,
            audit,
            metrics: None,
            store: None,
            actor_name: "network".to_string(),
        }
    }

    /// Record Prometheus metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Save every replica after each mutation
    pub fn with_store(mut self, store: ChainStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Actor name written into audit events
    pub fn with_actor_name(mut self, name: impl Into<String>) -> Self {
        self.actor_name = name.into();
        self
    }

    /// Spawn the actor loop and return its handle
    pub fn spawn(self) -> NetworkHandle {
        let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
        tokio::spawn(self.run(rx));
        NetworkHandle::new(tx)
    }

    /// Run the actor event loop
    pub async fn run(mut self, mut mailbox: mpsc::Receiver<NetworkMessage>) {
        while let Some(msg) = mailbox.recv().await {
            match msg {
                NetworkMessage::Shutdown => break,
                msg => self.handle_message(msg).await,
            }
        }
        tracing::debug!(actor = %self.actor_name, "Network actor stopped");
    }

    /// Handle a single message
    async fn handle_message(&mut self, msg: NetworkMessage) {
        match msg {
            NetworkMessage::RunRound {
                proposer,
                payload,
                response,
            } => {
                let result = self.run_round(&proposer, payload).await;
                let _ = response.send(result);
            }

            NetworkMessage::InjectFault {
                replica,
                kind,
                response,
            } => {
                let result = self.inject_fault(&replica, kind);
                let _ = response.send(result);
            }

            NetworkMessage::Inspect { response } => {
                let _ = response.send(self.inspect());
            }

            NetworkMessage::Recover { response } => {
                let _ = response.send(self.recover());
            }

            NetworkMessage::Summarize { response } => {
                let _ = response.send(integrity::summarize(&self.replicas));
            }

            NetworkMessage::GetChain { replica, response } => {
                let result = self
                    .replicas
                    .get(&replica)
                    .map(|r| r.chain().clone())
                    .map_err(Error::from);
                let _ = response.send(result);
            }

            NetworkMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    async fn run_round(&mut self, proposer: &str, payload: Payload) -> Result<RoundReport> {
        let started = Instant::now();
        let report = self
            .engine
            .run_round(&mut self.replicas, self.transport.as_ref(), proposer, payload)
            .await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_round(report.outcome.is_committed(), started.elapsed().as_secs_f64());
        }
        self.audit.record(report.outcome.audit_event(proposer));
        if report.outcome.is_committed() {
            self.persist()?;
        }
        Ok(report)
    }

    fn inject_fault(&mut self, replica: &str, kind: FaultKind) -> Result<FaultReport> {
        let report = fault::inject(&mut self.replicas, replica, kind)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_fault();
        }
        self.audit
            .record(AuditEvent::fault_injected(&self.actor_name, &report));
        self.persist()?;
        Ok(report)
    }

    fn inspect(&mut self) -> Result<DivergenceReport> {
        let report = integrity::inspect(&self.replicas)?;

        if let Some(metrics) = &self.metrics {
            metrics.update_divergent(report.corrupted.len());
        }
        if let Some(event) = report.audit_event(&self.actor_name) {
            self.audit.record(event);
        }
        Ok(report)
    }

    fn recover(&mut self) -> Result<RecoveryReport> {
        let majority = integrity::majority_hash(&self.replicas)?;
        let report = integrity::recover(&mut self.replicas, majority)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_recovery();
            metrics.update_divergent(0);
        }
        self.audit.record(report.audit_event(&self.actor_name));
        self.persist()?;
        Ok(report)
    }

    fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        for replica in self.replicas.iter() {
            store.save(replica.name(), replica.chain())?;
        }
        Ok(())
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct NetworkHandle {
    sender: mpsc::Sender<NetworkMessage>,
}

impl NetworkHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<NetworkMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(&self, message: impl FnOnce(oneshot::Sender<T>) -> NetworkMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Run one round proposed by `proposer`
    pub async fn run_round(&self, proposer: impl Into<String>, payload: Payload) -> Result<RoundReport> {
        let proposer = proposer.into();
        self.call(|response| NetworkMessage::RunRound {
            proposer,
            payload,
            response,
        })
        .await?
    }

    /// Tamper with one replica
    pub async fn inject_fault(&self, replica: impl Into<String>, kind: FaultKind) -> Result<FaultReport> {
        let replica = replica.into();
        self.call(|response| NetworkMessage::InjectFault {
            replica,
            kind,
            response,
        })
        .await?
    }

    /// Compare replica tips
    pub async fn inspect(&self) -> Result<DivergenceReport> {
        self.call(|response| NetworkMessage::Inspect { response })
            .await?
    }

    /// Restore divergent replicas from the majority
    pub async fn recover(&self) -> Result<RecoveryReport> {
        self.call(|response| NetworkMessage::Recover { response })
            .await?
    }

    /// Per-replica audit rows
    pub async fn summarize(&self) -> Result<Vec<ReplicaSummary>> {
        self.call(|response| NetworkMessage::Summarize { response })
            .await
    }

    /// Copy of one replica's chain
    pub async fn chain(&self, replica: impl Into<String>) -> Result<Chain> {
        let replica = replica.into();
        self.call(|response| NetworkMessage::GetChain { replica, response })
            .await?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(NetworkMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn a network actor with in-memory defaults
pub fn spawn_network_actor(
    replicas: ReplicaSet,
    engine: ConsensusEngine,
    transport: Arc<dyn VoteTransport>,
    audit: Arc<dyn AuditSink>,
) -> NetworkHandle {
    NetworkActor::new(replicas, engine, transport, audit).spawn()
}
