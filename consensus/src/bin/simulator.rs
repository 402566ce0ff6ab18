//! Replica Network Simulator
//!
//! Scripted walk through one simulation session: seed the replicas, commit
//! a batch, tamper with a replica, detect the divergence and recover.
//!
//! Configuration comes from `SMARTLOG_CONFIG` (TOML) or `SMARTLOG_*`
//! variables. `SMARTLOG_EVENTS` may point at a JSON array of events used to
//! seed the chain.

use anyhow::Context;
use smartlog_consensus::config::TransportMode;
use smartlog_consensus::{
    Config, ConsensusEngine, HttpTransport, InProcessTransport, Metrics, NetworkActor,
    NetworkHandle, TracingAuditSink, VoteTransport,
};
use smartlog_ledger::{Chain, ChainStore, Event, FaultKind, Payload, ReplicaSet, RiskLevel, Stage};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = if let Ok(config_path) = std::env::var("SMARTLOG_CONFIG") {
        Config::from_file(&config_path)?
    } else {
        Config::from_env()?
    };

    let seed_events = match std::env::var("SMARTLOG_EVENTS") {
        Ok(path) => {
            let content =
                std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str::<Vec<Event>>(&content)
                .with_context(|| format!("parsing {path}"))?
        }
        Err(_) => sample_events(),
    };

    let seeded = Chain::seeded(seed_events, config.ledger.seed.max_blocks)?;
    let replicas = ReplicaSet::from_chain(&seeded, config.ledger.node_names.iter().cloned())?;
    info!(
        replicas = replicas.len(),
        blocks = seeded.len(),
        quorum = config.quorum,
        "Replica set created"
    );

    let transport: Arc<dyn VoteTransport> = match config.transport.mode {
        TransportMode::InProcess => Arc::new(InProcessTransport),
        TransportMode::Http => Arc::new(HttpTransport::new(
            config.transport.endpoints.clone(),
            config.transport.timeout(),
        )?),
    };

    let metrics = Metrics::new()?;
    let engine = ConsensusEngine::new(config.quorum).with_delivery(config.delivery);
    let mut actor = NetworkActor::new(replicas, engine, transport, Arc::new(TracingAuditSink))
        .with_metrics(metrics.clone())
        .with_actor_name(config.node_id.clone());
    if config.ledger.storage.autosave {
        actor = actor.with_store(ChainStore::open(&config.ledger)?);
    }
    let network = actor.spawn();

    run_session(&network, &config).await?;

    tracing::debug!("Metrics:\n{}", metrics.export()?);
    network.shutdown().await?;
    Ok(())
}

async fn run_session(network: &NetworkHandle, config: &Config) -> anyhow::Result<()> {
    let proposer = config.node_id.as_str();

    // 1. Honest round
    let report = network.run_round(proposer, Payload::Batch(next_batch())).await?;
    info!(
        committed = report.outcome.is_committed(),
        votes = report.outcome.affirmative(),
        "Round finished"
    );

    // 2. Tamper with the last replica
    let Some(target) = config.ledger.node_names.last() else {
        return Ok(());
    };
    let fault = network.inject_fault(target.as_str(), FaultKind::Payload).await?;
    info!(replica = %fault.replica, sequence = fault.sequence, "Fault injected");

    // 3. Detect
    let divergence = network.inspect().await?;
    if divergence.consistent {
        info!("Replicas consistent");
    } else {
        warn!(corrupted = ?divergence.corrupted, majority = %divergence.majority, "Divergence");
    }

    // 4. A round against the divergent set
    match network.run_round(proposer, Payload::Batch(next_batch())).await {
        Ok(report) => info!(
            committed = report.outcome.is_committed(),
            votes = report.outcome.affirmative(),
            "Round finished"
        ),
        Err(e) => warn!("Round aborted: {}", e),
    }

    // 5. Recover and commit again
    let recovery = network.recover().await?;
    info!(source = %recovery.source, restored = ?recovery.restored, "Recovery finished");

    let report = network.run_round(proposer, Payload::Batch(next_batch())).await?;
    info!(
        committed = report.outcome.is_committed(),
        votes = report.outcome.affirmative(),
        "Round finished"
    );

    for row in network.summarize().await? {
        info!(
            replica = %row.name,
            length = row.length,
            tip = %row.tip,
            valid = row.valid,
            "Replica"
        );
    }
    Ok(())
}

fn next_batch() -> Vec<Event> {
    let id = uuid::Uuid::new_v4().simple().to_string();
    vec![
        Event::new(
            format!("{}-1", &id[..8]),
            "Depot_SP",
            "Center_RJ",
            Stage::Departed,
            RiskLevel::Low,
        ),
        Event::new(
            format!("{}-2", &id[..8]),
            "Depot_SP",
            "Center_MG",
            Stage::InTransit,
            RiskLevel::Medium,
        ),
    ]
}

fn sample_events() -> Vec<Event> {
    let routes = [
        ("Depot_SP", "Center_RJ"),
        ("Depot_PR", "Center_SC"),
        ("Depot_MG", "Center_BA"),
        ("Depot_RS", "Center_SP"),
    ];
    let stages = [Stage::Departed, Stage::InTransit, Stage::Arrived];
    let risks = [RiskLevel::Low, RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    (0..12)
        .map(|i| {
            let (origin, destination) = routes[i % routes.len()];
            Event::new(
                format!("{}", 1000 + i),
                origin,
                destination,
                stages[i % stages.len()],
                risks[i % risks.len()],
            )
        })
        .collect()
}
