//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for the replica network.
//!
//! # Metrics
//!
//! - `smartlog_rounds_committed_total` - Rounds that reached quorum
//! - `smartlog_rounds_rejected_total` - Rounds that missed quorum
//! - `smartlog_faults_injected_total` - Deliberate tamperings
//! - `smartlog_recoveries_total` - Majority recoveries run
//! - `smartlog_divergent_replicas` - Replicas off the majority tip at last inspection
//! - `smartlog_round_duration_seconds` - Histogram of round latencies
//!
//! Everything is registered on a private [`Registry`], so several collectors
//! can live in one process.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Rounds committed
    pub rounds_committed: IntCounter,

    /// Rounds rejected
    pub rounds_rejected: IntCounter,

    /// Faults injected
    pub faults_injected: IntCounter,

    /// Recoveries run
    pub recoveries: IntCounter,

    /// Divergent replicas at last inspection
    pub divergent_replicas: IntGauge,

    /// Round duration histogram
    pub round_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("rounds_committed", &self.rounds_committed.get())
            .field("rounds_rejected", &self.rounds_rejected.get())
            .field("faults_injected", &self.faults_injected.get())
            .field("recoveries", &self.recoveries.get())
            .field("divergent_replicas", &self.divergent_replicas.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let rounds_committed = IntCounter::new(
            "smartlog_rounds_committed_total",
            "Rounds that reached quorum",
        )?;
        registry.register(Box::new(rounds_committed.clone()))?;

        let rounds_rejected = IntCounter::new(
            "smartlog_rounds_rejected_total",
            "Rounds that missed quorum",
        )?;
        registry.register(Box::new(rounds_rejected.clone()))?;

        let faults_injected = IntCounter::new(
            "smartlog_faults_injected_total",
            "Deliberate tamperings",
        )?;
        registry.register(Box::new(faults_injected.clone()))?;

        let recoveries = IntCounter::new("smartlog_recoveries_total", "Majority recoveries run")?;
        registry.register(Box::new(recoveries.clone()))?;

        let divergent_replicas = IntGauge::new(
            "smartlog_divergent_replicas",
            "Replicas off the majority tip at last inspection",
        )?;
        registry.register(Box::new(divergent_replicas.clone()))?;

        let round_duration = Histogram::with_opts(
            HistogramOpts::new(
                "smartlog_round_duration_seconds",
                "Histogram of round latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0]),
        )?;
        registry.register(Box::new(round_duration.clone()))?;

        Ok(Self {
            rounds_committed,
            rounds_rejected,
            faults_injected,
            recoveries,
            divergent_replicas,
            round_duration,
            registry,
        })
    }

    /// Record a round result
    pub fn record_round(&self, committed: bool, duration_seconds: f64) {
        if committed {
            self.rounds_committed.inc();
        } else {
            self.rounds_rejected.inc();
        }
        self.round_duration.observe(duration_seconds);
    }

    /// Record fault injection
    pub fn record_fault(&self) {
        self.faults_injected.inc();
    }

    /// Record recovery
    pub fn record_recovery(&self) {
        self.recoveries.inc();
    }

    /// Update divergent replica count
    pub fn update_divergent(&self, count: usize) {
        self.divergent_replicas.set(count as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render in the Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.rounds_committed.get(), 0);
    }

    #[test]
    fn test_collectors_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_round(true, 0.01);
        assert_eq!(a.rounds_committed.get(), 1);
        assert_eq!(b.rounds_committed.get(), 0);
    }

    #[test]
    fn test_export_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.record_round(false, 0.002);
        metrics.record_fault();
        metrics.update_divergent(1);

        let text = metrics.export().unwrap();
        assert!(text.contains("smartlog_rounds_rejected_total 1"));
        assert!(text.contains("smartlog_divergent_replicas 1"));
    }
}
