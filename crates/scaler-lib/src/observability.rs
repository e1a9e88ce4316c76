//! Observability for the scaler
//!
//! Provides:
//! - Prometheus metrics (tick latency, failures, actions, replica gauges, model state)
//! - Structured JSON event logging, including the per-cycle decision log

use crate::models::DecisionRecord;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for tick latency (in seconds); refits land in the upper range
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    tick_latency_seconds: Histogram,
    ticks_total: IntCounter,
    tick_failures_total: IntCounterVec,
    scaling_actions_total: IntCounterVec,
    decisions_total: IntCounterVec,
    current_replicas: IntGauge,
    target_replicas: IntGauge,
    proposal_confidence: Gauge,
    weighted_score: Gauge,
    training_samples: IntGauge,
    model_trained: IntGauge,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "replica_scaler_tick_latency_seconds",
                "Time spent on one control loop tick",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            ticks_total: register_int_counter!(
                "replica_scaler_ticks_total",
                "Control loop ticks started"
            )
            .expect("Failed to register ticks_total"),

            tick_failures_total: register_int_counter_vec!(
                "replica_scaler_tick_failures_total",
                "Ticks that ended in an error, by error kind",
                &["kind"]
            )
            .expect("Failed to register tick_failures_total"),

            scaling_actions_total: register_int_counter_vec!(
                "replica_scaler_scaling_actions_total",
                "Resizes accepted by the scaling sink, by direction",
                &["direction"]
            )
            .expect("Failed to register scaling_actions_total"),

            decisions_total: register_int_counter_vec!(
                "replica_scaler_decisions_total",
                "Completed decision cycles, by proposal source",
                &["source"]
            )
            .expect("Failed to register decisions_total"),

            current_replicas: register_int_gauge!(
                "replica_scaler_current_replicas",
                "Replica count running at the last completed cycle"
            )
            .expect("Failed to register current_replicas"),

            target_replicas: register_int_gauge!(
                "replica_scaler_target_replicas",
                "Replica count proposed at the last completed cycle"
            )
            .expect("Failed to register target_replicas"),

            proposal_confidence: register_gauge!(
                "replica_scaler_proposal_confidence",
                "Confidence of the last adopted proposal"
            )
            .expect("Failed to register proposal_confidence"),

            weighted_score: register_gauge!(
                "replica_scaler_weighted_score",
                "Weighted rule-based score of the last cycle"
            )
            .expect("Failed to register weighted_score"),

            training_samples: register_int_gauge!(
                "replica_scaler_training_samples",
                "Samples in the regression model's training buffer"
            )
            .expect("Failed to register training_samples"),

            model_trained: register_int_gauge!(
                "replica_scaler_model_trained",
                "1 when the regression model has been fit"
            )
            .expect("Failed to register model_trained"),
        }
    }
}

/// Handle to the process-wide scaler metrics
///
/// Clones share the same underlying registry entries.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    pub fn inc_ticks(&self) {
        self.inner().ticks_total.inc();
    }

    pub fn inc_tick_failure(&self, kind: &str) {
        self.inner().tick_failures_total.with_label_values(&[kind]).inc();
    }

    /// Count an executed resize as "up" or "down"
    pub fn inc_scaling_action(&self, from: u32, to: u32) {
        let direction = if to > from { "up" } else { "down" };
        self.inner()
            .scaling_actions_total
            .with_label_values(&[direction])
            .inc();
    }

    /// Update gauges and counters from a completed cycle
    pub fn record_decision(&self, record: &DecisionRecord) {
        let inner = self.inner();
        inner
            .decisions_total
            .with_label_values(&[record.proposal.source.as_str()])
            .inc();
        inner.current_replicas.set(record.current_replicas as i64);
        inner.target_replicas.set(record.proposal.target_replicas as i64);
        inner.proposal_confidence.set(record.proposal.confidence);
        inner.weighted_score.set(record.proposal.scores.total_score);
    }

    pub fn set_model_state(&self, trained: bool, training_samples: usize) {
        self.inner().model_trained.set(trained as i64);
        self.inner().training_samples.set(training_samples as i64);
    }
}

/// Structured logger for scaler events
#[derive(Clone)]
pub struct StructuredLogger {
    workload: String,
}

impl StructuredLogger {
    /// `workload` identifies the scaled target, e.g. `namespace/deployment`
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
        }
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    /// Emit the decision log entry for a completed cycle
    pub fn log_decision(&self, record: &DecisionRecord) {
        let features = serde_json::to_string(&record.features).unwrap_or_default();
        let scores = serde_json::to_string(&record.proposal.scores).unwrap_or_default();
        info!(
            event = "scaling_decision",
            workload = %self.workload,
            timestamp = record.timestamp,
            current_replicas = record.current_replicas,
            proposed_replicas = record.proposal.target_replicas,
            source = %record.proposal.source,
            confidence = record.proposal.confidence,
            model_replicas = ?record.proposal.model_replicas,
            model_confidence = record.proposal.model_confidence,
            execute = record.decision.execute,
            target_replicas = record.decision.target_replicas,
            reason = %record.decision.reason,
            executed = record.executed,
            scores = %scores,
            features = %features,
            "Scaling decision"
        );
    }

    /// Log a tick abandoned because of a collaborator or contract failure
    pub fn log_tick_skipped(&self, kind: &str, error: &str) {
        if kind == "insufficient_data" {
            error!(
                event = "tick_skipped",
                workload = %self.workload,
                kind = %kind,
                error = %error,
                "Tick skipped on empty history"
            );
        } else {
            warn!(
                event = "tick_skipped",
                workload = %self.workload,
                kind = %kind,
                error = %error,
                "Tick skipped"
            );
        }
    }

    pub fn log_model_trained(&self, samples: usize, generation: u64) {
        info!(
            event = "model_trained",
            workload = %self.workload,
            samples = samples,
            generation = generation,
            "Regression model refit"
        );
    }

    pub fn log_startup(&self, version: &str, dry_run: bool) {
        info!(
            event = "scaler_started",
            workload = %self.workload,
            scaler_version = %version,
            dry_run = dry_run,
            "Replica scaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scaler_shutdown",
            workload = %self.workload,
            reason = %reason,
            "Replica scaler shutting down"
        );
    }
}
