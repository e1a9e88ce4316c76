//! Periodic control loop
//!
//! Each tick pulls one snapshot, extends the history, extracts features, asks
//! the decision engine for a proposal, filters it through dampening and hands
//! executable decisions to the scaling sink. Failed ticks are logged and the
//! loop carries on with the next interval.

use crate::config::ScalerConfig;
use crate::dampening::DampeningController;
use crate::error::{Result, ScalerError};
use crate::health::{components, HealthRegistry};
use crate::history::MetricsHistory;
use crate::models::DecisionRecord;
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::predictor::{DecisionEngine, FeatureEngineer};
use crate::sink::ScalingSink;
use crate::source::MetricsSource;
use crate::store::{ModelStore, PERSISTED_SAMPLES};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Most recent decision record, shared with the HTTP API
pub type SharedDecision = Arc<RwLock<Option<DecisionRecord>>>;

/// Default polling interval between ticks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct Orchestrator {
    source: Arc<dyn MetricsSource>,
    sink: Arc<dyn ScalingSink>,
    store: Option<Arc<dyn ModelStore>>,
    history: MetricsHistory,
    features: FeatureEngineer,
    engine: DecisionEngine,
    dampening: DampeningController,
    poll_interval: Duration,
    health: HealthRegistry,
    metrics: ScalerMetrics,
    logger: StructuredLogger,
    latest: SharedDecision,
}

impl Orchestrator {
    /// Fails with a configuration error on invalid bounds, weights or windows
    pub fn new(
        config: &ScalerConfig,
        source: Arc<dyn MetricsSource>,
        sink: Arc<dyn ScalingSink>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let engine = DecisionEngine::new(config)?;
        Ok(Self {
            source,
            sink,
            store: None,
            history: MetricsHistory::new(config.features.history_capacity),
            features: FeatureEngineer::new(config.features),
            engine,
            dampening: DampeningController::new(config.dampening, config.bounds),
            poll_interval,
            health: HealthRegistry::new(),
            metrics: ScalerMetrics::new(),
            logger: StructuredLogger::new("workload"),
            latest: Arc::new(RwLock::new(None)),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn latest_decision(&self) -> SharedDecision {
        self.latest.clone()
    }

    pub fn history(&self) -> &MetricsHistory {
        &self.history
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn dampening(&self) -> &DampeningController {
        &self.dampening
    }

    /// Restore the predictor from the model store, if one is configured
    pub fn restore_model(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        match store.load() {
            Ok(Some(model)) => {
                if let Err(e) = self.engine.predictor_mut().restore(model) {
                    warn!(error = %e, "Failed to refit restored model, training from scratch");
                }
            }
            Ok(None) => debug!("No persisted model, training from scratch"),
            Err(e) => {
                let err = ScalerError::ModelStore(format!("{:#}", e));
                warn!(error = %err, "Failed to load persisted model, training from scratch");
            }
        }
        let stats = self.engine.predictor().stats();
        self.metrics.set_model_state(stats.trained, stats.training_samples);
    }

    /// Seed the history with the trailing long window; returns snapshots added
    pub async fn warm_start(&mut self) -> usize {
        if let Err(e) = self.source.health_check().await {
            warn!(error = %format!("{:#}", e), "Metrics source health check failed");
        }

        let samples = self.features.config().long_window as u32;
        let window = self.poll_interval.saturating_mul(samples);
        match self.source.get_historical(window).await {
            Ok(snapshots) => {
                let added = self.history.backfill(snapshots);
                info!(
                    added,
                    window_secs = window.as_secs(),
                    "History warm start complete"
                );
                added
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "History warm start failed, starting empty");
                0
            }
        }
    }

    /// Run one control cycle
    pub async fn tick(&mut self) -> Result<DecisionRecord> {
        let start = Instant::now();
        self.metrics.inc_ticks();
        let result = self.run_cycle().await;
        self.metrics.observe_tick_latency(start.elapsed().as_secs_f64());
        result
    }

    async fn run_cycle(&mut self) -> Result<DecisionRecord> {
        let snapshot = match self.source.get_snapshot().await {
            Ok(snapshot) if snapshot.is_finite() => {
                self.health.record_success(components::METRICS_SOURCE).await;
                snapshot
            }
            Ok(snapshot) => {
                let message = format!(
                    "non-finite reading (cpu={}, network={})",
                    snapshot.cpu_millicores_total, snapshot.network_bytes_per_sec
                );
                self.health
                    .record_failure(components::METRICS_SOURCE, message.clone())
                    .await;
                return Err(ScalerError::MetricsUnavailable(message));
            }
            Err(e) => {
                let message = format!("{:#}", e);
                self.health
                    .record_failure(components::METRICS_SOURCE, message.clone())
                    .await;
                return Err(ScalerError::MetricsUnavailable(message));
            }
        };

        if let Some(previous) = self.dampening.reconcile(snapshot.pod_count, Instant::now()) {
            info!(
                previous,
                observed = snapshot.pod_count,
                "Replica count changed outside the scaler"
            );
        }
        let current = self
            .dampening
            .current_replicas()
            .unwrap_or(snapshot.pod_count);

        let evicted = self.history.push(snapshot.clone());
        let features = match self.features.extract(&self.history, &snapshot) {
            Ok(features) => features,
            Err(e) => {
                self.history.revert_push(evicted);
                return Err(e);
            }
        };

        let proposal = self.engine.propose(&features, current);
        let decision = self.dampening.should_execute(&proposal, current, &features);

        let executed = if decision.execute {
            if let Err(e) = self.sink.set_replicas(decision.target_replicas).await {
                // A failed action skips the whole tick
                self.history.revert_push(evicted);
                let message = format!("{:#}", e);
                self.health
                    .record_failure(components::SCALING_SINK, message.clone())
                    .await;
                return Err(ScalerError::ScaleActionFailed(message));
            }
            self.dampening
                .mark_executed(decision.target_replicas, Instant::now());
            self.metrics
                .inc_scaling_action(current, decision.target_replicas);
            self.health.record_success(components::SCALING_SINK).await;
            true
        } else {
            false
        };

        let generation = self.engine.predictor().generation();
        self.engine.learn(&features, current);
        self.after_training(generation).await;

        let record = DecisionRecord {
            timestamp: snapshot.timestamp,
            current_replicas: current,
            features,
            proposal,
            decision,
            executed,
        };
        self.metrics.record_decision(&record);
        self.logger.log_decision(&record);
        *self.latest.write().await = Some(record.clone());
        Ok(record)
    }

    /// Report and persist a refit that happened during `decide`
    async fn after_training(&mut self, previous_generation: u64) {
        let stats = self.engine.predictor().stats();
        self.metrics
            .set_model_state(stats.trained, stats.training_samples);
        if stats.generation == previous_generation {
            return;
        }

        self.logger
            .log_model_trained(stats.training_samples, stats.generation);
        self.health.record_success(components::PREDICTOR).await;

        if let Some(store) = &self.store {
            let model = self.engine.predictor().snapshot(PERSISTED_SAMPLES);
            if let Err(e) = store.save(&model) {
                let err = ScalerError::ModelStore(format!("{:#}", e));
                warn!(error = %err, "Failed to persist model");
            }
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        for name in [
            components::METRICS_SOURCE,
            components::SCALING_SINK,
            components::PREDICTOR,
        ] {
            self.health.register(name).await;
        }

        self.restore_model();
        self.warm_start().await;
        self.health.set_ready(true).await;

        info!(
            interval_secs = self.poll_interval.as_secs(),
            history = self.history.len(),
            "Starting scaling control loop"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        self.metrics.inc_tick_failure(e.kind());
                        self.logger.log_tick_skipped(e.kind(), &e.to_string());
                        if !e.is_recoverable() {
                            self.health.set_ready(false).await;
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scaling control loop");
                    break;
                }
            }
        }
    }
}
