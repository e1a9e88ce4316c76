//! Replica Scaler - predictive replica autoscaler
//!
//! Runs next to the scaled workload, reads its load from Prometheus and
//! resizes its Deployment through the Kubernetes API.

use anyhow::Result;
use replica_scaler::{api, config::AppConfig};
use scaler_lib::{
    health::HealthRegistry,
    observability::{ScalerMetrics, StructuredLogger},
    orchestrator::Orchestrator,
    sink::{DryRunSink, KubeScaler, ScalingSink},
    source::PrometheusSource,
    store::FileModelStore,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = AppConfig::load()?;
    info!(
        workload = %config.workload(),
        prometheus = %config.prometheus_url,
        dry_run = config.dry_run,
        "Scaler configured"
    );

    let logger = StructuredLogger::new(config.workload());
    logger.log_startup(SCALER_VERSION, config.dry_run);

    let health_registry = HealthRegistry::new();
    let metrics = ScalerMetrics::new();

    let source = Arc::new(PrometheusSource::new(
        &config.prometheus_url,
        &config.namespace,
        config.pod_prefix(),
        config.poll_interval(),
    )?);
    let sink: Arc<dyn ScalingSink> = if config.dry_run {
        Arc::new(DryRunSink::new())
    } else {
        Arc::new(KubeScaler::connect(&config.namespace, &config.deployment).await?)
    };

    let mut orchestrator = Orchestrator::new(&config.engine, source, sink, config.poll_interval())?
        .with_health(health_registry.clone())
        .with_logger(logger.clone());
    if let Some(path) = &config.model_path {
        orchestrator = orchestrator.with_store(Arc::new(FileModelStore::new(path.clone())));
    }

    let app_state = Arc::new(api::AppState::new(
        health_registry,
        metrics,
        orchestrator.latest_decision(),
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(orchestrator.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Control loop terminated abnormally");
    }
    api_handle.abort();

    Ok(())
}
