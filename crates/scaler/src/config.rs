//! Service configuration
//!
//! Read from `SCALER_*` environment variables. Nested engine settings use a
//! double underscore, e.g. `SCALER_ENGINE__BOUNDS__MAX_REPLICAS=20`.

use anyhow::{Context, Result};
use scaler_lib::ScalerConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Namespace of the scaled Deployment
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the scaled Deployment
    #[serde(default = "default_deployment")]
    pub deployment: String,

    /// Pod name prefix used in metric selectors; defaults to the deployment name
    #[serde(default)]
    pub pod_prefix: Option<String>,

    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Seconds between control loop ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Log decisions without patching the Deployment
    #[serde(default)]
    pub dry_run: bool,

    /// Where the trained model is persisted; unset means no persistence
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    #[serde(default)]
    pub engine: ScalerConfig,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_deployment() -> String {
    "app".to_string()
}

fn default_prometheus_url() -> String {
    "http://prometheus:9090".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_api_port() -> u16 {
    8080
}

impl AppConfig {
    /// Load and validate configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("SCALER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config: AppConfig = config::Config::builder()
            .add_source(environment)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.deployment.is_empty() {
            anyhow::bail!("deployment name must not be empty");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        self.engine.validate()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn pod_prefix(&self) -> &str {
        self.pod_prefix.as_deref().unwrap_or(&self.deployment)
    }

    /// `namespace/deployment`, used to tag log events
    pub fn workload(&self) -> String {
        format!("{}/{}", self.namespace, self.deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_environment(AppConfig::environment().source(Some(map)))
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.deployment, "app");
        assert_eq!(config.pod_prefix(), "app");
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.api_port, 8080);
        assert!(!config.dry_run);
        assert!(config.model_path.is_none());
        assert_eq!(config.engine.bounds.max_replicas, 10);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SCALER_NAMESPACE", "shop"),
            ("SCALER_DEPLOYMENT", "checkout"),
            ("SCALER_POD_PREFIX", "checkout-v2"),
            ("SCALER_DRY_RUN", "true"),
            ("SCALER_POLL_INTERVAL_SECS", "15"),
            ("SCALER_MODEL_PATH", "/data/model.json"),
            ("SCALER_ENGINE__BOUNDS__MAX_REPLICAS", "20"),
            ("SCALER_ENGINE__DAMPENING__COOLDOWN_SECS", "120"),
        ])
        .unwrap();
        assert_eq!(config.workload(), "shop/checkout");
        assert_eq!(config.pod_prefix(), "checkout-v2");
        assert!(config.dry_run);
        assert_eq!(config.poll_interval_secs, 15);
        assert_eq!(config.model_path, Some(PathBuf::from("/data/model.json")));
        assert_eq!(config.engine.bounds.max_replicas, 20);
        assert_eq!(config.engine.bounds.min_replicas, 1);
        assert_eq!(config.engine.dampening.cooldown_secs, 120);
    }

    #[test]
    fn test_invalid_bounds_are_fatal() {
        let result = load(&[
            ("SCALER_ENGINE__BOUNDS__MIN_REPLICAS", "8"),
            ("SCALER_ENGINE__BOUNDS__MAX_REPLICAS", "4"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        assert!(load(&[("SCALER_POLL_INTERVAL_SECS", "0")]).is_err());
    }
}
