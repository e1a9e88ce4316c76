//! Scaler configuration
//!
//! Every threshold is a tunable default rather than an invariant. The only
//! hard rules are the ones checked by [`ScalerConfig::validate`].

use crate::error::{Result, ScalerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tolerance used when checking that weights sum to 1.0
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Complete configuration of the decision engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    pub bounds: ReplicaBounds,
    pub weights: ScoringWeights,
    pub features: FeatureConfig,
    pub scoring: ScoringConfig,
    pub predictor: PredictorConfig,
    pub dampening: DampeningConfig,
}

impl ScalerConfig {
    /// Check construction-time invariants; any failure is fatal at startup
    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()?;
        self.weights.validate()?;
        self.features.validate()?;
        self.scoring.validate()?;
        self.predictor.validate()?;
        self.dampening.validate()?;
        Ok(())
    }
}

/// Allowed replica range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaBounds {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

impl Default for ReplicaBounds {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 10,
        }
    }
}

impl ReplicaBounds {
    pub fn new(min_replicas: u32, max_replicas: u32) -> Result<Self> {
        let bounds = Self {
            min_replicas,
            max_replicas,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_replicas == 0 {
            return Err(ScalerError::Configuration(
                "min_replicas must be at least 1".to_string(),
            ));
        }
        if self.min_replicas > self.max_replicas {
            return Err(ScalerError::Configuration(format!(
                "min_replicas ({}) exceeds max_replicas ({})",
                self.min_replicas, self.max_replicas
            )));
        }
        Ok(())
    }

    /// Clip a signed replica count into the allowed range
    pub fn clamp(&self, replicas: i64) -> u32 {
        replicas.clamp(self.min_replicas as i64, self.max_replicas as i64) as u32
    }
}

/// Weights of the four sub-scores; must sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub cpu: f64,
    pub memory: f64,
    pub network: f64,
    pub cost: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            cpu: 0.40,
            memory: 0.30,
            network: 0.20,
            cost: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<()> {
        let weights = [self.cpu, self.memory, self.network, self.cost];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ScalerError::Configuration(format!(
                "weights must be finite and non-negative: {:?}",
                self
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ScalerError::Configuration(format!(
                "weights must sum to 1.0, got {:.6}",
                sum
            )));
        }
        Ok(())
    }
}

/// Feature extraction windows, in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub short_window: usize,
    pub medium_window: usize,
    pub long_window: usize,
    /// Maximum snapshots retained in the metrics history
    pub history_capacity: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            short_window: 5,
            medium_window: 15,
            long_window: 60,
            history_capacity: 1000,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.short_window == 0 {
            return Err(ScalerError::Configuration(
                "feature windows must be non-zero".to_string(),
            ));
        }
        if self.short_window > self.medium_window || self.medium_window > self.long_window {
            return Err(ScalerError::Configuration(format!(
                "feature windows must be ordered short <= medium <= long, got {}/{}/{}",
                self.short_window, self.medium_window, self.long_window
            )));
        }
        if self.history_capacity < self.long_window {
            return Err(ScalerError::Configuration(format!(
                "history_capacity ({}) is smaller than long_window ({})",
                self.history_capacity, self.long_window
            )));
        }
        Ok(())
    }
}

/// Resource targets used by the rule-based scorer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub target_cpu_per_pod_millicores: f64,
    pub target_memory_per_pod_bytes: f64,
    /// Total throughput treated as a fully loaded network
    pub network_high_water_bytes_per_sec: f64,
    pub network_spike_bonus: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            target_cpu_per_pod_millicores: 500.0,
            target_memory_per_pod_bytes: 512.0 * 1024.0 * 1024.0,
            network_high_water_bytes_per_sec: 10.0 * 1024.0 * 1024.0,
            network_spike_bonus: 20.0,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        let targets = [
            ("target_cpu_per_pod_millicores", self.target_cpu_per_pod_millicores),
            ("target_memory_per_pod_bytes", self.target_memory_per_pod_bytes),
            (
                "network_high_water_bytes_per_sec",
                self.network_high_water_bytes_per_sec,
            ),
        ];
        for (name, value) in targets {
            if !value.is_finite() || value <= 0.0 {
                return Err(ScalerError::Configuration(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !self.network_spike_bonus.is_finite() || self.network_spike_bonus < 0.0 {
            return Err(ScalerError::Configuration(format!(
                "network_spike_bonus must be non-negative, got {}",
                self.network_spike_bonus
            )));
        }
        Ok(())
    }
}

/// Regression model and hybrid arbitration settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub min_samples_for_training: usize,
    pub retrain_interval: usize,
    pub max_training_samples: usize,
    pub n_estimators: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
    pub ml_confidence_threshold: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            min_samples_for_training: 20,
            retrain_interval: 10,
            max_training_samples: 1000,
            n_estimators: 20,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            seed: 42,
            ml_confidence_threshold: 0.6,
        }
    }
}

impl PredictorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retrain_interval == 0 {
            return Err(ScalerError::Configuration(
                "retrain_interval must be at least 1".to_string(),
            ));
        }
        if self.n_estimators == 0 {
            return Err(ScalerError::Configuration(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.min_samples_for_training == 0 {
            return Err(ScalerError::Configuration(
                "min_samples_for_training must be at least 1".to_string(),
            ));
        }
        if self.max_training_samples < self.min_samples_for_training {
            return Err(ScalerError::Configuration(format!(
                "max_training_samples ({}) is below min_samples_for_training ({})",
                self.max_training_samples, self.min_samples_for_training
            )));
        }
        if !(0.0..=1.0).contains(&self.ml_confidence_threshold) {
            return Err(ScalerError::Configuration(format!(
                "ml_confidence_threshold must be within [0, 1], got {}",
                self.ml_confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Hysteresis thresholds, CPU values in millicores per pod
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DampeningConfig {
    pub cooldown_secs: u64,
    pub scale_up_cpu_threshold: f64,
    pub scale_down_cpu_threshold: f64,
    pub floor_cpu_threshold: f64,
    pub ceiling_cpu_threshold: f64,
    pub large_difference: u32,
    /// Total CPU slope (millicores per sample) treated as a surge
    pub velocity_spike_threshold: f64,
}

impl Default for DampeningConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 60,
            scale_up_cpu_threshold: 700.0,
            scale_down_cpu_threshold: 200.0,
            floor_cpu_threshold: 100.0,
            ceiling_cpu_threshold: 800.0,
            large_difference: 2,
            velocity_spike_threshold: 50.0,
        }
    }
}

impl DampeningConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.large_difference == 0 {
            return Err(ScalerError::Configuration(
                "large_difference must be at least 1".to_string(),
            ));
        }
        if self.scale_down_cpu_threshold > self.scale_up_cpu_threshold {
            return Err(ScalerError::Configuration(format!(
                "scale_down_cpu_threshold ({}) exceeds scale_up_cpu_threshold ({})",
                self.scale_down_cpu_threshold, self.scale_up_cpu_threshold
            )));
        }
        Ok(())
    }
}
