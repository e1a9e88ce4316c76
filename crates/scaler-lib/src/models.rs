//! Core data models for the replica scaler

use serde::{Deserialize, Serialize};

/// One point-in-time reading of the workload's resource usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    pub cpu_millicores_total: f64,
    pub memory_bytes_total: u64,
    pub network_bytes_per_sec: f64,
    /// Replicas observed at capture time
    pub pod_count: u32,
}

impl MetricsSnapshot {
    /// False when a rate reading is `NaN` or infinite
    pub fn is_finite(&self) -> bool {
        self.cpu_millicores_total.is_finite() && self.network_bytes_per_sec.is_finite()
    }

    pub fn cpu_per_pod(&self) -> f64 {
        self.cpu_millicores_total / self.pod_count.max(1) as f64
    }

    pub fn memory_per_pod(&self) -> f64 {
        self.memory_bytes_total as f64 / self.pod_count.max(1) as f64
    }

    pub fn network_per_pod(&self) -> f64 {
        self.network_bytes_per_sec / self.pod_count.max(1) as f64
    }
}

/// Fixed-shape numeric summary of recent history
///
/// Every field is always present; missing history is zero-filled so the
/// regressor always sees the same input shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    // Current state
    pub pod_count: f64,
    pub cpu_total: f64,
    pub cpu_per_pod: f64,
    pub memory_total: f64,
    pub memory_per_pod: f64,
    pub network_total: f64,
    pub network_per_pod: f64,

    // Rolling means of totals
    pub cpu_mean_short: f64,
    pub cpu_mean_medium: f64,
    pub cpu_mean_long: f64,
    pub memory_mean_short: f64,
    pub memory_mean_medium: f64,
    pub memory_mean_long: f64,
    pub network_mean_short: f64,
    pub network_mean_medium: f64,
    pub network_mean_long: f64,
    pub cpu_per_pod_peak_long: f64,

    // Trends (current minus value n samples ago)
    pub cpu_trend_short: f64,
    pub cpu_trend_medium: f64,
    pub memory_trend_short: f64,
    pub memory_trend_medium: f64,
    pub network_trend_short: f64,

    // Volatility and shape
    pub cpu_volatility: f64,
    pub memory_volatility: f64,
    pub cpu_velocity: f64,
    pub cpu_trend_strength: f64,
    pub cpu_monotonicity: f64,

    // Calendar (UTC)
    pub hour_of_day: f64,
    pub day_of_week: f64,
    pub is_business_hours: f64,
    pub is_weekend: f64,
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub day_sin: f64,
    pub day_cos: f64,
}

/// Names of every feature, in `FeatureVector::values` order
pub const FEATURE_NAMES: [&str; 35] = [
    "pod_count",
    "cpu_total",
    "cpu_per_pod",
    "memory_total",
    "memory_per_pod",
    "network_total",
    "network_per_pod",
    "cpu_mean_short",
    "cpu_mean_medium",
    "cpu_mean_long",
    "memory_mean_short",
    "memory_mean_medium",
    "memory_mean_long",
    "network_mean_short",
    "network_mean_medium",
    "network_mean_long",
    "cpu_per_pod_peak_long",
    "cpu_trend_short",
    "cpu_trend_medium",
    "memory_trend_short",
    "memory_trend_medium",
    "network_trend_short",
    "cpu_volatility",
    "memory_volatility",
    "cpu_velocity",
    "cpu_trend_strength",
    "cpu_monotonicity",
    "hour_of_day",
    "day_of_week",
    "is_business_hours",
    "is_weekend",
    "hour_sin",
    "hour_cos",
    "day_sin",
    "day_cos",
];

/// Names of the load-derived features fed to the regressor
///
/// Pod count and per-pod values are excluded: they are functions of the
/// replica count the model is trained to predict.
pub const MODEL_INPUT_NAMES: [&str; 26] = [
    "cpu_total",
    "memory_total",
    "network_total",
    "cpu_mean_short",
    "cpu_mean_medium",
    "cpu_mean_long",
    "memory_mean_short",
    "memory_mean_medium",
    "memory_mean_long",
    "network_mean_short",
    "network_mean_medium",
    "network_mean_long",
    "cpu_trend_short",
    "cpu_trend_medium",
    "memory_trend_short",
    "memory_trend_medium",
    "network_trend_short",
    "cpu_volatility",
    "memory_volatility",
    "cpu_velocity",
    "cpu_trend_strength",
    "cpu_monotonicity",
    "hour_sin",
    "hour_cos",
    "day_sin",
    "is_business_hours",
];

impl FeatureVector {
    /// All feature values in `FEATURE_NAMES` order
    pub fn values(&self) -> [f64; 35] {
        [
            self.pod_count,
            self.cpu_total,
            self.cpu_per_pod,
            self.memory_total,
            self.memory_per_pod,
            self.network_total,
            self.network_per_pod,
            self.cpu_mean_short,
            self.cpu_mean_medium,
            self.cpu_mean_long,
            self.memory_mean_short,
            self.memory_mean_medium,
            self.memory_mean_long,
            self.network_mean_short,
            self.network_mean_medium,
            self.network_mean_long,
            self.cpu_per_pod_peak_long,
            self.cpu_trend_short,
            self.cpu_trend_medium,
            self.memory_trend_short,
            self.memory_trend_medium,
            self.network_trend_short,
            self.cpu_volatility,
            self.memory_volatility,
            self.cpu_velocity,
            self.cpu_trend_strength,
            self.cpu_monotonicity,
            self.hour_of_day,
            self.day_of_week,
            self.is_business_hours,
            self.is_weekend,
            self.hour_sin,
            self.hour_cos,
            self.day_sin,
            self.day_cos,
        ]
    }

    /// Iterate over `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.values())
    }

    /// Look up a feature by name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Regressor input row in `MODEL_INPUT_NAMES` order
    pub fn model_inputs(&self) -> Vec<f64> {
        vec![
            self.cpu_total,
            self.memory_total,
            self.network_total,
            self.cpu_mean_short,
            self.cpu_mean_medium,
            self.cpu_mean_long,
            self.memory_mean_short,
            self.memory_mean_medium,
            self.memory_mean_long,
            self.network_mean_short,
            self.network_mean_medium,
            self.network_mean_long,
            self.cpu_trend_short,
            self.cpu_trend_medium,
            self.memory_trend_short,
            self.memory_trend_medium,
            self.network_trend_short,
            self.cpu_volatility,
            self.memory_volatility,
            self.cpu_velocity,
            self.cpu_trend_strength,
            self.cpu_monotonicity,
            self.hour_sin,
            self.hour_cos,
            self.day_sin,
            self.is_business_hours,
        ]
    }
}

/// Rule-based score output, 0-100 per metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub cpu_score: f64,
    pub memory_score: f64,
    pub network_score: f64,
    pub cost_score: f64,
    pub total_score: f64,
    /// Replica count that would hold every pod at its resource target
    pub capacity_replicas: u32,
    pub confidence: f64,
}

/// Where a proposal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalSource {
    Model,
    Rule,
}

impl ProposalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalSource::Model => "model",
            ProposalSource::Rule => "rule",
        }
    }
}

impl std::fmt::Display for ProposalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate replica count produced by the decision engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingProposal {
    pub target_replicas: u32,
    pub source: ProposalSource,
    pub confidence: f64,
    /// Model output, when the model was consulted and trained
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_replicas: Option<u32>,
    pub model_confidence: f64,
    pub scores: ScoreBreakdown,
}

/// Final verdict of a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub execute: bool,
    pub target_replicas: u32,
    pub reason: String,
}

impl ScalingDecision {
    pub fn execute(target_replicas: u32, reason: impl Into<String>) -> Self {
        Self {
            execute: true,
            target_replicas,
            reason: reason.into(),
        }
    }

    pub fn hold(current_replicas: u32, reason: impl Into<String>) -> Self {
        Self {
            execute: false,
            target_replicas: current_replicas,
            reason: reason.into(),
        }
    }
}

/// Structured record emitted once per completed cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: i64,
    pub current_replicas: u32,
    pub features: FeatureVector,
    pub proposal: ScalingProposal,
    pub decision: ScalingDecision,
    /// Whether the sink accepted the resize
    pub executed: bool,
}
