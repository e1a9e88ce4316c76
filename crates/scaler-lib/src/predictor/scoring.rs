//! Rule-based scorer used when the model is untrained or unsure
//!
//! Converts a feature vector into four 0-100 sub-scores, combines them with
//! configured weights and maps the total onto a replica delta.

use crate::config::{ReplicaBounds, ScoringConfig, ScoringWeights};
use crate::error::Result;
use crate::models::{FeatureVector, ScoreBreakdown};

const CPU_TREND_LIMIT: f64 = 20.0;
const MEMORY_TREND_LIMIT: f64 = 15.0;
const CPU_PEAK_BONUS: f64 = 10.0;
const CPU_PEAK_RATIO: f64 = 0.8;
const NETWORK_SPIKE_RATIO: f64 = 1.5;

/// Below this per-pod CPU the memory-based replica count is ignored
const IDLE_CPU_PER_POD_MILLICORES: f64 = 10.0;

/// Weighted four-metric scorer
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    weights: ScoringWeights,
    config: ScoringConfig,
    bounds: ReplicaBounds,
}

impl WeightedScorer {
    /// Fails with a configuration error if weights or bounds are invalid
    pub fn new(weights: ScoringWeights, config: ScoringConfig, bounds: ReplicaBounds) -> Result<Self> {
        weights.validate()?;
        bounds.validate()?;
        Ok(Self {
            weights,
            config,
            bounds,
        })
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score(&self, features: &FeatureVector) -> ScoreBreakdown {
        let cpu_util = self.cpu_utilization_pct(features);
        let memory_util = self.memory_utilization_pct(features);

        let cpu_score = self.cpu_score(features, cpu_util);
        let memory_score = self.memory_score(features, memory_util);
        let network_score = self.network_score(features);
        let cost_score = clip_score(100.0 - (cpu_util + memory_util) / 2.0);

        let total_score = cpu_score * self.weights.cpu
            + memory_score * self.weights.memory
            + network_score * self.weights.network
            + cost_score * self.weights.cost;

        ScoreBreakdown {
            cpu_score,
            memory_score,
            network_score,
            cost_score,
            total_score,
            capacity_replicas: self.capacity_replicas(features),
            confidence: self.confidence(features),
        }
    }

    /// Map a weighted total onto a replica count within bounds
    pub fn map_score(&self, total_score: f64, current_replicas: u32) -> u32 {
        let current = current_replicas as i64;
        let delta = if total_score.is_nan() {
            0
        } else if total_score < 20.0 {
            -2
        } else if total_score < 40.0 {
            -1
        } else if total_score < 60.0 {
            0
        } else if total_score < 80.0 {
            1
        } else {
            2
        };
        self.bounds.clamp(current + delta)
    }

    /// Replica count that would hold every pod at its CPU and memory target
    pub fn capacity_replicas(&self, features: &FeatureVector) -> u32 {
        let by_cpu = (features.cpu_total / self.config.target_cpu_per_pod_millicores).ceil();
        let by_memory = (features.memory_total / self.config.target_memory_per_pod_bytes).ceil();

        let optimal = if features.cpu_per_pod < IDLE_CPU_PER_POD_MILLICORES {
            by_cpu
        } else {
            by_cpu.max(by_memory)
        };
        self.bounds.clamp(optimal as i64)
    }

    fn pods(features: &FeatureVector) -> f64 {
        features.pod_count.max(1.0)
    }

    fn cpu_utilization_pct(&self, features: &FeatureVector) -> f64 {
        features.cpu_per_pod / self.config.target_cpu_per_pod_millicores * 100.0
    }

    fn memory_utilization_pct(&self, features: &FeatureVector) -> f64 {
        features.memory_per_pod / self.config.target_memory_per_pod_bytes * 100.0
    }

    fn cpu_score(&self, features: &FeatureVector, utilization: f64) -> f64 {
        let capacity = self.config.target_cpu_per_pod_millicores * Self::pods(features);
        let trend = (features.cpu_trend_short / capacity * 100.0).clamp(-CPU_TREND_LIMIT, CPU_TREND_LIMIT);
        let peak = if features.cpu_per_pod_peak_long > CPU_PEAK_RATIO * self.config.target_cpu_per_pod_millicores {
            CPU_PEAK_BONUS
        } else {
            0.0
        };
        clip_score(utilization + trend + peak)
    }

    fn memory_score(&self, features: &FeatureVector, utilization: f64) -> f64 {
        let capacity = self.config.target_memory_per_pod_bytes * Self::pods(features);
        let trend = (features.memory_trend_short / capacity * 100.0)
            .clamp(-MEMORY_TREND_LIMIT, MEMORY_TREND_LIMIT);
        clip_score(utilization + trend)
    }

    fn network_score(&self, features: &FeatureVector) -> f64 {
        let throughput = features.network_total / self.config.network_high_water_bytes_per_sec * 100.0;
        let spike = if features.network_mean_medium > 0.0
            && features.network_total > NETWORK_SPIKE_RATIO * features.network_mean_medium
        {
            self.config.network_spike_bonus
        } else {
            0.0
        };
        clip_score(throughput + spike)
    }

    /// Trend agreement, CPU stability and monotonic pattern, weighted 0.4/0.4/0.2
    fn confidence(&self, features: &FeatureVector) -> f64 {
        let consistency = match (sign(features.cpu_trend_short), sign(features.cpu_trend_medium)) {
            (a, b) if a == b => 1.0,
            (0, _) | (_, 0) => 0.5,
            _ => 0.0,
        };

        let stability = if features.cpu_mean_medium > 0.0 {
            1.0 / (1.0 + features.cpu_volatility / features.cpu_mean_medium)
        } else {
            1.0
        };

        let pattern = features.cpu_trend_strength * features.cpu_monotonicity;

        (0.4 * consistency + 0.4 * stability + 0.2 * pattern).clamp(0.0, 1.0)
    }
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

fn clip_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScalerError;

    fn scorer() -> WeightedScorer {
        WeightedScorer::new(
            ScoringWeights::default(),
            ScoringConfig::default(),
            ReplicaBounds::default(),
        )
        .unwrap()
    }

    fn steady(cpu_total: f64, pods: f64) -> FeatureVector {
        let memory_total = 200.0 * 1024.0 * 1024.0 * pods;
        FeatureVector {
            pod_count: pods,
            cpu_total,
            cpu_per_pod: cpu_total / pods,
            cpu_mean_medium: cpu_total,
            memory_total,
            memory_per_pod: memory_total / pods,
            ..Default::default()
        }
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = ScoringWeights {
            cpu: 0.5,
            memory: 0.5,
            network: 0.5,
            cost: 0.0,
        };
        let result = WeightedScorer::new(weights, ScoringConfig::default(), ReplicaBounds::default());
        assert!(matches!(result, Err(ScalerError::Configuration(_))));
    }

    #[test]
    fn test_capacity_replicas_from_total_cpu() {
        // 1350m at 500m per pod
        assert_eq!(scorer().capacity_replicas(&steady(1350.0, 2.0)), 3);
    }

    #[test]
    fn test_capacity_uses_memory_when_it_needs_more_pods() {
        let mut features = steady(600.0, 2.0);
        features.memory_total = 2048.0 * 1024.0 * 1024.0;
        features.memory_per_pod = features.memory_total / 2.0;
        assert_eq!(scorer().capacity_replicas(&features), 4);
    }

    #[test]
    fn test_capacity_ignores_memory_when_idle() {
        let mut features = steady(10.0, 2.0);
        features.memory_total = 2048.0 * 1024.0 * 1024.0;
        assert_eq!(scorer().capacity_replicas(&features), 1);
    }

    #[test]
    fn test_map_score_table() {
        let s = scorer();
        assert_eq!(s.map_score(10.0, 5), 3);
        assert_eq!(s.map_score(20.0, 5), 4);
        assert_eq!(s.map_score(50.0, 5), 5);
        assert_eq!(s.map_score(60.0, 5), 6);
        assert_eq!(s.map_score(80.0, 5), 7);
        assert_eq!(s.map_score(100.0, 5), 7);
    }

    #[test]
    fn test_map_score_clipped_to_bounds() {
        let s = scorer();
        assert_eq!(s.map_score(150.0, 10), s.map_score(100.0, 10));
        assert_eq!(s.map_score(150.0, 9), 10);
        assert_eq!(s.map_score(-50.0, 2), 1);
        assert_eq!(s.map_score(0.0, 1), 1);
        for score in [-1000.0, 0.0, 19.9, 45.0, 79.9, 100.0, 1e9] {
            for current in 0..15 {
                let replicas = s.map_score(score, current);
                assert!((1..=10).contains(&replicas));
            }
        }
    }

    #[test]
    fn test_sub_scores_clipped() {
        let mut features = steady(100_000.0, 1.0);
        features.cpu_trend_short = 1e9;
        features.network_total = 1e12;
        let breakdown = scorer().score(&features);
        assert_eq!(breakdown.cpu_score, 100.0);
        assert_eq!(breakdown.network_score, 100.0);
        assert_eq!(breakdown.cost_score, 0.0);
        assert!(breakdown.total_score <= 100.0);
    }

    #[test]
    fn test_cpu_score_components() {
        let s = scorer();
        // 250m of 500m target = 50%
        let base = s.score(&steady(500.0, 2.0));
        assert!((base.cpu_score - 50.0).abs() < 1e-9);

        // Rising by 100m over a 1000m capacity adds 10 points
        let mut rising = steady(500.0, 2.0);
        rising.cpu_trend_short = 100.0;
        assert!((s.score(&rising).cpu_score - 60.0).abs() < 1e-9);

        // Trend adjustment is capped at 20
        rising.cpu_trend_short = 10_000.0;
        assert!((s.score(&rising).cpu_score - 70.0).abs() < 1e-9);

        let mut peaked = steady(500.0, 2.0);
        peaked.cpu_per_pod_peak_long = 450.0;
        assert!((s.score(&peaked).cpu_score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_network_spike_bonus() {
        let s = scorer();
        let mut features = steady(500.0, 2.0);
        features.network_total = 1024.0 * 1024.0;
        features.network_mean_medium = 1024.0 * 1024.0;
        let calm = s.score(&features).network_score;
        assert!((calm - 10.0).abs() < 1e-9);

        features.network_mean_medium = 512.0 * 1024.0;
        let spiking = s.score(&features).network_score;
        assert!((spiking - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_overprovisioned_scores_low() {
        let s = scorer();
        let mut features = steady(50.0, 5.0);
        features.memory_total = 0.0;
        features.memory_per_pod = 0.0;
        let breakdown = s.score(&features);
        assert!(breakdown.total_score < 20.0);
        assert_eq!(s.map_score(breakdown.total_score, 5), 3);
    }

    #[test]
    fn test_confidence_prefers_consistent_stable_trends() {
        let s = scorer();
        let mut consistent = steady(1000.0, 2.0);
        consistent.cpu_trend_short = 50.0;
        consistent.cpu_trend_medium = 150.0;
        consistent.cpu_trend_strength = 1.0;
        consistent.cpu_monotonicity = 1.0;

        let mut noisy = consistent.clone();
        noisy.cpu_trend_medium = -150.0;
        noisy.cpu_volatility = 1000.0;
        noisy.cpu_trend_strength = 0.1;
        noisy.cpu_monotonicity = 0.0;

        let high = s.score(&consistent).confidence;
        let low = s.score(&noisy).confidence;
        assert!((high - 1.0).abs() < 1e-9);
        assert!(low < 0.3);
        assert!((0.0..=1.0).contains(&low));
    }
}
