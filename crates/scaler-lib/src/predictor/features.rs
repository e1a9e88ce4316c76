//! Feature extraction for the decision engine
//!
//! Derives a fixed-shape feature vector from the metrics history: current
//! state, rolling means over three windows, trends, volatility and calendar
//! context. Windows longer than the available history use whatever samples
//! exist; features that need more history than exists are zero-filled.

use crate::config::FeatureConfig;
use crate::error::{Result, ScalerError};
use crate::history::MetricsHistory;
use crate::models::{FeatureVector, MetricsSnapshot};
use chrono::{Datelike, Timelike, Utc};
use std::f64::consts::PI;

/// Business hours, UTC, weekdays only
pub const BUSINESS_HOURS: std::ops::Range<u32> = 9..17;

/// Derives feature vectors from a metrics history
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Extract features; `latest` is expected to be already in `history`
    pub fn extract(&self, history: &MetricsHistory, latest: &MetricsSnapshot) -> Result<FeatureVector> {
        if history.is_empty() {
            return Err(ScalerError::InsufficientData(
                "cannot extract features from an empty history".to_string(),
            ));
        }

        let FeatureConfig {
            short_window: short,
            medium_window: medium,
            long_window: long,
            ..
        } = self.config;

        let cpu = |s: &MetricsSnapshot| s.cpu_millicores_total;
        let memory = |s: &MetricsSnapshot| s.memory_bytes_total as f64;
        let network = |s: &MetricsSnapshot| s.network_bytes_per_sec;

        let cpu_short = series(history, short, cpu);
        let cpu_medium = series(history, medium, cpu);
        let memory_medium = series(history, medium, memory);

        let mut features = FeatureVector {
            pod_count: latest.pod_count as f64,
            cpu_total: latest.cpu_millicores_total,
            cpu_per_pod: latest.cpu_per_pod(),
            memory_total: latest.memory_bytes_total as f64,
            memory_per_pod: latest.memory_per_pod(),
            network_total: latest.network_bytes_per_sec,
            network_per_pod: latest.network_per_pod(),

            cpu_mean_short: mean(&cpu_short),
            cpu_mean_medium: mean(&cpu_medium),
            cpu_mean_long: mean(&series(history, long, cpu)),
            memory_mean_short: mean(&series(history, short, memory)),
            memory_mean_medium: mean(&memory_medium),
            memory_mean_long: mean(&series(history, long, memory)),
            network_mean_short: mean(&series(history, short, network)),
            network_mean_medium: mean(&series(history, medium, network)),
            network_mean_long: mean(&series(history, long, network)),
            cpu_per_pod_peak_long: history
                .recent(long)
                .map(MetricsSnapshot::cpu_per_pod)
                .fold(0.0, f64::max),

            cpu_trend_short: trend(history, latest, short, cpu),
            cpu_trend_medium: trend(history, latest, medium, cpu),
            memory_trend_short: trend(history, latest, short, memory),
            memory_trend_medium: trend(history, latest, medium, memory),
            network_trend_short: trend(history, latest, short, network),

            cpu_volatility: std_dev(&cpu_medium),
            memory_volatility: std_dev(&memory_medium),
            cpu_velocity: linear_regression_slope(&cpu_short),
            cpu_trend_strength: trend_strength(&cpu_medium),
            cpu_monotonicity: monotonicity(&cpu_short),

            ..Default::default()
        };
        apply_calendar(&mut features, latest.timestamp);
        Ok(features)
    }
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}

fn series(history: &MetricsHistory, n: usize, f: impl Fn(&MetricsSnapshot) -> f64) -> Vec<f64> {
    history.recent(n).map(f).collect()
}

/// `current - value_n_samples_ago`, or 0 when history is shorter than `n`
fn trend(
    history: &MetricsHistory,
    latest: &MetricsSnapshot,
    n: usize,
    f: impl Fn(&MetricsSnapshot) -> f64,
) -> f64 {
    history.back(n).map(|past| f(latest) - f(past)).unwrap_or(0.0)
}

fn apply_calendar(features: &mut FeatureVector, timestamp: i64) {
    let dt = chrono::DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
    let hour = dt.hour();
    let weekday = dt.weekday().num_days_from_monday();
    let is_weekend = weekday >= 5;

    features.hour_of_day = hour as f64;
    features.day_of_week = weekday as f64;
    features.is_business_hours = (!is_weekend && BUSINESS_HOURS.contains(&hour)) as u8 as f64;
    features.is_weekend = is_weekend as u8 as f64;
    features.hour_sin = (2.0 * PI * hour as f64 / 24.0).sin();
    features.hour_cos = (2.0 * PI * hour as f64 / 24.0).cos();
    features.day_sin = (2.0 * PI * weekday as f64 / 7.0).sin();
    features.day_cos = (2.0 * PI * weekday as f64 / 7.0).cos();
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / values.len() as f64).sqrt()
}

/// Calculate linear regression slope for trend detection
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

/// Coefficient of determination of a straight-line fit, 0 for flat series
fn trend_strength(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let m = mean(values);
    let ss_tot: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if ss_tot < f64::EPSILON {
        return 0.0;
    }
    let slope = linear_regression_slope(values);
    let x_mean = (values.len() - 1) as f64 / 2.0;
    let intercept = m - slope * x_mean;
    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| (v - (intercept + slope * i as f64)).powi(2))
        .sum();
    (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
}

/// 1.0 when every step moves the same way, 0.0 for flat or zig-zag series
fn monotonicity(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let (mut up, mut down) = (0i64, 0i64);
    for pair in values.windows(2) {
        if pair[1] > pair[0] {
            up += 1;
        } else if pair[1] < pair[0] {
            down += 1;
        }
    }
    (up - down).unsigned_abs() as f64 / (values.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FEATURE_NAMES;

    // 2024-01-01T00:00:00Z, a Monday
    const MONDAY_MIDNIGHT: i64 = 1_704_067_200;

    fn snapshot(timestamp: i64, cpu: f64, pods: u32) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp,
            cpu_millicores_total: cpu,
            memory_bytes_total: 256 * 1024 * 1024 * pods as u64,
            network_bytes_per_sec: 1000.0,
            pod_count: pods,
        }
    }

    fn history_of(values: &[f64]) -> MetricsHistory {
        let mut history = MetricsHistory::new(1000);
        for (i, cpu) in values.iter().enumerate() {
            history.push(snapshot(MONDAY_MIDNIGHT + i as i64 * 30, *cpu, 2));
        }
        history
    }

    fn extract(history: &MetricsHistory) -> FeatureVector {
        let latest = history.latest().cloned().unwrap();
        FeatureEngineer::default().extract(history, &latest).unwrap()
    }

    #[test]
    fn test_empty_history_is_insufficient() {
        let history = MetricsHistory::new(10);
        let latest = snapshot(MONDAY_MIDNIGHT, 100.0, 1);
        let err = FeatureEngineer::default().extract(&history, &latest).unwrap_err();
        assert!(matches!(err, ScalerError::InsufficientData(_)));
    }

    #[test]
    fn test_shape_stable_from_one_to_many_samples() {
        let one = extract(&history_of(&[100.0]));
        let many = extract(&history_of(&vec![100.0; 1000]));
        let one_names: Vec<&str> = one.iter().map(|(n, _)| n).collect();
        let many_names: Vec<&str> = many.iter().map(|(n, _)| n).collect();
        assert_eq!(one_names, many_names);
        assert_eq!(one_names.len(), FEATURE_NAMES.len());
        assert!(one.iter().all(|(_, v)| v.is_finite()));
    }

    #[test]
    fn test_single_sample_zero_fills_history_features() {
        let f = extract(&history_of(&[400.0]));
        assert_eq!(f.cpu_total, 400.0);
        assert_eq!(f.cpu_per_pod, 200.0);
        assert_eq!(f.cpu_mean_long, 400.0);
        assert_eq!(f.cpu_trend_short, 0.0);
        assert_eq!(f.cpu_trend_medium, 0.0);
        assert_eq!(f.cpu_volatility, 0.0);
        assert_eq!(f.cpu_velocity, 0.0);
    }

    #[test]
    fn test_rolling_means_use_available_samples() {
        let f = extract(&history_of(&[100.0, 200.0, 300.0]));
        assert!((f.cpu_mean_short - 200.0).abs() < 1e-9);
        assert!((f.cpu_mean_long - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_window_mean() {
        let values: Vec<f64> = (1..=10).map(|i| i as f64 * 100.0).collect();
        let f = extract(&history_of(&values));
        // last five: 600..1000
        assert!((f.cpu_mean_short - 800.0).abs() < 1e-9);
        assert!((f.cpu_mean_medium - 550.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_against_n_samples_ago() {
        let values: Vec<f64> = (0..20).map(|i| i as f64 * 10.0).collect();
        let f = extract(&history_of(&values));
        assert!((f.cpu_trend_short - 50.0).abs() < 1e-9);
        assert!((f.cpu_trend_medium - 150.0).abs() < 1e-9);
        assert!((f.cpu_velocity - 10.0).abs() < 1e-9);
        assert!((f.cpu_trend_strength - 1.0).abs() < 1e-9);
        assert!((f.cpu_monotonicity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_zero_when_history_too_short() {
        let f = extract(&history_of(&[100.0, 200.0, 300.0]));
        assert_eq!(f.cpu_trend_short, 0.0);
    }

    #[test]
    fn test_volatility_is_population_std_dev() {
        let f = extract(&history_of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]));
        assert!((f.cpu_volatility - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_pod_peak_over_long_window() {
        let mut history = MetricsHistory::new(100);
        history.push(snapshot(MONDAY_MIDNIGHT, 1800.0, 2));
        history.push(snapshot(MONDAY_MIDNIGHT + 30, 600.0, 2));
        let f = extract(&history);
        assert_eq!(f.cpu_per_pod_peak_long, 900.0);
    }

    #[test]
    fn test_calendar_features() {
        let engineer = FeatureEngineer::default();
        let mut history = MetricsHistory::new(10);

        let monday_ten = snapshot(MONDAY_MIDNIGHT + 10 * 3600, 100.0, 1);
        history.push(monday_ten.clone());
        let f = engineer.extract(&history, &monday_ten).unwrap();
        assert_eq!(f.hour_of_day, 10.0);
        assert_eq!(f.day_of_week, 0.0);
        assert_eq!(f.is_business_hours, 1.0);
        assert_eq!(f.is_weekend, 0.0);

        let saturday_ten = snapshot(MONDAY_MIDNIGHT + 5 * 86_400 + 10 * 3600, 100.0, 1);
        history.push(saturday_ten.clone());
        let f = engineer.extract(&history, &saturday_ten).unwrap();
        assert_eq!(f.day_of_week, 5.0);
        assert_eq!(f.is_business_hours, 0.0);
        assert_eq!(f.is_weekend, 1.0);
    }

    #[test]
    fn test_monotonicity_of_zig_zag() {
        assert_eq!(monotonicity(&[1.0, 2.0, 1.0, 2.0, 1.0]), 0.0);
        assert_eq!(monotonicity(&[5.0, 5.0, 5.0]), 0.0);
        assert_eq!(monotonicity(&[5.0, 4.0, 3.0]), 1.0);
    }

    #[test]
    fn test_linear_regression_slope() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((linear_regression_slope(&values) - 1.0).abs() < 0.01);
        assert_eq!(linear_regression_slope(&[]), 0.0);
    }
}
