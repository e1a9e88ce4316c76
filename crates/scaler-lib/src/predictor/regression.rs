//! Trainable regression model for replica prediction
//!
//! An ensemble of regression trees is fit on (load features, realized replica
//! count) pairs. The spread of the individual estimators' predictions is the
//! confidence signal: trees that agree yield a confidence near 1.

use crate::config::{PredictorConfig, ReplicaBounds};
use crate::error::{Result, ScalerError};
use crate::models::{FeatureVector, MODEL_INPUT_NAMES};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Any regressor built from several estimators whose outputs can be compared
pub trait EnsembleRegressor: Send + Sync {
    /// Full refit on the given rows
    fn fit(&mut self, inputs: &[Vec<f64>], labels: &[f64]) -> Result<()>;

    /// One prediction per estimator for a single input row
    fn predict_each(&self, input: &[f64]) -> Result<Vec<f64>>;
}

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Bootstrap-aggregated decision trees
pub struct BaggedTrees {
    n_estimators: usize,
    params: DecisionTreeRegressorParameters,
    seed: u64,
    trees: Vec<Tree>,
}

impl BaggedTrees {
    pub fn new(config: &PredictorConfig) -> Self {
        let params = DecisionTreeRegressorParameters::default()
            .with_max_depth(config.max_depth)
            .with_min_samples_split(config.min_samples_split)
            .with_min_samples_leaf(config.min_samples_leaf);
        Self {
            n_estimators: config.n_estimators.max(1),
            params,
            seed: config.seed,
            trees: Vec::new(),
        }
    }
}

impl EnsembleRegressor for BaggedTrees {
    fn fit(&mut self, inputs: &[Vec<f64>], labels: &[f64]) -> Result<()> {
        if inputs.is_empty() || inputs.len() != labels.len() {
            return Err(ScalerError::Training(format!(
                "cannot fit {} rows against {} labels",
                inputs.len(),
                labels.len()
            )));
        }
        if let Some(row) = inputs.iter().position(|r| !all_finite(r)) {
            return Err(ScalerError::Training(format!(
                "row {} has a non-finite input",
                row
            )));
        }

        let n = inputs.len();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            let mut rows = Vec::with_capacity(n);
            let mut y = Vec::with_capacity(n);
            for _ in 0..n {
                let idx = rng.gen_range(0..n);
                rows.push(inputs[idx].clone());
                y.push(labels[idx]);
            }
            let x = DenseMatrix::from_2d_vec(&rows);
            let tree = DecisionTreeRegressor::fit(&x, &y, self.params.clone())
                .map_err(|e| ScalerError::Training(format!("tree fit failed: {}", e)))?;
            trees.push(tree);
        }

        self.trees = trees;
        Ok(())
    }

    fn predict_each(&self, input: &[f64]) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(ScalerError::Training("ensemble has not been fit".to_string()));
        }
        let x = DenseMatrix::from_2d_vec(&vec![input.to_vec()]);
        self.trees
            .iter()
            .map(|tree| {
                tree.predict(&x)
                    .map_err(|e| ScalerError::Training(format!("tree predict failed: {}", e)))?
                    .first()
                    .copied()
                    .ok_or_else(|| ScalerError::Training("tree returned no output".to_string()))
            })
            .collect()
    }
}

fn all_finite(row: &[f64]) -> bool {
    row.iter().all(|v| v.is_finite())
}

/// One (load features, realized replica count) training pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub inputs: Vec<f64>,
    pub label: u32,
}

/// Persistable state of the predictor: training buffer and counters
///
/// The fitted trees are not serialized; a restored model is refit from its
/// buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub samples: Vec<TrainingSample>,
    pub samples_seen: u64,
    pub trained: bool,
    pub generation: u64,
}

/// Predictor statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictorStats {
    pub trained: bool,
    pub training_samples: usize,
    pub samples_seen: u64,
    pub generation: u64,
    pub min_samples_needed: usize,
}

/// Trains incrementally and predicts a replica count with a confidence score
pub struct RegressionPredictor {
    config: PredictorConfig,
    bounds: ReplicaBounds,
    regressor: Box<dyn EnsembleRegressor>,
    samples: VecDeque<TrainingSample>,
    samples_seen: u64,
    since_fit: usize,
    trained: bool,
    generation: u64,
}

impl RegressionPredictor {
    pub fn new(config: PredictorConfig, bounds: ReplicaBounds) -> Self {
        let regressor = Box::new(BaggedTrees::new(&config));
        Self::with_regressor(config, bounds, regressor)
    }

    pub fn with_regressor(
        config: PredictorConfig,
        bounds: ReplicaBounds,
        regressor: Box<dyn EnsembleRegressor>,
    ) -> Self {
        Self {
            config,
            bounds,
            regressor,
            samples: VecDeque::new(),
            samples_seen: 0,
            since_fit: 0,
            trained: false,
            generation: 0,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Number of completed fits
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Predicted replica count and confidence, `(None, 0.0)` until trained
    pub fn predict(&self, features: &FeatureVector) -> (Option<u32>, f64) {
        if !self.trained {
            return (None, 0.0);
        }

        let inputs = features.model_inputs();
        if !all_finite(&inputs) {
            warn!("Skipping prediction on non-finite features");
            return (None, 0.0);
        }

        let predictions = match self.regressor.predict_each(&inputs) {
            Ok(p) if !p.is_empty() => p,
            Ok(_) => return (None, 0.0),
            Err(e) => {
                warn!(error = %e, "Model prediction failed");
                return (None, 0.0);
            }
        };

        let n = predictions.len() as f64;
        let mean = predictions.iter().sum::<f64>() / n;
        let variance = predictions.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        let confidence = 1.0 / (1.0 + variance.sqrt());
        let replicas = self.bounds.clamp(mean.round() as i64);

        debug!(replicas, confidence, mean, "Model prediction");
        (Some(replicas), confidence)
    }

    /// Record a training pair; returns true when this sample triggered a refit
    ///
    /// `realized_replicas` must be the replica count actually running, never
    /// a value derived from the snapshot being labeled. Rows with non-finite
    /// inputs are dropped.
    pub fn add_sample(&mut self, features: &FeatureVector, realized_replicas: u32) -> bool {
        let inputs = features.model_inputs();
        if !all_finite(&inputs) {
            warn!("Dropping training sample with non-finite features");
            return false;
        }
        self.samples.push_back(TrainingSample {
            inputs,
            label: realized_replicas,
        });
        while self.samples.len() > self.config.max_training_samples {
            self.samples.pop_front();
        }
        self.samples_seen += 1;
        self.since_fit += 1;

        if !self.should_retrain() {
            return false;
        }
        match self.train() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, samples = self.samples.len(), "Model retrain failed");
                false
            }
        }
    }

    fn should_retrain(&self) -> bool {
        if self.samples.len() < self.config.min_samples_for_training {
            return false;
        }
        !self.trained || self.since_fit >= self.config.retrain_interval
    }

    /// Synchronous full refit on the training buffer
    pub fn train(&mut self) -> Result<()> {
        if self.samples.len() < self.config.min_samples_for_training {
            return Err(ScalerError::Training(format!(
                "not enough samples for training ({} < {})",
                self.samples.len(),
                self.config.min_samples_for_training
            )));
        }

        let start = Instant::now();
        let inputs: Vec<Vec<f64>> = self.samples.iter().map(|s| s.inputs.clone()).collect();
        let labels: Vec<f64> = self.samples.iter().map(|s| s.label as f64).collect();
        self.regressor.fit(&inputs, &labels)?;

        self.trained = true;
        self.since_fit = 0;
        self.generation += 1;
        info!(
            samples = inputs.len(),
            generation = self.generation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model trained"
        );
        Ok(())
    }

    /// Export the most recent `keep` samples and counters
    pub fn snapshot(&self, keep: usize) -> TrainedModel {
        let skip = self.samples.len().saturating_sub(keep);
        TrainedModel {
            samples: self.samples.iter().skip(skip).cloned().collect(),
            samples_seen: self.samples_seen,
            trained: self.trained,
            generation: self.generation,
        }
    }

    /// Replace state with a persisted model and refit if warm-up is met
    pub fn restore(&mut self, model: TrainedModel) -> Result<()> {
        let width = MODEL_INPUT_NAMES.len();
        let total = model.samples.len();
        let mut samples: VecDeque<TrainingSample> = model
            .samples
            .into_iter()
            .filter(|s| s.inputs.len() == width && all_finite(&s.inputs))
            .collect();
        if samples.len() < total {
            warn!(
                dropped = total - samples.len(),
                "Discarded persisted samples with a different feature shape or non-finite inputs"
            );
        }
        while samples.len() > self.config.max_training_samples {
            samples.pop_front();
        }

        self.samples = samples;
        self.samples_seen = model.samples_seen.max(self.samples.len() as u64);
        self.generation = model.generation;
        self.since_fit = 0;
        self.trained = false;

        if self.samples.len() >= self.config.min_samples_for_training {
            self.train()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> PredictorStats {
        PredictorStats {
            trained: self.trained,
            training_samples: self.samples.len(),
            samples_seen: self.samples_seen,
            generation: self.generation,
            min_samples_needed: self.config.min_samples_for_training,
        }
    }
}
