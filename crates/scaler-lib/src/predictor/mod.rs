//! Replica prediction: feature extraction, regression model, rule scorer

mod engine;
mod features;
mod regression;
mod scoring;

pub use engine::DecisionEngine;
pub use features::{linear_regression_slope, std_dev, FeatureEngineer, BUSINESS_HOURS};
pub use regression::{
    BaggedTrees, EnsembleRegressor, PredictorStats, RegressionPredictor, TrainedModel,
    TrainingSample,
};
pub use scoring::WeightedScorer;
