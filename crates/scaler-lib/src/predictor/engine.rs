//! Hybrid model/rule arbitration

use super::regression::RegressionPredictor;
use super::scoring::WeightedScorer;
use crate::config::ScalerConfig;
use crate::error::Result;
use crate::models::{FeatureVector, ProposalSource, ScalingProposal};
use tracing::debug;

/// Picks between the regression model and the rule-based scorer
pub struct DecisionEngine {
    predictor: RegressionPredictor,
    scorer: WeightedScorer,
    confidence_threshold: f64,
}

impl DecisionEngine {
    /// Build both predictors from a validated configuration
    pub fn new(config: &ScalerConfig) -> Result<Self> {
        config.validate()?;
        let scorer = WeightedScorer::new(config.weights, config.scoring, config.bounds)?;
        let predictor = RegressionPredictor::new(config.predictor, config.bounds);
        Ok(Self::with_parts(
            predictor,
            scorer,
            config.predictor.ml_confidence_threshold,
        ))
    }

    pub fn with_parts(
        predictor: RegressionPredictor,
        scorer: WeightedScorer,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            predictor,
            scorer,
            confidence_threshold,
        }
    }

    /// Propose a replica count and record `current_replicas` as a training label
    ///
    /// `current_replicas` is the count actually running when `features` was
    /// observed.
    pub fn decide(&mut self, features: &FeatureVector, current_replicas: u32) -> ScalingProposal {
        let proposal = self.propose(features, current_replicas);
        self.learn(features, current_replicas);
        proposal
    }

    /// Propose a replica count without touching the training buffer
    pub fn propose(&self, features: &FeatureVector, current_replicas: u32) -> ScalingProposal {
        let (model_replicas, model_confidence) = self.predictor.predict(features);
        let scores = self.scorer.score(features);

        let proposal = match model_replicas {
            Some(replicas) if model_confidence >= self.confidence_threshold => ScalingProposal {
                target_replicas: replicas,
                source: ProposalSource::Model,
                confidence: model_confidence,
                model_replicas,
                model_confidence,
                scores,
            },
            _ => ScalingProposal {
                target_replicas: self.scorer.map_score(scores.total_score, current_replicas),
                source: ProposalSource::Rule,
                confidence: scores.confidence,
                model_replicas,
                model_confidence,
                scores,
            },
        };

        debug!(
            source = %proposal.source,
            target = proposal.target_replicas,
            confidence = proposal.confidence,
            "Proposal computed"
        );
        proposal
    }

    /// Add a training pair; returns true when it triggered a refit
    pub fn learn(&mut self, features: &FeatureVector, current_replicas: u32) -> bool {
        self.predictor.add_sample(features, current_replicas)
    }

    pub fn predictor(&self) -> &RegressionPredictor {
        &self.predictor
    }

    pub fn predictor_mut(&mut self) -> &mut RegressionPredictor {
        &mut self.predictor
    }

    pub fn scorer(&self) -> &WeightedScorer {
        &self.scorer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringWeights;
    use crate::error::ScalerError;

    fn features(cpu_total: f64, pods: f64) -> FeatureVector {
        FeatureVector {
            pod_count: pods,
            cpu_total,
            cpu_per_pod: cpu_total / pods,
            cpu_mean_short: cpu_total,
            cpu_mean_medium: cpu_total,
            cpu_mean_long: cpu_total,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_invalid_weights() {
        let config = ScalerConfig {
            weights: ScoringWeights {
                cpu: 0.9,
                memory: 0.9,
                network: 0.0,
                cost: 0.0,
            },
            ..Default::default()
        };
        assert!(matches!(
            DecisionEngine::new(&config),
            Err(ScalerError::Configuration(_))
        ));
    }

    #[test]
    fn test_rule_path_until_warm_up() {
        let mut engine = DecisionEngine::new(&ScalerConfig::default()).unwrap();
        let f = features(1350.0, 3.0);
        for i in 0..19 {
            let proposal = engine.decide(&f, 3);
            assert_eq!(proposal.source, ProposalSource::Rule, "cycle {}", i);
            assert_eq!(proposal.model_replicas, None);
            assert_eq!(proposal.model_confidence, 0.0);
        }
        assert_eq!(engine.predictor().stats().samples_seen, 19);
    }

    #[test]
    fn test_confident_model_takes_over() {
        let mut engine = DecisionEngine::new(&ScalerConfig::default()).unwrap();
        let f = features(1350.0, 3.0);
        for _ in 0..20 {
            engine.decide(&f, 3);
        }
        let proposal = engine.decide(&f, 3);
        assert_eq!(proposal.source, ProposalSource::Model);
        assert_eq!(proposal.target_replicas, 3);
        assert!(proposal.confidence >= 0.6);
    }

    #[test]
    fn test_unsure_model_falls_back_to_rule() {
        let config = ScalerConfig::default();
        let scorer = WeightedScorer::new(config.weights, config.scoring, config.bounds).unwrap();
        let predictor = RegressionPredictor::new(config.predictor, config.bounds);
        // Threshold above any reachable confidence
        let mut engine = DecisionEngine::with_parts(predictor, scorer, 1.1);
        let f = features(1350.0, 3.0);
        for _ in 0..25 {
            engine.decide(&f, 3);
        }
        let proposal = engine.decide(&f, 3);
        assert_eq!(proposal.source, ProposalSource::Rule);
        assert_eq!(proposal.model_replicas, Some(3));
        assert!(proposal.model_confidence > 0.0);
    }

    #[test]
    fn test_rule_proposal_uses_score_mapping() {
        let mut engine = DecisionEngine::new(&ScalerConfig::default()).unwrap();
        // 950m per pod saturates the CPU score
        let f = features(1900.0, 2.0);
        let proposal = engine.decide(&f, 2);
        let expected = engine.scorer().map_score(proposal.scores.total_score, 2);
        assert_eq!(proposal.target_replicas, expected);
    }

    #[test]
    fn test_propose_does_not_train() {
        let mut engine = DecisionEngine::new(&ScalerConfig::default()).unwrap();
        let f = features(1350.0, 3.0);
        for _ in 0..25 {
            engine.propose(&f, 3);
        }
        assert_eq!(engine.predictor().stats().samples_seen, 0);

        for _ in 0..19 {
            assert!(!engine.learn(&f, 3));
        }
        assert!(engine.learn(&f, 3));
        assert!(engine.predictor().is_trained());
    }
}
