//! Transaction → features → probability, with graceful degradation to the heuristic.

use super::{heuristic_probability, EstimatorStatistics, PredictionStats, Scorer};
use crate::config::AppConfig;
use crate::features::FeatureBuilder;
use crate::transaction::Transaction;
use std::sync::Arc;
use tracing::{debug, error};

pub struct ProbabilityEstimator {
    features: FeatureBuilder,
    scorer: Scorer,
    stats: Arc<PredictionStats>,
}

impl ProbabilityEstimator {
    pub fn new(features: FeatureBuilder, scorer: Scorer, stats: Arc<PredictionStats>) -> Self {
        Self {
            features,
            scorer,
            stats,
        }
    }

    /// Load the configured model (or fall back to the heuristic) with fresh counters.
    pub fn load(config: &AppConfig) -> Self {
        Self::new(
            FeatureBuilder::new(&config.features),
            Scorer::load(&config.model),
            Arc::new(PredictionStats::new()),
        )
    }

    /// Heuristic-only estimator.
    pub fn heuristic(config: &AppConfig) -> Self {
        Self::new(
            FeatureBuilder::new(&config.features),
            Scorer::Heuristic,
            Arc::new(PredictionStats::new()),
        )
    }

    /// Always returns a probability in [0, 1]; inference errors are logged and replaced by the
    /// heuristic.
    pub fn predict(&self, tx: &Transaction) -> f64 {
        let features = self.features.build(tx);
        let probability = match self.scorer.score(&features) {
            Ok(p) => p,
            Err(e) => {
                error!(
                    backend = self.scorer.backend(),
                    error = %e,
                    "model inference failed; using heuristic"
                );
                heuristic_probability(&features)
            }
        };
        self.stats.record(probability);
        debug!(
            kind = %tx.kind,
            amount = tx.amount,
            probability,
            backend = self.scorer.backend(),
            "prediction"
        );
        probability
    }

    pub fn is_model_loaded(&self) -> bool {
        self.scorer.is_model()
    }

    pub fn backend(&self) -> &'static str {
        self.scorer.backend()
    }

    pub fn features(&self) -> &FeatureBuilder {
        &self.features
    }

    pub fn stats_handle(&self) -> Arc<PredictionStats> {
        self.stats.clone()
    }

    pub fn get_statistics(&self) -> EstimatorStatistics {
        self.stats.snapshot(self.is_model_loaded(), self.backend())
    }
}
