//! Fraud probability: pretrained classifier when available, rule-based heuristic otherwise.

mod estimator;
mod heuristic;
mod onnx;
mod stats;
mod trees;

pub use estimator::ProbabilityEstimator;
pub use heuristic::{heuristic_probability, INELIGIBLE_TYPE_PROBABILITY};
pub use onnx::OnnxScorer;
pub use stats::{EstimatorStatistics, PredictionStats};
pub use trees::TreeEnsemble;

use crate::config::ModelConfig;
use crate::features::FeatureVector;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported objective {0}, expected a binary probability objective")]
    UnsupportedObjective(String),
    #[error("unsupported booster {0}")]
    UnsupportedBooster(String),
    #[error("model expects {found} features, pipeline produces {expected}")]
    FeatureMismatch { expected: usize, found: usize },
    #[error("invalid base score {0}")]
    BaseScore(String),
    #[error("tree {tree} is malformed: {reason}")]
    MalformedTree { tree: usize, reason: String },
    #[error("onnx runtime: {0}")]
    Onnx(#[from] ort::OrtError),
    #[error("input shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("ONNX Runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("model produced no probability output")]
    NoOutput,
    #[error("model produced a non-finite probability {0}")]
    NonFinite(f64),
}

/// Scoring backend, chosen once at startup.
pub enum Scorer {
    Trees(TreeEnsemble),
    Onnx(OnnxScorer),
    Heuristic,
    /// Fails every inference
    #[cfg(test)]
    Failing,
}

impl Scorer {
    /// Missing or unloadable artifacts degrade to the heuristic instead of failing startup.
    pub fn load(config: &ModelConfig) -> Self {
        let path = config.path.as_path();
        if !path.exists() {
            warn!(path = %path.display(), "model artifact not found; using heuristic scoring");
            return Scorer::Heuristic;
        }

        let is_onnx = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("onnx"));
        let loaded = if is_onnx {
            OnnxScorer::load(path, config.onnx_threads).map(Scorer::Onnx)
        } else {
            TreeEnsemble::from_file(path).map(Scorer::Trees)
        };

        match loaded {
            Ok(scorer) => {
                info!(path = %path.display(), backend = scorer.backend(), "model loaded");
                scorer
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "model failed to load; using heuristic scoring");
                Scorer::Heuristic
            }
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Scorer::Trees(_) => "xgboost",
            Scorer::Onnx(_) => "onnx",
            Scorer::Heuristic => "heuristic",
            #[cfg(test)]
            Scorer::Failing => "failing",
        }
    }

    pub fn is_model(&self) -> bool {
        !matches!(self, Scorer::Heuristic)
    }

    pub fn score(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let p = match self {
            Scorer::Trees(model) => model.predict(features),
            Scorer::Onnx(model) => model.predict(features)?,
            Scorer::Heuristic => return Ok(heuristic_probability(features)),
            #[cfg(test)]
            Scorer::Failing => return Err(ModelError::NoOutput),
        };
        if p.is_finite() {
            Ok(p.clamp(0.0, 1.0))
        } else {
            Err(ModelError::NonFinite(p))
        }
    }
}
