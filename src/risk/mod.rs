//! Risk fusion: model probability + transaction attributes + context signals → decision.

mod engine;
mod recommend;
mod signals;

pub use engine::{RiskAssessment, RiskFusionEngine, RiskTier, ScoreBreakdown};
pub use recommend::recommendations;
