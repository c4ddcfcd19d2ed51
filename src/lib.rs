//! FraudGuard: transaction fraud risk assessment.
//!
//! Modular structure:
//! - [`transaction`] - Transaction record and request validation
//! - [`features`] - Fixed-order feature vector derivation
//! - [`model`] - Fraud probability estimation (XGBoost trees, ONNX, heuristic fallback)
//! - [`risk`] - Risk fusion: score, tier, confidence, step-up and block decisions
//! - [`storage`] - Encrypted evidence archive for chargeback disputes
//! - [`notify`] - Live subscribers and webhooks
//! - [`service`] - Request orchestration
//! - [`logging`] - Structured JSON logging

pub mod config;
pub mod features;
pub mod logging;
pub mod model;
pub mod notify;
pub mod risk;
pub mod service;
pub mod storage;
pub mod transaction;

pub use config::AppConfig;
pub use features::{FeatureBuilder, FeatureVector};
pub use logging::StructuredLogger;
pub use model::ProbabilityEstimator;
pub use notify::{AnalysisEvent, NotifyError, Notifier};
pub use risk::{RiskAssessment, RiskFusionEngine, RiskTier};
pub use service::{FraudService, HealthStatus, TransactionResponse};
pub use storage::EvidenceStore;
pub use transaction::{Transaction, TransactionType};
