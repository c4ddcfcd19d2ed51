//! Service configuration. Every constant the pipeline uses can be overridden from the JSON file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("risk tier thresholds must satisfy 0 <= medium <= high <= critical <= 1 (got {medium}, {high}, {critical})")]
    TierOrder { medium: f64, high: f64, critical: f64 },
    #[error("{name} threshold must be within [0, 1], got {value}")]
    ThresholdRange { name: &'static str, value: f64 },
    #[error("maximum transaction amount must be positive, got {0}")]
    MaxAmount(f64),
    #[error("bucket range must satisfy 0 < min < max (got {min}..{max})")]
    BucketRange { min: f64, max: f64 },
    #[error("at least two amount buckets are required, got {0}")]
    BucketCount(usize),
    #[error("cannot read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("invalid config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serialized classifier artifact
    pub model: ModelConfig,
    /// Feature derivation parameters
    pub features: FeaturesConfig,
    /// Risk fusion thresholds and weights
    pub risk: RiskConfig,
    /// Upstream input validation
    pub validation: ValidationConfig,
    pub service: ServiceConfig,
    /// Evidence archive
    pub storage: StorageConfig,
    /// Live subscribers and webhooks
    pub notify: NotifyConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// `.json` (XGBoost) or `.onnx`; a missing file selects the heuristic
    pub path: PathBuf,
    /// Intra-op threads for ONNX Runtime
    pub onnx_threads: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Number of log-spaced amount bucket edges
    pub num_buckets: usize,
    pub min_amount: f64,
    pub max_amount: f64,
    /// Historical fraud rate per bucket edge, computed at training time
    pub fraud_shares: Vec<FraudShareEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FraudShareEntry {
    pub bucket: f64,
    pub share: f64,
}

impl FraudShareEntry {
    pub fn new(bucket: f64, share: f64) -> Self {
        Self { bucket, share }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub tiers: TierThresholds,
    /// Normalized score at or above which step-up authentication is required
    pub step_up_threshold: f64,
    /// Normalized score at or above which the transaction is blocked
    pub block_threshold: f64,
    pub type_multipliers: TypeMultipliers,
    pub amount: AmountRules,
    /// Item categories that add to the score (case-insensitive)
    pub high_risk_categories: Vec<String>,
}

/// Lower bounds (normalized score) of each tier above LOW.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeMultipliers {
    pub payment: f64,
    pub transfer: f64,
    pub cash_out: f64,
    pub cash_in: f64,
    pub debit: f64,
}

/// Amount bands and the points each adds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountRules {
    pub very_large: f64,
    pub very_large_points: f64,
    pub large: f64,
    pub large_points: f64,
    pub elevated: f64,
    pub elevated_points: f64,
    pub micro: f64,
    pub micro_points: f64,
    pub small: f64,
    pub small_points: f64,
    /// Amounts that are an exact multiple of this (and above it) count as round
    pub round_unit: f64,
    pub round_points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Probability above which a transaction is reported as fraud
    pub fraud_threshold: f64,
    /// Pending archive/notify jobs; further jobs are dropped while the queue is full
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub path: PathBuf,
    /// Environment variable holding the archive secret
    pub secret_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Buffered events per in-process subscriber before it starts lagging
    pub channel_capacity: usize,
    /// Endpoints receiving a JSON POST per analysis
    pub webhooks: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/models/fraud_model.json"),
            onnx_threads: 1,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            num_buckets: 25,
            min_amount: 0.01,
            max_amount: 10_000_000.0,
            fraud_shares: default_fraud_shares(),
        }
    }
}

fn default_fraud_shares() -> Vec<FraudShareEntry> {
    [
        (100.0, 0.001),
        (500.0, 0.005),
        (1_000.0, 0.008),
        (5_000.0, 0.012),
        (10_000.0, 0.015),
        (50_000.0, 0.025),
        (100_000.0, 0.040),
        (200_000.0, 0.055),
        (500_000.0, 0.070),
        (1_000_000.0, 0.085),
    ]
    .into_iter()
    .map(|(bucket, share)| FraudShareEntry::new(bucket, share))
    .collect()
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            tiers: TierThresholds::default(),
            step_up_threshold: 0.50,
            block_threshold: 0.80,
            type_multipliers: TypeMultipliers::default(),
            amount: AmountRules::default(),
            high_risk_categories: ["electronics", "gift_cards", "jewelry", "crypto"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            medium: 0.35,
            high: 0.65,
            critical: 0.85,
        }
    }
}

impl Default for TypeMultipliers {
    fn default() -> Self {
        Self {
            payment: 0.8,
            transfer: 1.2,
            cash_out: 1.3,
            cash_in: 0.7,
            debit: 0.7,
        }
    }
}

impl Default for AmountRules {
    fn default() -> Self {
        Self {
            very_large: 1_000_000.0,
            very_large_points: 15.0,
            large: 500_000.0,
            large_points: 10.0,
            elevated: 200_000.0,
            elevated_points: 5.0,
            micro: 100.0,
            micro_points: 8.0,
            small: 500.0,
            small_points: 3.0,
            round_unit: 10_000.0,
            round_points: 3.0,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_amount: 10_000_000.0,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fraud_threshold: 0.5,
            queue_capacity: 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("data/evidence.db"),
            secret_env: "FRAUDGUARD_EVIDENCE_SECRET".to_string(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            webhooks: Vec::new(),
            timeout_secs: 5,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl AppConfig {
    /// Load from JSON file if present; otherwise return default. A file that exists but cannot
    /// be read or parsed is an error, never a silent fallback.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str::<AppConfig>(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply `FRAUDGUARD_MODEL_PATH` and `FRAUDGUARD_LOG_LEVEL` when set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("FRAUDGUARD_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("FRAUDGUARD_LOG_LEVEL") {
            self.log.level = level;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate()?;
        if !(self.validation.max_amount > 0.0) {
            return Err(ConfigError::MaxAmount(self.validation.max_amount));
        }
        let f = &self.features;
        if !(f.min_amount > 0.0 && f.min_amount < f.max_amount) {
            return Err(ConfigError::BucketRange {
                min: f.min_amount,
                max: f.max_amount,
            });
        }
        if f.num_buckets < 2 {
            return Err(ConfigError::BucketCount(f.num_buckets));
        }
        check_unit("fraud", self.service.fraud_threshold)
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tiers;
        let ordered = 0.0 <= t.medium && t.medium <= t.high && t.high <= t.critical && t.critical <= 1.0;
        if !ordered {
            return Err(ConfigError::TierOrder {
                medium: t.medium,
                high: t.high,
                critical: t.critical,
            });
        }
        check_unit("step-up", self.step_up_threshold)?;
        check_unit("block", self.block_threshold)
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdRange { name, value })
    }
}
