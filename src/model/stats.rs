//! Prediction counters. Monotonic for the lifetime of the handle; one lock guards the group so
//! total and flagged never drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Probability above which a prediction counts as flagged.
pub const FLAG_THRESHOLD: f64 = 0.5;

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    fraud_flagged: u64,
    last_prediction: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct PredictionStats {
    inner: Mutex<Counters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorStatistics {
    pub total_predictions: u64,
    pub fraud_detected: u64,
    pub fraud_rate: f64,
    pub last_prediction_time: Option<String>,
    pub is_model_loaded: bool,
    pub backend: String,
}

impl PredictionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, probability: f64) {
        let mut c = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        c.total += 1;
        if probability > FLAG_THRESHOLD {
            c.fraud_flagged += 1;
        }
        c.last_prediction = Some(Utc::now());
    }

    pub fn total(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).total
    }

    pub fn snapshot(&self, is_model_loaded: bool, backend: &str) -> EstimatorStatistics {
        let c = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let fraud_rate = if c.total > 0 {
            (c.fraud_flagged as f64 / c.total as f64 * 10_000.0).round() / 10_000.0
        } else {
            0.0
        };
        EstimatorStatistics {
            total_predictions: c.total,
            fraud_detected: c.fraud_flagged,
            fraud_rate,
            last_prediction_time: c.last_prediction.map(|t| t.to_rfc3339()),
            is_model_loaded,
            backend: backend.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_and_rate() {
        let stats = PredictionStats::new();
        for p in [0.9, 0.1, 0.5, 0.51] {
            stats.record(p);
        }
        let s = stats.snapshot(false, "heuristic");
        assert_eq!(s.total_predictions, 4);
        assert_eq!(s.fraud_detected, 2);
        assert_eq!(s.fraud_rate, 0.5);
        assert!(s.last_prediction_time.is_some());
    }

    #[test]
    fn empty_snapshot() {
        let s = PredictionStats::new().snapshot(true, "xgboost");
        assert_eq!(s.total_predictions, 0);
        assert_eq!(s.fraud_rate, 0.0);
        assert_eq!(s.last_prediction_time, None);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = Arc::new(PredictionStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        stats.record(0.7);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let s = stats.snapshot(false, "heuristic");
        assert_eq!(s.total_predictions, 8_000);
        assert_eq!(s.fraud_detected, 8_000);
    }
}
