//! Feature derivation from raw transaction fields.

mod buckets;
mod pipeline;

pub use buckets::{log_bucket_edges, FraudShareTable, DEFAULT_FRAUD_SHARE};
pub use pipeline::FeatureBuilder;

use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 9;

/// Column names in the order the classifier was trained on. Reordering requires retraining.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "amount",
    "oldbalanceOrg",
    "newbalanceOrig",
    "oldbalanceDest",
    "newbalanceDest",
    "type_CASH_OUT",
    "type_TRANSFER",
    "balanceChange_Dest",
    "fraud_share",
];

const AMOUNT: usize = 0;
const OLD_BALANCE_ORIG: usize = 1;
const NEW_BALANCE_ORIG: usize = 2;
const OLD_BALANCE_DEST: usize = 3;
const NEW_BALANCE_DEST: usize = 4;
const TYPE_CASH_OUT: usize = 5;
const TYPE_TRANSFER: usize = 6;
const RECEIVER_DELTA: usize = 7;
const FRAUD_SHARE: usize = 8;

/// Fixed-order model input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Tree ensembles and ONNX graphs both consume single precision.
    pub fn to_f32(&self) -> [f32; FEATURE_COUNT] {
        self.values.map(|v| v as f32)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    pub fn amount(&self) -> f64 {
        self.values[AMOUNT]
    }

    pub fn old_balance_orig(&self) -> f64 {
        self.values[OLD_BALANCE_ORIG]
    }

    pub fn new_balance_orig(&self) -> f64 {
        self.values[NEW_BALANCE_ORIG]
    }

    pub fn old_balance_dest(&self) -> f64 {
        self.values[OLD_BALANCE_DEST]
    }

    pub fn new_balance_dest(&self) -> f64 {
        self.values[NEW_BALANCE_DEST]
    }

    pub fn is_cash_out(&self) -> bool {
        self.values[TYPE_CASH_OUT] != 0.0
    }

    pub fn is_transfer(&self) -> bool {
        self.values[TYPE_TRANSFER] != 0.0
    }

    pub fn receiver_delta(&self) -> f64 {
        self.values[RECEIVER_DELTA]
    }

    pub fn fraud_share(&self) -> f64 {
        self.values[FRAUD_SHARE]
    }
}
