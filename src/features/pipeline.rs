//! Feature pipeline: transaction → balances, type flags, receiver delta, fraud share → vector.

use super::buckets::{bucket_for, log_bucket_edges, FraudShareTable};
use super::{FeatureVector, FEATURE_COUNT};
use crate::config::{FeaturesConfig, FraudShareEntry};
use crate::transaction::{Transaction, TransactionType};
use std::sync::{PoisonError, RwLock};
use tracing::info;

pub struct FeatureBuilder {
    edges: Vec<f64>,
    shares: RwLock<FraudShareTable>,
}

impl FeatureBuilder {
    pub fn new(config: &FeaturesConfig) -> Self {
        Self {
            edges: log_bucket_edges(config.min_amount, config.max_amount, config.num_buckets),
            shares: RwLock::new(FraudShareTable::new(config.fraud_shares.iter().copied())),
        }
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn bucket_edges(&self) -> &[f64] {
        &self.edges
    }

    /// Derive the model input. Total over every transaction the request layer accepts.
    pub fn build(&self, tx: &Transaction) -> FeatureVector {
        let flag = |kind: TransactionType| if tx.kind == kind { 1.0 } else { 0.0 };
        FeatureVector {
            values: [
                tx.amount,
                tx.old_balance_orig,
                tx.new_balance_orig,
                tx.old_balance_dest,
                tx.new_balance_dest,
                flag(TransactionType::CashOut),
                flag(TransactionType::Transfer),
                tx.new_balance_dest - tx.old_balance_dest,
                self.fraud_share(tx.amount),
            ],
        }
    }

    pub fn bucket(&self, amount: f64) -> f64 {
        bucket_for(amount, &self.edges)
    }

    /// Historical fraud rate of the amount's bucket, offset by 1 so the feature is never zero.
    pub fn fraud_share(&self, amount: f64) -> f64 {
        let bucket = self.bucket(amount);
        let table = self.shares.read().unwrap_or_else(PoisonError::into_inner);
        table.nearest_share(bucket) + 1.0
    }

    /// Merge retrained bucket shares into the live table.
    pub fn update_fraud_shares(&self, entries: &[FraudShareEntry]) -> usize {
        let mut table = self.shares.write().unwrap_or_else(PoisonError::into_inner);
        let applied = table.update(entries.iter().copied());
        info!(applied, total = table.len(), "fraud share table updated");
        applied
    }

    pub fn fraud_share_table(&self) -> FraudShareTable {
        self.shares
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(&FeaturesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_NAMES;

    #[test]
    fn fixed_order() {
        let builder = FeatureBuilder::default();
        let tx = Transaction::new(TransactionType::Transfer, 150_000.0)
            .with_balances(200_000.0, 50_000.0, 100_000.0, 250_000.0);
        let fv = builder.build(&tx);
        assert_eq!(fv.values[0], 150_000.0);
        assert_eq!(fv.values[1], 200_000.0);
        assert_eq!(fv.values[2], 50_000.0);
        assert_eq!(fv.values[3], 100_000.0);
        assert_eq!(fv.values[4], 250_000.0);
        assert_eq!(fv.values[5], 0.0);
        assert_eq!(fv.values[6], 1.0);
        assert_eq!(fv.values[7], 150_000.0);
        assert_eq!(fv.get("balanceChange_Dest"), Some(150_000.0));
        assert_eq!(FEATURE_NAMES[8], "fraud_share");
        assert!(fv.is_transfer() && !fv.is_cash_out());
    }

    #[test]
    fn other_types_have_no_type_flags() {
        let builder = FeatureBuilder::default();
        for kind in [TransactionType::Payment, TransactionType::CashIn, TransactionType::Debit] {
            let fv = builder.build(&Transaction::new(kind, 1_000.0));
            assert!(!fv.is_cash_out());
            assert!(!fv.is_transfer());
        }
        let fv = builder.build(&Transaction::new(TransactionType::CashOut, 1_000.0));
        assert!(fv.is_cash_out());
    }

    #[test]
    fn fraud_share_is_offset_by_one() {
        let builder = FeatureBuilder::default();
        // 150 000 sits below the ~316 228 edge, nearest key 200 000
        assert!((builder.fraud_share(150_000.0) - 1.055).abs() < 1e-12);
        // tiny amounts map to the smallest key
        assert!((builder.fraud_share(5.0) - 1.001).abs() < 1e-12);
        // above the configured range clamps to the last edge, nearest key 1 000 000
        assert!((builder.fraud_share(50_000_000.0) - 1.085).abs() < 1e-12);
        assert!(builder.fraud_share(1.0) >= 1.0);
    }

    #[test]
    fn non_positive_amount_uses_bucket_zero() {
        let builder = FeatureBuilder::default();
        assert_eq!(builder.bucket(0.0), 0.0);
        assert_eq!(builder.bucket(-10.0), 0.0);
        assert!((builder.fraud_share(0.0) - 1.001).abs() < 1e-12);
    }

    #[test]
    fn runtime_share_update() {
        let builder = FeatureBuilder::default();
        builder.update_fraud_shares(&[FraudShareEntry::new(200_000.0, 0.5)]);
        assert!((builder.fraud_share(150_000.0) - 1.5).abs() < 1e-12);
        assert_eq!(builder.fraud_share_table().len(), 10);
    }
}
