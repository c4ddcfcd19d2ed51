//! Rule-based probability used when no trained model is available or inference fails.

use crate::features::FeatureVector;

/// Probability for types that never carry fraud in the training data.
pub const INELIGIBLE_TYPE_PROBABILITY: f64 = 0.01;

const BASE_ELIGIBLE: f64 = 0.30;
const LARGE_AMOUNT: f64 = 200_000.0;
const LARGE_AMOUNT_RISK: f64 = 0.20;
const SMALL_AMOUNT: f64 = 500.0;
const SMALL_AMOUNT_RISK: f64 = 0.15;
const SENDER_DRAINED_RISK: f64 = 0.25;
const RECEIVER_MISMATCH_RISK: f64 = 0.25;
/// Allowed divergence of the receiver delta, as a fraction of the amount
const RECEIVER_TOLERANCE: f64 = 0.10;

pub fn heuristic_probability(features: &FeatureVector) -> f64 {
    if !(features.is_transfer() || features.is_cash_out()) {
        return INELIGIBLE_TYPE_PROBABILITY;
    }
    let amount = features.amount();
    let mut score = BASE_ELIGIBLE;

    if amount > LARGE_AMOUNT {
        score += LARGE_AMOUNT_RISK;
    } else if amount < SMALL_AMOUNT {
        score += SMALL_AMOUNT_RISK;
    }

    if features.old_balance_orig() > 0.0 && features.new_balance_orig() == 0.0 {
        score += SENDER_DRAINED_RISK;
    }

    if (features.receiver_delta() - amount).abs() > amount * RECEIVER_TOLERANCE {
        score += RECEIVER_MISMATCH_RISK;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureBuilder;
    use crate::transaction::{Transaction, TransactionType};

    fn probability(tx: &Transaction) -> f64 {
        heuristic_probability(&FeatureBuilder::default().build(tx))
    }

    #[test]
    fn ineligible_types_short_circuit() {
        for kind in [TransactionType::Payment, TransactionType::CashIn, TransactionType::Debit] {
            let tx = Transaction::new(kind, 9_000_000.0).with_balances(9_000_000.0, 0.0, 0.0, 0.0);
            assert_eq!(probability(&tx), 0.01);
        }
    }

    #[test]
    fn consistent_transfer_is_base_risk() {
        let tx = Transaction::new(TransactionType::Transfer, 150_000.0)
            .with_balances(200_000.0, 50_000.0, 100_000.0, 250_000.0);
        assert!((probability(&tx) - 0.30).abs() < 1e-12);
    }

    #[test]
    fn small_cash_out_with_mismatched_receiver() {
        let tx = Transaction::new(TransactionType::CashOut, 181.0).with_balances(181.0, 0.0, 21_182.0, 0.0);
        // base + small + drained + receiver mismatch
        assert!((probability(&tx) - 0.95).abs() < 1e-12);
    }

    #[test]
    fn saturates_at_one() {
        let tx = Transaction::new(TransactionType::Transfer, 500_000.0).with_balances(500_000.0, 0.0, 0.0, 0.0);
        assert_eq!(probability(&tx), 1.0);
    }
}
