//! Fuses the model probability with transaction attributes and context signals into a bounded
//! score, a tier, and the step-up/block decisions. Pure per call.

use super::signals::context_signals;
use crate::config::{RiskConfig, TierThresholds};
use crate::transaction::{Transaction, TransactionType};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn from_normalized(score: f64, t: &TierThresholds) -> Self {
        if score >= t.critical {
            RiskTier::Critical
        } else if score >= t.high {
            RiskTier::High
        } else if score >= t.medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskTier,
    /// 0..=100
    pub risk_score: f64,
    pub confidence: f64,
    #[serde(rename = "requires_3d_secure")]
    pub requires_step_up: bool,
    pub should_block: bool,
    pub risk_factors: Vec<String>,
}

/// Per-stage contributions before the final clamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub type_multiplier: f64,
    pub amount: f64,
    pub balance: f64,
    pub missing_context: f64,
    pub signals: f64,
    pub factors: Vec<String>,
}

impl ScoreBreakdown {
    pub fn raw_total(&self) -> f64 {
        self.base * self.type_multiplier + self.amount + self.balance + self.missing_context + self.signals
    }

    pub fn score(&self) -> f64 {
        self.raw_total().clamp(0.0, 100.0)
    }
}

const MISSING_IP: f64 = 5.0;
const MISSING_DEVICE: f64 = 5.0;

const SENDER_DRAINED: f64 = 15.0;
const SENDER_MISMATCH: f64 = 10.0;
const SENDER_TOLERANCE: f64 = 0.05;
const RECEIVER_UNCHANGED: f64 = 20.0;
const RECEIVER_DRAINED: f64 = 15.0;
const RECEIVER_MISMATCH: f64 = 12.0;
const RECEIVER_TOLERANCE: f64 = 0.10;

const CONFIDENCE_BASE: f64 = 0.5;
const CONFIDENCE_MODEL_WEIGHT: f64 = 0.3;
const CONFIDENCE_PER_IDENTIFIER: f64 = 0.1;

pub struct RiskFusionEngine {
    config: RiskConfig,
}

impl RiskFusionEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn assess(&self, tx: &Transaction, probability: f64) -> RiskAssessment {
        let probability = sanitize(probability);
        let breakdown = self.breakdown(tx, probability);
        let score = breakdown.score();
        let normalized = score / 100.0;

        RiskAssessment {
            risk_level: RiskTier::from_normalized(normalized, &self.config.tiers),
            risk_score: round_to(score, 2),
            confidence: round_to(confidence(tx, probability), 4),
            requires_step_up: normalized >= self.config.step_up_threshold,
            should_block: normalized >= self.config.block_threshold,
            risk_factors: breakdown.factors,
        }
    }

    pub fn breakdown(&self, tx: &Transaction, probability: f64) -> ScoreBreakdown {
        let probability = sanitize(probability);
        let mut factors = Vec::new();

        let type_multiplier = self.type_multiplier(tx.kind);
        if type_multiplier > 1.0 {
            factors.push(format!("High-risk transaction type: {}", tx.kind));
        }
        let amount = self.amount_risk(tx.amount, &mut factors);
        let balance = balance_risk(tx, &mut factors);
        let missing_context = missing_context_risk(tx, &mut factors);
        let signals = context_signals(tx, &self.config.high_risk_categories, &mut factors);

        ScoreBreakdown {
            base: probability * 100.0,
            type_multiplier,
            amount,
            balance,
            missing_context,
            signals,
            factors,
        }
    }

    pub fn type_multiplier(&self, kind: TransactionType) -> f64 {
        let m = &self.config.type_multipliers;
        match kind {
            TransactionType::CashOut => m.cash_out,
            TransactionType::Transfer => m.transfer,
            TransactionType::Payment => m.payment,
            TransactionType::CashIn => m.cash_in,
            TransactionType::Debit => m.debit,
        }
    }

    fn amount_risk(&self, amount: f64, factors: &mut Vec<String>) -> f64 {
        let r = &self.config.amount;
        let mut risk = 0.0;

        if amount > r.very_large {
            risk += r.very_large_points;
            factors.push(format!("Very large transaction amount: {amount:.2}"));
        } else if amount > r.large {
            risk += r.large_points;
            factors.push(format!("Large transaction amount: {amount:.2}"));
        } else if amount > r.elevated {
            risk += r.elevated_points;
            factors.push(format!("Elevated transaction amount: {amount:.2}"));
        }

        if amount < r.micro {
            risk += r.micro_points;
            factors.push(format!("Suspiciously small amount: {amount:.2}"));
        } else if amount < r.small {
            risk += r.small_points;
            factors.push(format!("Small transaction amount: {amount:.2}"));
        }

        if r.round_unit > 0.0 && amount > r.round_unit && amount % r.round_unit == 0.0 {
            risk += r.round_points;
            factors.push(format!("Round transaction amount: {amount:.2}"));
        }
        risk
    }
}

fn balance_risk(tx: &Transaction, factors: &mut Vec<String>) -> f64 {
    let amount = tx.amount;
    let mut risk = 0.0;

    if tx.old_balance_orig > 0.0 {
        if tx.new_balance_orig == 0.0 {
            risk += SENDER_DRAINED;
            factors.push("Sender balance fully drained".into());
        }
        let expected = tx.old_balance_orig - amount;
        if (tx.new_balance_orig - expected).abs() > amount * SENDER_TOLERANCE {
            risk += SENDER_MISMATCH;
            factors.push("Sender balance change does not match the amount".into());
        }
    }

    if tx.new_balance_dest == tx.old_balance_dest {
        risk += RECEIVER_UNCHANGED;
        factors.push("Receiver balance unchanged".into());
    }
    if tx.old_balance_dest > 0.0 && tx.new_balance_dest == 0.0 {
        risk += RECEIVER_DRAINED;
        factors.push("Receiver balance zeroed".into());
    }
    let expected = tx.old_balance_dest + amount;
    if (tx.new_balance_dest - expected).abs() > amount * RECEIVER_TOLERANCE {
        risk += RECEIVER_MISMATCH;
        factors.push("Receiver balance change does not match the amount".into());
    }
    risk
}

fn missing_context_risk(tx: &Transaction, factors: &mut Vec<String>) -> f64 {
    let mut risk = 0.0;
    if !tx.has_ip_address() {
        risk += MISSING_IP;
        factors.push("No IP address provided".into());
    }
    if !tx.has_device_id() {
        risk += MISSING_DEVICE;
        factors.push("No device identifier provided".into());
    }
    risk
}

/// Higher when the classifier is decisive and when identifying context is present.
fn confidence(tx: &Transaction, probability: f64) -> f64 {
    let mut c = CONFIDENCE_BASE + (probability - 0.5).abs() * 2.0 * CONFIDENCE_MODEL_WEIGHT;
    if tx.has_ip_address() {
        c += CONFIDENCE_PER_IDENTIFIER;
    }
    if tx.has_device_id() {
        c += CONFIDENCE_PER_IDENTIFIER;
    }
    c.clamp(0.0, 1.0)
}

fn sanitize(probability: f64) -> f64 {
    if probability.is_nan() {
        0.0
    } else {
        probability.clamp(0.0, 1.0)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureBuilder;
    use crate::model::heuristic_probability;

    fn engine() -> RiskFusionEngine {
        RiskFusionEngine::new(RiskConfig::default())
    }

    fn heuristic(tx: &Transaction) -> f64 {
        heuristic_probability(&FeatureBuilder::default().build(tx))
    }

    fn with_context(mut tx: Transaction) -> Transaction {
        tx.ip_address = Some("203.0.113.7".into());
        tx.device_id = Some("device_12345".into());
        tx
    }

    #[test]
    fn consistent_transfer_is_moderate() {
        let tx = Transaction::new(TransactionType::Transfer, 150_000.0)
            .with_balances(200_000.0, 50_000.0, 100_000.0, 250_000.0);
        let a = engine().assess(&tx, heuristic(&tx));
        // 30 * 1.2 + round amount 3 + missing ip/device 10
        assert_eq!(a.risk_score, 49.0);
        assert!(a.risk_level <= RiskTier::Medium);
        assert!(!a.should_block);
        assert!(!a.requires_step_up);
    }

    #[test]
    fn drained_sender_and_static_receiver() {
        let tx = Transaction::new(TransactionType::Transfer, 500_000.0).with_balances(500_000.0, 0.0, 0.0, 0.0);
        let e = engine();
        let p = heuristic(&tx);
        let b = e.breakdown(&tx, p);
        assert!(b.balance > 30.0);
        assert_eq!(b.balance, 15.0 + 20.0 + 12.0);
        let a = e.assess(&tx, p);
        assert!(a.risk_level >= RiskTier::High);
        assert!(a.should_block);
        assert_eq!(a.risk_score, 100.0);
    }

    #[test]
    fn vpn_adds_forty_points() {
        let tx = Transaction::new(TransactionType::Payment, 1_000.0);
        let mut vpn = tx.clone();
        vpn.network.uses_vpn = true;
        let e = engine();
        let without = e.assess(&tx, heuristic(&tx)).risk_score;
        let with = e.assess(&vpn, heuristic(&vpn)).risk_score;
        assert!(with - without >= 40.0 - 1e-9);
        assert!(with <= 100.0);
    }

    #[test]
    fn chargeback_contribution_is_capped() {
        let mut tx = with_context(
            Transaction::new(TransactionType::Payment, 1_000.0).with_balances(5_000.0, 4_000.0, 0.0, 1_000.0),
        );
        tx.identity.previous_chargebacks = 3;
        let b = engine().breakdown(&tx, 0.01);
        assert_eq!(b.signals, 50.0);
        assert_eq!(b.factors, vec!["3 previous chargeback(s)".to_string()]);
    }

    #[test]
    fn assess_is_deterministic() {
        let mut tx = Transaction::new(TransactionType::CashOut, 12_345.67).with_balances(20_000.0, 0.0, 3.0, 9.0);
        tx.network.uses_proxy = true;
        tx.velocity.card_txn_last_hour = 5;
        let e = engine();
        assert_eq!(e.assess(&tx, 0.42), e.assess(&tx, 0.42));
    }

    #[test]
    fn score_never_decreases_with_probability() {
        let e = engine();
        let txs = [
            Transaction::new(TransactionType::Payment, 50.0),
            Transaction::new(TransactionType::CashIn, 250_000.0).with_balances(1.0, 2.0, 3.0, 4.0),
            with_context(
                Transaction::new(TransactionType::Transfer, 9_000.0).with_balances(9_000.0, 0.0, 0.0, 9_000.0),
            ),
        ];
        for tx in &txs {
            let mut last = f64::MIN;
            for step in 0..=100 {
                let score = e.assess(tx, step as f64 / 100.0).risk_score;
                assert!(score >= last, "score dropped at p={step}%");
                last = score;
            }
        }
    }

    #[test]
    fn score_and_confidence_stay_bounded() {
        let mut tx = Transaction::new(TransactionType::CashOut, 9_990_000.0).with_balances(9_990_000.0, 0.0, 7.0, 0.0);
        tx.network.uses_tor = true;
        tx.network.uses_vpn = true;
        tx.identity.previous_chargebacks = 9;
        let e = engine();
        for p in [0.0, 0.5, 1.0, 7.0, -3.0, f64::NAN] {
            let a = e.assess(&tx, p);
            assert!((0.0..=100.0).contains(&a.risk_score));
            assert!((0.0..=1.0).contains(&a.confidence));
        }
        let a = e.assess(&Transaction::new(TransactionType::CashIn, 1_000.0).with_balances(1_000.0, 2_000.0, 0.0, 1_000.0), 0.0);
        assert!((0.0..=100.0).contains(&a.risk_score));
    }

    #[test]
    fn tiers_partition_the_unit_interval() {
        let t = TierThresholds::default();
        assert_eq!(RiskTier::from_normalized(0.0, &t), RiskTier::Low);
        assert_eq!(RiskTier::from_normalized(0.3499, &t), RiskTier::Low);
        assert_eq!(RiskTier::from_normalized(0.35, &t), RiskTier::Medium);
        assert_eq!(RiskTier::from_normalized(0.6499, &t), RiskTier::Medium);
        assert_eq!(RiskTier::from_normalized(0.65, &t), RiskTier::High);
        assert_eq!(RiskTier::from_normalized(0.85, &t), RiskTier::Critical);
        assert_eq!(RiskTier::from_normalized(1.0, &t), RiskTier::Critical);
        let mut prev = RiskTier::Low;
        for i in 0..=1000 {
            let tier = RiskTier::from_normalized(i as f64 / 1000.0, &t);
            assert!(tier >= prev);
            prev = tier;
        }
    }

    #[test]
    fn step_up_and_block_thresholds_are_independent() {
        let mut config = RiskConfig::default();
        config.step_up_threshold = 0.2;
        config.block_threshold = 0.95;
        let e = RiskFusionEngine::new(config);
        let tx = with_context(
            Transaction::new(TransactionType::Payment, 1_000.0).with_balances(5_000.0, 4_000.0, 0.0, 1_000.0),
        );
        // 0.4 * 100 * 0.8 = 32
        let a = e.assess(&tx, 0.4);
        assert_eq!(a.risk_score, 32.0);
        assert!(a.requires_step_up);
        assert!(!a.should_block);
        assert_eq!(a.risk_level, RiskTier::Low);
    }

    #[test]
    fn confidence_rewards_decisive_model_and_context() {
        let e = engine();
        let bare = Transaction::new(TransactionType::Payment, 1_000.0);
        assert_eq!(e.assess(&bare, 0.5).confidence, 0.5);
        assert_eq!(e.assess(&bare, 1.0).confidence, 0.8);
        assert_eq!(e.assess(&with_context(bare.clone()), 0.0).confidence, 1.0);
        assert_eq!(e.assess(&with_context(bare), 0.75).confidence, 0.85);
    }

    #[test]
    fn amount_bands() {
        let e = engine();
        let mut factors = Vec::new();
        assert_eq!(e.amount_risk(2_000_000.0, &mut factors), 15.0 + 3.0);
        assert_eq!(e.amount_risk(600_000.0, &mut factors), 10.0 + 3.0);
        assert_eq!(e.amount_risk(250_000.5, &mut factors), 5.0);
        assert_eq!(e.amount_risk(50.0, &mut factors), 8.0);
        assert_eq!(e.amount_risk(499.0, &mut factors), 3.0);
        assert_eq!(e.amount_risk(10_000.0, &mut factors), 0.0);
        assert_eq!(e.amount_risk(1_234.0, &mut factors), 0.0);
        assert_eq!(factors.len(), 7);
    }

    #[test]
    fn factors_follow_stage_order() {
        let mut tx = Transaction::new(TransactionType::CashOut, 50.0).with_balances(50.0, 0.0, 0.0, 50.0);
        tx.network.uses_vpn = true;
        let a = engine().assess(&tx, 0.9);
        assert_eq!(
            a.risk_factors,
            vec![
                "High-risk transaction type: CASH_OUT".to_string(),
                "Suspiciously small amount: 50.00".to_string(),
                "Sender balance fully drained".to_string(),
                "No IP address provided".to_string(),
                "No device identifier provided".to_string(),
                "Connection through a VPN".to_string(),
            ]
        );
    }
}
