//! Operator-facing recommendations derived from an assessment.

use super::{RiskAssessment, RiskTier};
use crate::transaction::TransactionType;

pub fn recommendations(assessment: &RiskAssessment, kind: TransactionType) -> Vec<String> {
    let mut out = Vec::new();

    if assessment.should_block {
        out.push("BLOCK TRANSACTION - high fraud risk".to_string());
    }
    if assessment.requires_step_up {
        out.push("Require 3-D Secure confirmation".to_string());
    }

    const ELEVATED: [&str; 3] = [
        "Request additional user verification",
        "Review the customer's transaction history",
        "Record the IP address and device details",
    ];
    match assessment.risk_level {
        RiskTier::Critical => {
            out.push("Hold for manual fraud review".to_string());
            out.extend(ELEVATED.map(String::from));
        }
        RiskTier::High => out.extend(ELEVATED.map(String::from)),
        RiskTier::Medium => out.extend(
            [
                "Monitor this transaction",
                "Preserve all evidence of the operation",
            ]
            .map(String::from),
        ),
        RiskTier::Low => {
            out.push("Transaction can be processed normally".to_string());
        }
    }

    if kind.is_fraud_eligible() {
        out.push("Elevated risk for this transaction type - apply enhanced controls".to_string());
    }
    out
}
