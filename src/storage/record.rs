//! Evidence kept per transaction and the package exported when a chargeback is disputed.

use crate::risk::{RiskAssessment, RiskTier};
use crate::transaction::{Transaction, TransactionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
    pub fraud_probability: f64,
    pub risk_level: RiskTier,
    pub risk_score: f64,
    pub tracking_number: Option<String>,
    pub delivery_signature: Option<String>,
    pub customer_communication: Vec<Communication>,
    pub ip_logs: Vec<String>,
    pub device_fingerprint: Option<String>,
    pub screenshots: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl EvidenceRecord {
    pub fn from_assessment(
        transaction_id: &str,
        tx: &Transaction,
        fraud_probability: f64,
        assessment: &RiskAssessment,
    ) -> Self {
        let now = Utc::now();
        let ip_logs = tx
            .ip_address
            .as_deref()
            .filter(|ip| !ip.trim().is_empty())
            .map(|ip| {
                vec![format!(
                    "{} - IP: {} - Amount: {} - Type: {}",
                    now.to_rfc3339(),
                    ip,
                    tx.amount,
                    tx.kind
                )]
            })
            .unwrap_or_default();

        Self {
            transaction_id: transaction_id.to_string(),
            kind: tx.kind,
            amount: tx.amount,
            fraud_probability,
            risk_level: assessment.risk_level,
            risk_score: assessment.risk_score,
            tracking_number: None,
            delivery_signature: None,
            customer_communication: Vec::new(),
            ip_logs,
            device_fingerprint: device_fingerprint(tx),
            screenshots: Vec::new(),
            timestamp: now,
        }
    }
}

/// SHA-256 over the device identifier and whatever client details came with it.
pub fn device_fingerprint(tx: &Transaction) -> Option<String> {
    let device_id = tx.device_id.as_deref().filter(|d| !d.trim().is_empty())?;
    let mut hasher = Sha256::new();
    for part in [
        Some(device_id),
        tx.user_agent.as_deref(),
        tx.device.device_os.as_deref(),
        tx.device.browser.as_deref(),
    ] {
        hasher.update(part.unwrap_or("").as_bytes());
        hasher.update(b"|");
    }
    Some(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryProof {
    pub tracking_number: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalData {
    pub ip_logs: Vec<String>,
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualProof {
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargebackPackage {
    pub transaction_id: String,
    pub evidence_collected_at: String,
    pub delivery_proof: DeliveryProof,
    pub customer_communication: Vec<Communication>,
    pub technical_data: TechnicalData,
    pub visual_proof: VisualProof,
}

impl From<EvidenceRecord> for ChargebackPackage {
    fn from(r: EvidenceRecord) -> Self {
        Self {
            transaction_id: r.transaction_id,
            evidence_collected_at: r.timestamp.to_rfc3339(),
            delivery_proof: DeliveryProof {
                tracking_number: r.tracking_number,
                signature: r.delivery_signature,
            },
            customer_communication: r.customer_communication,
            technical_data: TechnicalData {
                ip_logs: r.ip_logs,
                device_fingerprint: r.device_fingerprint,
            },
            visual_proof: VisualProof {
                screenshots: r.screenshots,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_requires_device_id() {
        let mut tx = Transaction::new(TransactionType::Payment, 10.0);
        assert_eq!(device_fingerprint(&tx), None);
        tx.device_id = Some("device_12345".into());
        let a = device_fingerprint(&tx).unwrap();
        assert_eq!(a.len(), 64);
        tx.device.browser = Some("firefox".into());
        assert_ne!(device_fingerprint(&tx).unwrap(), a);
    }
}
