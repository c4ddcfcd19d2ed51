//! Transaction record as received from the caller, plus the validation the request layer applies
//! before anything reaches the risk pipeline.
//!
//! Optional context uses explicit defaults. Tri-state signals (`Option<bool>`, `Option<u32>`) are
//! only weighed when the caller actually supplied them.

use crate::config::ValidationConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Payment,
    Transfer,
    CashOut,
    CashIn,
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Payment => "PAYMENT",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::CashOut => "CASH_OUT",
            TransactionType::CashIn => "CASH_IN",
            TransactionType::Debit => "DEBIT",
        }
    }

    /// Fraud in the training data only ever occurs on these two types.
    pub fn is_fraud_eligible(&self) -> bool {
        matches!(self, TransactionType::Transfer | TransactionType::CashOut)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,

    #[serde(default, rename = "nameOrig", skip_serializing_if = "Option::is_none")]
    pub name_orig: Option<String>,
    #[serde(default, rename = "oldbalanceOrg")]
    pub old_balance_orig: f64,
    #[serde(default, rename = "newbalanceOrig")]
    pub new_balance_orig: f64,

    #[serde(default, rename = "nameDest", skip_serializing_if = "Option::is_none")]
    pub name_dest: Option<String>,
    #[serde(default, rename = "oldbalanceDest")]
    pub old_balance_dest: f64,
    #[serde(default, rename = "newbalanceDest")]
    pub new_balance_dest: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub network: NetworkSignals,
    #[serde(flatten)]
    pub device: DeviceSignals,
    #[serde(flatten)]
    pub identity: IdentitySignals,
    #[serde(flatten)]
    pub payment: PaymentSignals,
    #[serde(flatten)]
    pub behavior: BehaviorSignals,
    #[serde(flatten)]
    pub velocity: VelocitySignals,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSignals {
    pub uses_vpn: bool,
    pub uses_proxy: bool,
    pub uses_tor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSignals {
    pub is_emulator: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySignals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_verified: Option<bool>,
    /// Billing and shipping addresses differ
    pub address_mismatch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_orders: Option<u32>,
    pub previous_chargebacks: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSignals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub three_ds_passed: Option<bool>,
    /// Attempts for this payment including the current one
    pub payment_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_issuer_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorSignals {
    pub cart_abandon_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_length_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocitySignals {
    /// Transactions from the same card in the last hour
    pub card_txn_last_hour: u32,
    /// Transactions from the same IP in the last 24 hours
    pub ip_txn_last_24h: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(f64),
    #[error("amount {amount} exceeds the maximum of {max}")]
    AmountTooLarge { amount: f64, max: f64 },
    #[error("{0} must be a finite number")]
    NotFinite(&'static str),
    #[error("{field} must not be negative, got {value}")]
    NegativeBalance { field: &'static str, value: f64 },
    #[error("cart abandonment rate must be within [0, 1], got {0}")]
    CartAbandonRate(f64),
}

impl Transaction {
    pub fn new(kind: TransactionType, amount: f64) -> Self {
        Self {
            transaction_id: None,
            kind,
            amount,
            name_orig: None,
            old_balance_orig: 0.0,
            new_balance_orig: 0.0,
            name_dest: None,
            old_balance_dest: 0.0,
            new_balance_dest: 0.0,
            ip_address: None,
            device_id: None,
            user_agent: None,
            location: None,
            timestamp: None,
            network: NetworkSignals::default(),
            device: DeviceSignals::default(),
            identity: IdentitySignals::default(),
            payment: PaymentSignals::default(),
            behavior: BehaviorSignals::default(),
            velocity: VelocitySignals::default(),
        }
    }

    pub fn with_balances(mut self, old_orig: f64, new_orig: f64, old_dest: f64, new_dest: f64) -> Self {
        self.old_balance_orig = old_orig;
        self.new_balance_orig = new_orig;
        self.old_balance_dest = old_dest;
        self.new_balance_dest = new_dest;
        self
    }

    pub fn has_ip_address(&self) -> bool {
        self.ip_address.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub fn has_device_id(&self) -> bool {
        self.device_id.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Request-layer checks; the pipeline assumes these hold.
    pub fn validate(&self, config: &ValidationConfig) -> Result<(), ValidationError> {
        if !self.amount.is_finite() {
            return Err(ValidationError::NotFinite("amount"));
        }
        if self.amount <= 0.0 {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        if self.amount > config.max_amount {
            return Err(ValidationError::AmountTooLarge {
                amount: self.amount,
                max: config.max_amount,
            });
        }
        let balances = [
            ("oldbalanceOrg", self.old_balance_orig),
            ("newbalanceOrig", self.new_balance_orig),
            ("oldbalanceDest", self.old_balance_dest),
            ("newbalanceDest", self.new_balance_dest),
        ];
        for (field, value) in balances {
            if !value.is_finite() {
                return Err(ValidationError::NotFinite(field));
            }
            if value < 0.0 {
                return Err(ValidationError::NegativeBalance { field, value });
            }
        }
        let rate = self.behavior.cart_abandon_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ValidationError::CartAbandonRate(rate));
        }
        Ok(())
    }
}
