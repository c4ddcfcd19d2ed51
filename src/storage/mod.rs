//! Encrypted evidence archive for chargeback disputes.

mod encrypted;
mod record;

pub use encrypted::{EvidenceStore, StoreError};
pub use record::{
    ChargebackPackage, Communication, DeliveryProof, EvidenceRecord, TechnicalData, VisualProof,
};
