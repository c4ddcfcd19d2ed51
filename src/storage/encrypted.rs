//! SQLite-backed evidence store with AES-GCM encryption of the record payload.
//! Key derived from a deployment secret.

use super::record::{ChargebackPackage, Communication, EvidenceRecord};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("payload encryption failed")]
    Crypto,
    #[error("payload encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("payload too short")]
    Truncated,
    #[error("payload serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String, StoreError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| StoreError::Crypto)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| StoreError::Crypto)?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>, StoreError> {
    let raw = BASE64.decode(encoded)?;
    if raw.len() < NONCE_LEN {
        return Err(StoreError::Truncated);
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| StoreError::Crypto)?;
    cipher.decrypt(nonce.into(), ct).map_err(|_| StoreError::Crypto)
}

pub struct EvidenceStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl EvidenceStore {
    /// Open or create DB at path. Key is derived from `secret`.
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?, secret)
    }

    pub fn open_in_memory(secret: &[u8]) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, secret)
    }

    fn init(conn: Connection, secret: &[u8]) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS evidence (
                transaction_id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                risk_score REAL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_evidence_ts ON evidence(ts);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: derive_key(secret),
        })
    }

    fn write(&self, conn: &Connection, record: &EvidenceRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(record)?;
        let enc = encrypt(&self.key, &payload)?;
        conn.execute(
            "INSERT OR REPLACE INTO evidence (transaction_id, ts, risk_score, payload_enc) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.transaction_id,
                record.timestamp.timestamp_millis(),
                record.risk_score,
                enc
            ],
        )?;
        Ok(())
    }

    fn read(&self, conn: &Connection, transaction_id: &str) -> Result<Option<EvidenceRecord>, StoreError> {
        let enc: Option<String> = conn
            .query_row(
                "SELECT payload_enc FROM evidence WHERE transaction_id = ?1",
                params![transaction_id],
                |row| row.get(0),
            )
            .optional()?;
        match enc {
            Some(enc) => {
                let plain = decrypt(&self.key, &enc)?;
                Ok(Some(serde_json::from_slice(&plain)?))
            }
            None => Ok(None),
        }
    }

    /// Read-modify-write under the connection lock. `false` when the id is unknown.
    fn update(
        &self,
        transaction_id: &str,
        apply: impl FnOnce(&mut EvidenceRecord),
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut record) = self.read(&conn, transaction_id)? else {
            warn!(transaction_id, "evidence not found");
            return Ok(false);
        };
        apply(&mut record);
        self.write(&conn, &record)?;
        Ok(true)
    }

    /// Store (or replace) the evidence captured at assessment time
    pub fn record_assessment(&self, record: &EvidenceRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(&conn, record)?;
        info!(transaction_id = %record.transaction_id, "evidence recorded");
        Ok(())
    }

    pub fn get_evidence(&self, transaction_id: &str) -> Result<Option<EvidenceRecord>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        self.read(&conn, transaction_id)
    }

    pub fn add_delivery_info(
        &self,
        transaction_id: &str,
        tracking_number: &str,
        signature: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.update(transaction_id, |r| {
            r.tracking_number = Some(tracking_number.to_string());
            r.delivery_signature = signature.map(str::to_string);
        })
    }

    pub fn add_communication(
        &self,
        transaction_id: &str,
        message_type: &str,
        content: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        self.update(transaction_id, |r| {
            r.customer_communication.push(Communication {
                message_type: message_type.to_string(),
                content: content.to_string(),
                timestamp: timestamp.unwrap_or_else(Utc::now),
            });
        })
    }

    pub fn add_screenshot(&self, transaction_id: &str, screenshot_url: &str) -> Result<bool, StoreError> {
        self.update(transaction_id, |r| r.screenshots.push(screenshot_url.to_string()))
    }

    pub fn export_for_chargeback(&self, transaction_id: &str) -> Result<Option<ChargebackPackage>, StoreError> {
        let package = self.get_evidence(transaction_id)?.map(ChargebackPackage::from);
        if package.is_some() {
            info!(transaction_id, "chargeback package exported");
        }
        Ok(package)
    }

    /// Retention: delete evidence recorded before the given unix-millis timestamp
    pub fn prune_before(&self, ts: i64) -> Result<u64, StoreError> {
        let n = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .execute("DELETE FROM evidence WHERE ts < ?1", params![ts])?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{RiskAssessment, RiskTier};
    use crate::transaction::{Transaction, TransactionType};

    fn record(id: &str) -> EvidenceRecord {
        let mut tx = Transaction::new(TransactionType::Transfer, 150_000.0);
        tx.ip_address = Some("192.168.1.1".into());
        tx.device_id = Some("device_12345".into());
        let assessment = RiskAssessment {
            risk_level: RiskTier::Medium,
            risk_score: 49.0,
            confidence: 0.74,
            requires_step_up: false,
            should_block: false,
            risk_factors: vec![],
        };
        EvidenceRecord::from_assessment(id, &tx, 0.3, &assessment)
    }

    #[test]
    fn payload_is_encrypted_at_rest() {
        let store = EvidenceStore::open_in_memory(b"test-secret").unwrap();
        store.record_assessment(&record("TXN_1")).unwrap();
        let conn = store.conn.lock().unwrap();
        let enc: String = conn
            .query_row("SELECT payload_enc FROM evidence", [], |r| r.get(0))
            .unwrap();
        assert!(!enc.contains("192.168.1.1"));
        assert!(!enc.contains("TXN_1"));
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let key = derive_key(b"a");
        let other = derive_key(b"b");
        let enc = encrypt(&key, b"payload").unwrap();
        assert_eq!(decrypt(&key, &enc).unwrap(), b"payload");
        assert!(matches!(decrypt(&other, &enc), Err(StoreError::Crypto)));
        assert!(matches!(decrypt(&key, "AAAA"), Err(StoreError::Truncated)));
    }

    #[test]
    fn updates_and_export() {
        let store = EvidenceStore::open_in_memory(b"test-secret").unwrap();
        store.record_assessment(&record("TXN_2")).unwrap();
        assert!(store.add_delivery_info("TXN_2", "TRACK-1", Some("J. Doe")).unwrap());
        assert!(store.add_communication("TXN_2", "email", "order confirmed", None).unwrap());
        assert!(store.add_screenshot("TXN_2", "s3://evidence/1.png").unwrap());
        assert!(!store.add_screenshot("missing", "x").unwrap());

        let pkg = store.export_for_chargeback("TXN_2").unwrap().unwrap();
        assert_eq!(pkg.delivery_proof.tracking_number.as_deref(), Some("TRACK-1"));
        assert_eq!(pkg.delivery_proof.signature.as_deref(), Some("J. Doe"));
        assert_eq!(pkg.customer_communication.len(), 1);
        assert_eq!(pkg.customer_communication[0].message_type, "email");
        assert_eq!(pkg.technical_data.ip_logs.len(), 1);
        assert!(pkg.technical_data.device_fingerprint.is_some());
        assert_eq!(pkg.visual_proof.screenshots, vec!["s3://evidence/1.png".to_string()]);
        assert!(store.export_for_chargeback("missing").unwrap().is_none());
    }

    #[test]
    fn prune_removes_old_records() {
        let store = EvidenceStore::open_in_memory(b"test-secret").unwrap();
        let mut old = record("old");
        old.timestamp = DateTime::from_timestamp_millis(1_000).unwrap();
        store.record_assessment(&old).unwrap();
        store.record_assessment(&record("new")).unwrap();
        assert_eq!(store.prune_before(2_000).unwrap(), 1);
        assert!(store.get_evidence("old").unwrap().is_none());
        assert!(store.get_evidence("new").unwrap().is_some());
    }
}
