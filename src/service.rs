//! Request-level orchestration: validate, estimate, fuse, recommend. Evidence archiving and
//! notification run on a background worker and never delay or fail the response.

use crate::config::{AppConfig, FraudShareEntry, ValidationConfig};
use crate::model::{EstimatorStatistics, ProbabilityEstimator};
use crate::notify::{AnalysisEvent, Notifier};
use crate::risk::{recommendations, RiskAssessment, RiskFusionEngine, RiskTier};
use crate::storage::{EvidenceRecord, EvidenceStore};
use crate::transaction::{Transaction, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEV_SECRET: &[u8] = b"fraudguard-dev-secret";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub transaction_id: String,
    pub is_fraud: bool,
    pub fraud_probability: f64,
    pub risk_level: RiskTier,
    pub risk_score: f64,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub requires_3d_secure: bool,
    pub should_block: bool,
    pub risk_factors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
    pub backend: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

struct Job {
    transaction_id: String,
    tx: Transaction,
    probability: f64,
    is_fraud: bool,
    assessment: RiskAssessment,
    timestamp: DateTime<Utc>,
}

struct Background {
    queue: mpsc::Sender<Job>,
    worker: JoinHandle<()>,
}

pub struct FraudService {
    estimator: ProbabilityEstimator,
    engine: RiskFusionEngine,
    validation: ValidationConfig,
    fraud_threshold: f64,
    evidence: Option<Arc<EvidenceStore>>,
    notifier: Arc<Notifier>,
    background: Option<Background>,
    dropped_jobs: AtomicU64,
}

impl FraudService {
    pub fn new(
        config: &AppConfig,
        estimator: ProbabilityEstimator,
        evidence: Option<Arc<EvidenceStore>>,
        notifier: Arc<Notifier>,
    ) -> Self {
        let background = spawn_worker(config.service.queue_capacity, evidence.clone(), notifier.clone());
        Self::assemble(config, estimator, evidence, notifier, background)
    }

    fn assemble(
        config: &AppConfig,
        estimator: ProbabilityEstimator,
        evidence: Option<Arc<EvidenceStore>>,
        notifier: Arc<Notifier>,
        background: Option<Background>,
    ) -> Self {
        Self {
            estimator,
            engine: RiskFusionEngine::new(config.risk.clone()),
            validation: config.validation.clone(),
            fraud_threshold: config.service.fraud_threshold,
            evidence,
            notifier,
            background,
            dropped_jobs: AtomicU64::new(0),
        }
    }

    /// Wire everything from configuration. A store that cannot be opened disables archiving.
    pub fn from_config(config: &AppConfig) -> Self {
        let estimator = ProbabilityEstimator::load(config);
        let evidence = if config.storage.enabled {
            open_evidence_store(config)
        } else {
            None
        };
        let notifier = Arc::new(Notifier::new(&config.notify));
        Self::new(config, estimator, evidence, notifier)
    }

    pub fn analyze(&self, tx: &Transaction) -> Result<TransactionResponse, ValidationError> {
        tx.validate(&self.validation)?;

        let probability = self.estimator.predict(tx);
        let assessment = self.engine.assess(tx, probability);
        let is_fraud = probability > self.fraud_threshold;
        let transaction_id = tx
            .transaction_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("TXN_{}", uuid::Uuid::new_v4()));
        let timestamp = Utc::now();

        let response = TransactionResponse {
            transaction_id: transaction_id.clone(),
            is_fraud,
            fraud_probability: (probability * 10_000.0).round() / 10_000.0,
            risk_level: assessment.risk_level,
            risk_score: assessment.risk_score,
            confidence: assessment.confidence,
            recommendations: recommendations(&assessment, tx.kind),
            requires_3d_secure: assessment.requires_step_up,
            should_block: assessment.should_block,
            risk_factors: assessment.risk_factors.clone(),
            timestamp,
        };

        if assessment.should_block {
            warn!(
                transaction_id = %transaction_id,
                risk_score = assessment.risk_score,
                risk_level = %assessment.risk_level,
                "transaction blocked"
            );
        }

        self.enqueue(Job {
            transaction_id,
            tx: tx.clone(),
            probability,
            is_fraud,
            assessment,
            timestamp,
        });
        Ok(response)
    }

    /// Independent analyses in input order; one bad entry does not affect the rest.
    pub fn analyze_batch(&self, txs: &[Transaction]) -> Vec<Result<TransactionResponse, ValidationError>> {
        txs.iter().map(|tx| self.analyze(tx)).collect()
    }

    pub fn statistics(&self) -> EstimatorStatistics {
        self.estimator.get_statistics()
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            model_loaded: self.estimator.is_model_loaded(),
            backend: self.estimator.backend().to_string(),
            version: SERVICE_VERSION.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn update_fraud_shares(&self, entries: &[FraudShareEntry]) -> usize {
        self.estimator.features().update_fraud_shares(entries)
    }

    /// Archive/notify jobs discarded because the background queue was full or stopped.
    pub fn dropped_jobs(&self) -> u64 {
        self.dropped_jobs.load(Ordering::Relaxed)
    }

    pub fn estimator(&self) -> &ProbabilityEstimator {
        &self.estimator
    }

    pub fn engine(&self) -> &RiskFusionEngine {
        &self.engine
    }

    pub fn evidence(&self) -> Option<&Arc<EvidenceStore>> {
        self.evidence.as_ref()
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Drain pending background work and stop the worker.
    pub fn shutdown(mut self) {
        if let Some(Background { queue, worker }) = self.background.take() {
            drop(queue);
            if worker.join().is_err() {
                error!("background worker panicked");
            }
        }
    }

    fn enqueue(&self, job: Job) {
        match &self.background {
            Some(bg) => match bg.queue.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => {
                    self.dropped_jobs.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        transaction_id = %job.transaction_id,
                        "background queue full; evidence and notification skipped"
                    );
                }
                Err(TrySendError::Closed(job)) => {
                    self.dropped_jobs.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        transaction_id = %job.transaction_id,
                        "background worker stopped; evidence and notification skipped"
                    );
                }
            },
            None => run_side_effects(self.evidence.as_deref(), &self.notifier, job),
        }
    }
}

fn open_evidence_store(config: &AppConfig) -> Option<Arc<EvidenceStore>> {
    let secret = match std::env::var(&config.storage.secret_env) {
        Ok(s) if !s.is_empty() => s.into_bytes(),
        _ => {
            warn!(
                env = %config.storage.secret_env,
                "evidence secret not set; using development secret"
            );
            DEV_SECRET.to_vec()
        }
    };
    if let Some(parent) = config.storage.path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(path = ?parent, error = %e, "cannot create evidence directory; archiving disabled");
            return None;
        }
    }
    match EvidenceStore::open(&config.storage.path, &secret) {
        Ok(store) => {
            info!(path = ?config.storage.path, "evidence archive opened");
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!(path = ?config.storage.path, error = %e, "evidence archive unavailable; archiving disabled");
            None
        }
    }
}

fn spawn_worker(
    capacity: usize,
    evidence: Option<Arc<EvidenceStore>>,
    notifier: Arc<Notifier>,
) -> Option<Background> {
    let (queue, mut rx) = mpsc::channel::<Job>(capacity.max(1));
    let spawned = std::thread::Builder::new()
        .name("fraudguard-background".to_string())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                run_side_effects(evidence.as_deref(), &notifier, job);
            }
        });
    match spawned {
        Ok(worker) => Some(Background { queue, worker }),
        Err(e) => {
            warn!(error = %e, "cannot start background worker; side effects run inline");
            None
        }
    }
}

fn run_side_effects(evidence: Option<&EvidenceStore>, notifier: &Notifier, job: Job) {
    if let Some(store) = evidence {
        let record = EvidenceRecord::from_assessment(&job.transaction_id, &job.tx, job.probability, &job.assessment);
        if let Err(e) = store.record_assessment(&record) {
            error!(transaction_id = %job.transaction_id, error = %e, "evidence archiving failed");
        }
    }
    let event = AnalysisEvent::new(
        &job.transaction_id,
        job.assessment.risk_score,
        job.probability,
        job.is_fraud,
        job.timestamp,
    );
    notifier.publish(&event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyConfig;
    use crate::transaction::TransactionType;

    fn service(evidence: Option<Arc<EvidenceStore>>) -> FraudService {
        let config = AppConfig::default();
        FraudService::new(
            &config,
            ProbabilityEstimator::heuristic(&config),
            evidence,
            Arc::new(Notifier::new(&NotifyConfig::default())),
        )
    }

    #[test]
    fn generates_id_when_missing() {
        let svc = service(None);
        let r = svc.analyze(&Transaction::new(TransactionType::Payment, 50.0)).unwrap();
        assert!(r.transaction_id.starts_with("TXN_"));

        let mut tx = Transaction::new(TransactionType::Payment, 50.0);
        tx.transaction_id = Some("order-42".into());
        assert_eq!(svc.analyze(&tx).unwrap().transaction_id, "order-42");
    }

    #[test]
    fn invalid_input_is_rejected_before_scoring() {
        let svc = service(None);
        let r = svc.analyze(&Transaction::new(TransactionType::Payment, -5.0));
        assert_eq!(r, Err(ValidationError::NonPositiveAmount(-5.0)));
        assert_eq!(svc.statistics().total_predictions, 0);
    }

    #[test]
    fn drained_transfer_is_flagged_and_blocked() {
        let svc = service(None);
        let mut tx = Transaction::new(TransactionType::Transfer, 181.0).with_balances(181.0, 0.0, 0.0, 0.0);
        tx.ip_address = Some("10.0.0.1".into());
        tx.device_id = Some("dev-1".into());
        let r = svc.analyze(&tx).unwrap();
        assert!(r.is_fraud);
        assert_eq!(r.fraud_probability, 0.95);
        assert!(r.should_block);
        assert!(r.requires_3d_secure);
        assert_eq!(r.recommendations[0], "BLOCK TRANSACTION - high fraud risk");
    }

    #[test]
    fn batch_preserves_order_and_isolates_errors() {
        let svc = service(None);
        let txs = vec![
            Transaction::new(TransactionType::Payment, 10.0),
            Transaction::new(TransactionType::Payment, 0.0),
            Transaction::new(TransactionType::CashIn, 20.0),
        ];
        let out = svc.analyze_batch(&txs);
        assert_eq!(out.len(), 3);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert!(out[2].is_ok());
        assert_eq!(svc.statistics().total_predictions, 2);
    }

    #[test]
    fn archives_and_notifies_in_background() {
        let store = Arc::new(EvidenceStore::open_in_memory(b"test-secret").unwrap());
        let svc = service(Some(store.clone()));
        let mut rx = svc.notifier().subscribe();

        let mut tx = Transaction::new(TransactionType::CashOut, 5_000.0);
        tx.ip_address = Some("192.0.2.7".into());
        let r = svc.analyze(&tx).unwrap();
        svc.shutdown();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.transaction_id, r.transaction_id);
        assert_eq!(event.risk_score, r.risk_score);

        let record = store.get_evidence(&r.transaction_id).unwrap().unwrap();
        assert_eq!(record.amount, 5_000.0);
        assert_eq!(record.ip_logs.len(), 1);
    }

    #[test]
    fn full_queue_drops_jobs_instead_of_growing() {
        let config = AppConfig::default();
        let (queue, mut rx) = mpsc::channel::<Job>(1);
        let worker = std::thread::spawn(|| {});
        let svc = FraudService::assemble(
            &config,
            ProbabilityEstimator::heuristic(&config),
            None,
            Arc::new(Notifier::new(&NotifyConfig::default())),
            Some(Background { queue, worker }),
        );

        for _ in 0..3 {
            assert!(svc.analyze(&Transaction::new(TransactionType::Payment, 10.0)).is_ok());
        }
        assert_eq!(svc.dropped_jobs(), 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        svc.shutdown();
    }

    #[test]
    fn health_reports_backend() {
        let h = service(None).health();
        assert_eq!(h.status, "healthy");
        assert!(!h.model_loaded);
        assert_eq!(h.backend, "heuristic");
    }
}
