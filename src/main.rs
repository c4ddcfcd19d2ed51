//! FraudGuard entrypoint: newline-delimited JSON transactions on stdin, one JSON response per
//! line on stdout. Rejected lines produce an error object instead of a response.

use fraudguard::{
    config::AppConfig,
    logging::{ErrorLine, StructuredLogger},
    service::FraudService,
    transaction::Transaction,
};
use std::io::{BufRead, Write};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("FRAUDGUARD_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = AppConfig::load(&config_path)?.with_env_overrides();

    StructuredLogger::init(config.log.json, &config.log.level);
    config.validate()?;

    info!(config = ?config_path, model = ?config.model.path, "FraudGuard starting");

    let service = FraudService::from_config(&config);
    let health = service.health();
    info!(
        model_loaded = health.model_loaded,
        backend = %health.backend,
        version = %health.version,
        "service ready"
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut line_no: u64 = 0;

    for line in stdin.lock().lines() {
        let line = line?;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let tx: Transaction = match serde_json::from_str(&line) {
            Ok(tx) => tx,
            Err(e) => {
                let msg = e.to_string();
                warn!(line = line_no, error = %msg, "malformed transaction");
                StructuredLogger::emit_json(&ErrorLine::new(line_no, None, &msg), &mut out)?;
                continue;
            }
        };
        match service.analyze(&tx) {
            Ok(response) => StructuredLogger::emit_json(&response, &mut out)?,
            Err(e) => {
                let msg = e.to_string();
                warn!(line = line_no, error = %msg, "transaction rejected");
                StructuredLogger::emit_json(
                    &ErrorLine::new(line_no, tx.transaction_id.as_deref(), &msg),
                    &mut out,
                )?;
            }
        }
        out.flush()?;
    }

    let stats = service.statistics();
    info!(
        total_predictions = stats.total_predictions,
        fraud_detected = stats.fraud_detected,
        fraud_rate = stats.fraud_rate,
        backend = %stats.backend,
        dropped_background_jobs = service.dropped_jobs(),
        "input exhausted"
    );
    service.shutdown();
    info!("FraudGuard stopped");
    Ok(())
}
