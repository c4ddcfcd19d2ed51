//! Fan-out of analysis results: in-process live subscribers plus optional webhook endpoints.
//! Delivery is best-effort per subscriber; one failure never affects the others.

use crate::config::NotifyConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook answered {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub transaction_id: String,
    pub risk_score: f64,
    pub probability: f64,
    pub is_fraud: bool,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisEvent {
    pub fn new(transaction_id: &str, risk_score: f64, probability: f64, is_fraud: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            risk_score: (risk_score * 100.0).round() / 100.0,
            probability: (probability * 10_000.0).round() / 10_000.0,
            is_fraud,
            timestamp,
        }
    }
}

pub struct Notifier {
    sender: broadcast::Sender<AnalysisEvent>,
    webhooks: Vec<String>,
    client: Option<reqwest::blocking::Client>,
}

impl Notifier {
    /// The HTTP client is only built when webhooks are configured. Construct outside of an async
    /// runtime: the blocking client drives its own.
    pub fn new(config: &NotifyConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        let webhooks: Vec<String> = config
            .webhooks
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        let client = if webhooks.is_empty() {
            None
        } else {
            let timeout = Duration::from_secs(config.timeout_secs.max(1));
            match reqwest::blocking::Client::builder()
                .timeout(timeout)
                .connect_timeout(timeout)
                .build()
            {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(error = %e, "webhook client unavailable; webhooks disabled");
                    None
                }
            }
        };
        Self {
            sender,
            webhooks,
            client,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn post(&self, client: &reqwest::blocking::Client, url: &str, event: &AnalysisEvent) -> Result<(), NotifyError> {
        let res = client.post(url).json(event).send()?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }
        Ok(())
    }

    /// Returns the number of successful deliveries (live subscribers + webhooks).
    pub fn publish(&self, event: &AnalysisEvent) -> usize {
        // send only fails when nobody is listening
        let mut delivered = self.sender.send(event.clone()).unwrap_or(0);

        if let Some(client) = &self.client {
            for url in &self.webhooks {
                match self.post(client, url, event) {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!(
                        transaction_id = %event.transaction_id,
                        url = %url,
                        error = %e,
                        "webhook delivery failed"
                    ),
                }
            }
        }
        debug!(transaction_id = %event.transaction_id, delivered, "analysis broadcast");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn event(id: &str) -> AnalysisEvent {
        AnalysisEvent::new(id, 49.004, 0.300049, false, Utc::now())
    }

    #[test]
    fn rounds_fields() {
        let e = event("TXN_1");
        assert_eq!(e.risk_score, 49.0);
        assert_eq!(e.probability, 0.3);
    }

    #[test]
    fn no_subscribers_is_not_an_error() {
        let n = Notifier::new(&NotifyConfig::default());
        assert_eq!(n.publish(&event("TXN_1")), 0);
    }

    #[test]
    fn every_subscriber_receives() {
        let n = Notifier::new(&NotifyConfig::default());
        let mut a = n.subscribe();
        let mut b = n.subscribe();
        let dropped = n.subscribe();
        drop(dropped);
        assert_eq!(n.subscriber_count(), 2);
        assert_eq!(n.publish(&event("TXN_2")), 2);
        assert_eq!(a.try_recv().unwrap().transaction_id, "TXN_2");
        assert_eq!(b.try_recv().unwrap().transaction_id, "TXN_2");
    }

    #[test]
    fn lagging_subscriber_does_not_block_others() {
        let config = NotifyConfig {
            channel_capacity: 1,
            ..NotifyConfig::default()
        };
        let n = Notifier::new(&config);
        let mut slow = n.subscribe();
        let mut fast = n.subscribe();
        n.publish(&event("TXN_1"));
        assert_eq!(fast.try_recv().unwrap().transaction_id, "TXN_1");
        n.publish(&event("TXN_2"));
        assert_eq!(fast.try_recv().unwrap().transaction_id, "TXN_2");
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(slow.try_recv().unwrap().transaction_id, "TXN_2");
    }

    #[test]
    fn failing_webhook_does_not_affect_live_subscribers() {
        let config = NotifyConfig {
            webhooks: vec!["http://127.0.0.1:9/hook".to_string()],
            timeout_secs: 1,
            ..NotifyConfig::default()
        };
        let n = Notifier::new(&config);
        let mut rx = n.subscribe();
        assert_eq!(n.publish(&event("TXN_3")), 1);
        assert_eq!(rx.try_recv().unwrap().transaction_id, "TXN_3");

        let client = n.client.as_ref().unwrap();
        assert!(matches!(
            n.post(client, "http://127.0.0.1:9/hook", &event("TXN_3")),
            Err(NotifyError::Http(_))
        ));
    }
}
