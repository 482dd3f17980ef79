//! External Ports
//!
//! Traits for everything the service talks to: price history, sentiment,
//! message delivery and the incoming command feed. HTTP implementations
//! live in `watch-feeds`; static and recording ones for tests live in
//! [`mock`].

mod cache;
pub mod mock;

pub use cache::{CacheStats, CachedPriceProvider};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};
use crate::model::{IndexSeries, Sentiment};

/// Daily closing-price history source (Strategy pattern)
#[async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    /// Closes for `symbol` covering roughly the last `lookback_years`
    async fn fetch(&self, symbol: &str, lookback_years: u32) -> Result<IndexSeries>;

    /// Provider name for logs and error messages
    fn name(&self) -> &str;
}

/// Market sentiment source. Failures are never fatal to a report.
#[async_trait]
pub trait SentimentProvider: Send + Sync {
    async fn fetch_current(&self) -> Result<Sentiment>;

    fn name(&self) -> &str;
}

/// Outcome of sending one message to many recipients
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,

    /// (recipient, reason)
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Message delivery channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver HTML-formatted `text` to one recipient
    async fn send(&self, recipient: &str, text: &str) -> Result<()>;

    /// Deliver to every recipient, continuing past individual failures
    async fn broadcast(&self, recipients: &[String], text: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for recipient in recipients {
            match self.send(recipient, text).await {
                Ok(()) => report.delivered.push(recipient.clone()),
                Err(e) => {
                    tracing::warn!(recipient = %recipient, error = %e, "Delivery failed");
                    report.failed.push((recipient.clone(), e.to_string()));
                }
            }
        }
        report
    }
}

/// A text message received from a chat
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub update_id: i64,
    pub chat_id: String,
    pub username: Option<String>,
    pub text: String,
}

/// Feed of incoming chat messages
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Messages with `update_id >= offset`; may block while long polling
    async fn poll(&self, offset: i64) -> Result<Vec<IncomingMessage>>;

    /// Whatever is already queued, without waiting. Confirming the highest
    /// returned id with the next `poll` discards the whole backlog.
    async fn pending(&self) -> Result<Vec<IncomingMessage>>;
}

/// Fetch a series, turning an elapsed `timeout` into `ProviderUnavailable`
pub async fn fetch_with_timeout(
    provider: &dyn PriceSeriesProvider,
    symbol: &str,
    lookback_years: u32,
    timeout: Duration,
) -> Result<IndexSeries> {
    tokio::time::timeout(timeout, provider.fetch(symbol, lookback_years))
        .await
        .unwrap_or_else(|_| {
            Err(WatchError::provider(
                provider.name(),
                format!("timed out after {}s fetching {symbol}", timeout.as_secs()),
            ))
        })
}

/// Notifier that only logs, used when no bot token is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        tracing::info!(recipient, chars = text.chars().count(), "Message (not delivered, no transport)");
        tracing::debug!(recipient, text, "Message body");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{RecordingNotifier, StaticPriceProvider};
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_broadcast_continues_past_failures() {
        let notifier = RecordingNotifier::new().failing_for("2");
        let recipients = vec!["1".to_string(), "2".to_string(), "3".to_string()];

        let report = notifier.broadcast(&recipients, "hello").await;

        assert_eq!(report.delivered, vec!["1".to_string(), "3".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "2");
        assert_eq!(report.attempted(), 3);
        assert!(!report.all_delivered());
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_provider_error() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = IndexSeries::from_closes("^GSPC", start, &[dec!(100)]).unwrap();
        let provider = StaticPriceProvider::new()
            .with_series(series)
            .with_delay(Duration::from_millis(200));

        let err = fetch_with_timeout(&provider, "^GSPC", 20, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::ProviderUnavailable { .. }));
        assert!(err.is_retryable());

        let ok = fetch_with_timeout(&provider, "^GSPC", 20, Duration::from_secs(5)).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_everything() {
        let report = LogNotifier.broadcast(&["a".to_string()], "<b>hi</b>").await;
        assert!(report.all_delivered());
    }
}
