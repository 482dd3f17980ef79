//! Mock Ports
//!
//! Static providers and a recording notifier for tests and offline demos.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{IncomingMessage, Notifier, PriceSeriesProvider, SentimentProvider, UpdateSource};
use crate::error::{Result, WatchError};
use crate::model::{IndexSeries, Sentiment};

/// Serves fixed series by symbol
#[derive(Default)]
pub struct StaticPriceProvider {
    series: HashMap<String, IndexSeries>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_series(mut self, series: IndexSeries) -> Self {
        self.series.insert(series.symbol().to_string(), series);
        self
    }

    /// Sleep before answering (for timeout tests)
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `fetch` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSeriesProvider for StaticPriceProvider {
    async fn fetch(&self, symbol: &str, _lookback_years: u32) -> Result<IndexSeries> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.series
            .get(symbol)
            .cloned()
            .ok_or_else(|| WatchError::provider(self.name(), format!("unknown symbol {symbol}")))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Returns a fixed reading, or fails when built with `None`
pub struct StaticSentimentProvider {
    reading: Option<Sentiment>,
}

impl StaticSentimentProvider {
    pub const fn new(reading: Option<Sentiment>) -> Self {
        Self { reading }
    }
}

#[async_trait]
impl SentimentProvider for StaticSentimentProvider {
    async fn fetch_current(&self) -> Result<Sentiment> {
        self.reading
            .clone()
            .ok_or_else(|| WatchError::provider(self.name(), "no reading"))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Keeps every delivered message; selected recipients always fail
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    failing: HashSet<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_for(mut self, recipient: impl Into<String>) -> Self {
        self.failing.insert(recipient.into());
        self
    }

    /// (recipient, text) pairs in delivery order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        if self.failing.contains(recipient) {
            return Err(WatchError::delivery(recipient, "chat not found"));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }
}

/// Hands out queued batches of messages, then empty polls
#[derive(Default)]
pub struct ScriptedUpdates {
    batches: Mutex<VecDeque<Vec<IncomingMessage>>>,
}

impl ScriptedUpdates {
    pub fn new(batches: impl IntoIterator<Item = Vec<IncomingMessage>>) -> Self {
        Self {
            batches: Mutex::new(batches.into_iter().collect()),
        }
    }
}

#[async_trait]
impl UpdateSource for ScriptedUpdates {
    async fn poll(&self, offset: i64) -> Result<Vec<IncomingMessage>> {
        let batch = self
            .batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_default();
        Ok(batch.into_iter().filter(|m| m.update_id >= offset).collect())
    }

    async fn pending(&self) -> Result<Vec<IncomingMessage>> {
        self.poll(0).await
    }
}
