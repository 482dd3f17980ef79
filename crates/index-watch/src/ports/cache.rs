//! TTL cache in front of a price provider
//!
//! The daily report and the alert check usually ask for the same symbols
//! within minutes of each other; one fetch serves both.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use super::PriceSeriesProvider;
use crate::error::Result;
use crate::model::IndexSeries;

struct Entry {
    series: IndexSeries,
    fetched_at: Instant,
}

/// Cache counters for status displays
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate_pct(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

pub struct CachedPriceProvider {
    inner: Arc<dyn PriceSeriesProvider>,
    ttl: Duration,
    entries: RwLock<HashMap<(String, u32), Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedPriceProvider {
    pub fn new(inner: Arc<dyn PriceSeriesProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        tracing::info!(removed = entries.len(), "Price cache cleared");
        entries.clear();
    }

    async fn fresh(&self, key: &(String, u32)) -> Option<IndexSeries> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.fetched_at.elapsed() <= self.ttl)
            .map(|e| e.series.clone())
    }
}

#[async_trait]
impl PriceSeriesProvider for CachedPriceProvider {
    async fn fetch(&self, symbol: &str, lookback_years: u32) -> Result<IndexSeries> {
        let key = (symbol.to_string(), lookback_years);

        if let Some(series) = self.fresh(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(symbol, "Price cache hit");
            return Ok(series);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(symbol, provider = self.inner.name(), "Price cache miss");

        // failures are not cached; the next cycle asks the provider again
        let series = self.inner.fetch(symbol, lookback_years).await?;
        self.entries.write().await.insert(
            key,
            Entry {
                series: series.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(series)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
