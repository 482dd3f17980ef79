//! Stateful alert tracker
//!
//! Wraps [`evaluate`] with persistence and per-symbol serialization so a slow
//! daily report and an alert check never race on the same state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::evaluate::{Evaluation, evaluate};
use crate::error::Result;
use crate::model::{AlertState, DrawdownSnapshot, ThresholdCrossing, ThresholdSet};
use crate::store::AlertStateStore;

pub struct AlertTracker {
    thresholds: ThresholdSet,
    store: Arc<dyn AlertStateStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AlertTracker {
    pub fn new(thresholds: ThresholdSet, store: Arc<dyn AlertStateStore>) -> Self {
        Self {
            thresholds,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub const fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    /// Load, evaluate and persist the state for the snapshot's symbol.
    ///
    /// Events are only returned once the new state is stored; a read or
    /// write failure yields `Persistence` and no events for this cycle.
    pub async fn check(&self, snapshot: &DrawdownSnapshot) -> Result<Vec<ThresholdCrossing>> {
        let lock = self.symbol_lock(&snapshot.symbol).await;
        let _guard = lock.lock().await;

        let stored = self.store.get(&snapshot.symbol).await?;
        let prior = stored.clone().unwrap_or_default();

        let Evaluation { events, state } = evaluate(snapshot, &self.thresholds, &prior);

        if stored.is_none() || state.active_level != prior.active_level {
            self.store.set(&snapshot.symbol, &state).await?;
            tracing::info!(
                symbol = %snapshot.symbol,
                prior = ?prior.active_level,
                current = ?state.active_level,
                events = events.len(),
                "Alert level changed"
            );
        } else {
            tracing::debug!(
                symbol = %snapshot.symbol,
                level = ?state.active_level,
                drawdown_pct = %snapshot.drawdown_pct.round_dp(2),
                "Alert level unchanged"
            );
        }

        Ok(events)
    }

    /// Every persisted state, for status displays
    pub async fn active_levels(&self) -> Result<HashMap<String, AlertState>> {
        self.store.all().await
    }

    async fn symbol_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(symbol.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;
    use crate::store::MemoryAlertStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn snapshot(symbol: &str, drawdown_pct: Decimal) -> DrawdownSnapshot {
        let date = NaiveDate::from_ymd_opt(2025, 4, 7).unwrap();
        DrawdownSnapshot {
            symbol: symbol.into(),
            current_price: Decimal::ONE_HUNDRED - drawdown_pct,
            as_of: date,
            ath: Decimal::ONE_HUNDRED,
            ath_date: date,
            drawdown_pct,
            computed_at: Utc::now(),
        }
    }

    fn tracker(store: Arc<dyn AlertStateStore>) -> AlertTracker {
        AlertTracker::new(ThresholdSet::default(), store)
    }

    /// Store whose reads or writes always fail
    struct BrokenStore {
        fail_reads: bool,
    }

    #[async_trait]
    impl AlertStateStore for BrokenStore {
        async fn get(&self, _symbol: &str) -> Result<Option<AlertState>> {
            if self.fail_reads {
                Err(WatchError::Persistence("disk on fire".into()))
            } else {
                Ok(None)
            }
        }

        async fn set(&self, _symbol: &str, _state: &AlertState) -> Result<()> {
            Err(WatchError::Persistence("read-only".into()))
        }

        async fn all(&self) -> Result<HashMap<String, AlertState>> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn test_persists_and_deduplicates() {
        let store = Arc::new(MemoryAlertStore::new());
        let tracker = tracker(store.clone());

        let events = tracker.check(&snapshot("^GSPC", dec!(12))).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            store.get("^GSPC").await.unwrap().unwrap().active_level,
            Some(dec!(10))
        );

        let again = tracker.check(&snapshot("^GSPC", dec!(12.5))).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_symbols_are_independent() {
        let tracker = tracker(Arc::new(MemoryAlertStore::new()));

        tracker.check(&snapshot("^GSPC", dec!(6))).await.unwrap();
        let ndx = tracker.check(&snapshot("^NDX", dec!(6))).await.unwrap();

        assert_eq!(ndx.len(), 1);
        assert_eq!(tracker.active_levels().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_read_failure_suppresses_events() {
        let tracker = tracker(Arc::new(BrokenStore { fail_reads: true }));
        let err = tracker.check(&snapshot("^GSPC", dec!(30))).await.unwrap_err();
        assert!(matches!(err, WatchError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_write_failure_suppresses_events() {
        let tracker = tracker(Arc::new(BrokenStore { fail_reads: false }));
        let err = tracker.check(&snapshot("^GSPC", dec!(30))).await.unwrap_err();
        assert!(matches!(err, WatchError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_concurrent_checks_alert_once() {
        let tracker = Arc::new(tracker(Arc::new(MemoryAlertStore::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.check(&snapshot("^NDX", dec!(21))).await })
            })
            .collect();

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap().unwrap().len();
        }
        assert_eq!(total, 4);
    }
}
