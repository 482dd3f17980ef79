//! Application State

use std::sync::Arc;

use index_watch::{
    AlertTracker, CachedPriceProvider, Notifier, ReportComposer, SentimentProvider, SubscriberStore,
    WatchConfig,
};

use crate::scheduler::SharedHealthStats;

/// Shared application state, cloned into every task and handler
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup
    pub config: Arc<WatchConfig>,

    /// Price history behind the TTL cache
    pub prices: Arc<CachedPriceProvider>,

    /// Fear & Greed source (never fatal)
    pub sentiment: Arc<dyn SentimentProvider>,

    /// Persisted per-symbol alert levels
    pub tracker: Arc<AlertTracker>,

    pub subscribers: Arc<dyn SubscriberStore>,

    /// Telegram, or a log-only notifier when no token is set
    pub notifier: Arc<dyn Notifier>,

    pub composer: ReportComposer,

    /// Scheduler bookkeeping for `/debug` and `/api/status`
    pub health: SharedHealthStats,
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use index_watch::ports::mock::{RecordingNotifier, StaticPriceProvider, StaticSentimentProvider};
    use index_watch::store::{MemoryAlertStore, MemorySubscriberStore};
    use index_watch::{
        AlertTracker, CachedPriceProvider, IndexSeries, ReportComposer, Sentiment, WatchConfig,
    };
    use rust_decimal_macros::dec;

    use super::AppState;
    use crate::scheduler;

    /// State wired to in-memory fakes, plus handles to inspect them
    pub struct Harness {
        pub state: AppState,
        pub prices: Arc<StaticPriceProvider>,
        pub notifier: Arc<RecordingNotifier>,
    }

    /// S&P 500 falling 17% from its high; NASDAQ-100 has no data
    pub fn sp500_series() -> IndexSeries {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        IndexSeries::from_closes("^GSPC", start, &[dec!(100), dec!(97), dec!(94), dec!(91), dec!(83)])
            .unwrap()
    }

    pub fn harness(vars: &[(&str, &str)], notifier: RecordingNotifier) -> Harness {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let config = Arc::new(WatchConfig::from_map(&vars).unwrap());

        let prices = Arc::new(StaticPriceProvider::new().with_series(sp500_series()));
        let notifier = Arc::new(notifier);
        let sentiment = StaticSentimentProvider::new(Some(Sentiment {
            value: 18.3,
            label: "extreme fear".into(),
            last_update: "2025-01-05T23:59:57+00:00".into(),
        }));

        let state = AppState {
            prices: Arc::new(CachedPriceProvider::new(prices.clone(), Duration::from_secs(60))),
            sentiment: Arc::new(sentiment),
            tracker: Arc::new(AlertTracker::new(
                config.thresholds.clone(),
                Arc::new(MemoryAlertStore::new()),
            )),
            subscribers: Arc::new(MemorySubscriberStore::new()),
            notifier: notifier.clone(),
            composer: ReportComposer::from_config(&config),
            health: scheduler::shared_health(),
            config,
        };

        Harness {
            state,
            prices,
            notifier,
        }
    }
}
