//! # index-watch
//!
//! Drawdown monitoring for broad market indices: how far each index sits
//! below its all-time high, how often history has been this deep, and a
//! one-shot alert each time a configured threshold is newly crossed.
//!
//! ## Alert Flow
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │ PriceSeries  │──▶│   Drawdown   │──▶│ AlertTracker │──▶│  Notifier  │
//! │  Provider    │   │    Engine    │   │ (persisted)  │   │ (Telegram) │
//! └──────────────┘   └──────────────┘   └──────────────┘   └────────────┘
//!        │                  │
//!        ▼                  ▼
//!   TTL cache        ReportComposer ──▶ daily report
//! ```
//!
//! With thresholds 5/10/15/20 an index sliding from 3% to 17% between two
//! checks alerts 5, 10 and 15 once each. Nothing repeats until the index
//! recovers above a threshold and falls through it again.

pub mod alerts;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod ports;
pub mod rate_limit;
pub mod report;
pub mod schedule;
pub mod store;

pub use alerts::AlertTracker;
pub use commands::{BotCommand, Command, CommandContext, CommandRegistry, CommandSpec};
pub use config::{IndexSpec, WatchConfig};
pub use engine::analyze;
pub use error::{Result, WatchError};
pub use model::{
    AlertState, DrawdownSnapshot, FrequencyStat, IndexAnalysis, IndexSeries, PricePoint,
    RecoveryMetrics, Sentiment, Subscriber, ThresholdCrossing, ThresholdSet,
};
pub use ports::{
    CachedPriceProvider, IncomingMessage, Notifier, PriceSeriesProvider, SentimentProvider,
    UpdateSource,
};
pub use report::{IndexSection, ReportComposer};
pub use schedule::CronSchedule;
pub use store::{AlertStateStore, SubscriberStore};
