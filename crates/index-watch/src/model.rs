//! Domain Models
//!
//! Core data types for index drawdown tracking.
//! Prices, drawdowns and thresholds are `Decimal` so that a close of exactly
//! 95 against an ATH of 100 is exactly a 5% drawdown.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

/// One daily close
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Decimal,
}

impl PricePoint {
    pub const fn new(date: NaiveDate, close: Decimal) -> Self {
        Self { date, close }
    }
}

/// Validated closing-price history for one symbol, oldest first.
///
/// Non-empty, strictly ascending dates, every close > 0.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl IndexSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<Self> {
        let symbol = symbol.into();

        if points.is_empty() {
            return Err(WatchError::InsufficientData(format!(
                "no price points for {symbol}"
            )));
        }

        if let Some(bad) = points.iter().find(|p| p.close <= Decimal::ZERO) {
            return Err(WatchError::DataIntegrity(format!(
                "{symbol}: non-positive close {} on {}",
                bad.close, bad.date
            )));
        }

        if let Some(pair) = points.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(WatchError::DataIntegrity(format!(
                "{symbol}: dates not strictly ascending ({} then {})",
                pair[0].date, pair[1].date
            )));
        }

        Ok(Self { symbol, points })
    }

    /// Build a series of consecutive calendar days starting at `start`.
    pub fn from_closes(
        symbol: impl Into<String>,
        start: NaiveDate,
        closes: &[Decimal],
    ) -> Result<Self> {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, close)| PricePoint::new(start + Duration::days(i as i64), *close))
            .collect();
        Self::new(symbol, points)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.points.iter().map(|p| p.close)
    }

    /// Most recent close
    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Current drawdown from the all-time high of a series
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawdownSnapshot {
    pub symbol: String,

    /// Latest close
    pub current_price: Decimal,

    /// Date of the latest close
    pub as_of: NaiveDate,

    /// Highest close over the supplied window
    pub ath: Decimal,

    /// Date the ATH was set (first occurrence)
    pub ath_date: NaiveDate,

    /// (ATH - current) / ATH * 100, in [0, 100)
    pub drawdown_pct: Decimal,

    pub computed_at: DateTime<Utc>,
}

/// How far the index fell after its last ATH and what it takes to recover
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMetrics {
    pub lowest_since_ath: Decimal,
    pub drawdown_at_lowest_pct: Decimal,
    pub gain_from_lowest_pct: Decimal,
    pub gain_to_ath_from_current_pct: Decimal,
    pub gain_to_ath_from_lowest_pct: Decimal,
}

/// Historical share of trading days at or beyond one threshold
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyStat {
    pub threshold: Decimal,
    pub days: usize,
    pub total_days: usize,
}

impl FrequencyStat {
    /// `days / total_days`, 0 for an empty window
    pub fn frequency(&self) -> f64 {
        if self.total_days == 0 {
            0.0
        } else {
            self.days as f64 / self.total_days as f64
        }
    }

    pub fn percent_of_history(&self) -> f64 {
        self.frequency() * 100.0
    }
}

/// Everything the engine derives from one series
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexAnalysis {
    pub snapshot: DrawdownSnapshot,
    pub recovery: RecoveryMetrics,
    pub frequency: BTreeMap<Decimal, FrequencyStat>,
    pub total_days: usize,
}

/// Ascending set of distinct drawdown thresholds, in percent.
///
/// Built once from configuration and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Decimal>", into = "Vec<Decimal>")]
pub struct ThresholdSet(Vec<Decimal>);

impl ThresholdSet {
    pub fn new(values: impl IntoIterator<Item = Decimal>) -> Result<Self> {
        let mut values: Vec<Decimal> = values.into_iter().map(|v| v.normalize()).collect();

        if values.is_empty() {
            return Err(WatchError::Config("threshold set is empty".into()));
        }

        if let Some(bad) = values
            .iter()
            .find(|v| **v <= Decimal::ZERO || **v >= Decimal::ONE_HUNDRED)
        {
            return Err(WatchError::Config(format!(
                "threshold {bad}% must be between 0 and 100 (exclusive)"
            )));
        }

        values.sort();
        values.dedup();
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[Decimal] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest threshold the drawdown meets or exceeds
    pub fn level_for(&self, drawdown_pct: Decimal) -> Option<Decimal> {
        self.0.iter().rev().find(|t| drawdown_pct >= **t).copied()
    }

    /// Thresholds in `(above, up_to]`, ascending; `None` is below every threshold
    pub fn between(
        &self,
        above: Option<Decimal>,
        up_to: Option<Decimal>,
    ) -> impl Iterator<Item = Decimal> + '_ {
        self.0
            .iter()
            .copied()
            .filter(move |t| Some(*t) > above && Some(*t) <= up_to)
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self([5, 10, 15, 20].into_iter().map(Decimal::from).collect())
    }
}

impl TryFrom<Vec<Decimal>> for ThresholdSet {
    type Error = WatchError;

    fn try_from(values: Vec<Decimal>) -> Result<Self> {
        Self::new(values)
    }
}

impl From<ThresholdSet> for Vec<Decimal> {
    fn from(set: ThresholdSet) -> Self {
        set.0
    }
}

impl fmt::Display for ThresholdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|t| format!("{t}%")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Last alert level notified for one symbol
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertState {
    /// Highest threshold already notified and not yet recovered from
    pub active_level: Option<Decimal>,

    pub updated_at: DateTime<Utc>,
}

impl AlertState {
    pub const fn new(active_level: Option<Decimal>, updated_at: DateTime<Utc>) -> Self {
        Self {
            active_level,
            updated_at,
        }
    }
}

impl Default for AlertState {
    fn default() -> Self {
        Self::new(None, DateTime::UNIX_EPOCH)
    }
}

/// A threshold newly reached since the previous check
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdCrossing {
    pub symbol: String,
    pub threshold: Decimal,
    pub drawdown_pct: Decimal,
    pub at: DateTime<Utc>,
}

/// Market sentiment reading (0 = extreme fear, 100 = extreme greed)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub value: f64,
    pub label: String,
    pub last_update: String,
}

/// A chat that opted in to reports and alerts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: String,
    pub username: Option<String>,
    pub subscribed_at: DateTime<Utc>,
    pub active: bool,
    pub last_daily_sent: Option<DateTime<Utc>>,
    pub last_alert_sent: Option<DateTime<Utc>>,
}

impl Subscriber {
    pub fn new(chat_id: impl Into<String>, username: Option<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            username,
            subscribed_at: Utc::now(),
            active: true,
            last_daily_sent: None,
            last_alert_sent: None,
        }
    }
}
