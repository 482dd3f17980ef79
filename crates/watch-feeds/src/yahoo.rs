//! Yahoo Finance Price Provider
//!
//! Daily closes from the public chart API:
//! `GET /v8/finance/chart/{symbol}?period1&period2&interval=1d`.
//! Adjusted closes are preferred when present; null closes are skipped and
//! duplicate dates keep the last value.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use index_watch::{IndexSeries, PricePoint, PriceSeriesProvider};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{FeedError, Result, checked_text};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

const SOURCE: &str = "yahoo";

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Price provider backed by Yahoo Finance
pub struct YahooPriceProvider {
    client: Client,
    base_url: String,
}

impl YahooPriceProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    /// Point at another host (tests, proxies)
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_chart(&self, symbol: &str, lookback_years: u32) -> Result<IndexSeries> {
        let end = Utc::now();
        let start = TimeDelta::try_days(i64::from(lookback_years) * 365)
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                FeedError::Request(format!("lookback of {lookback_years} years is out of range"))
            })?;
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol.replace('^', "%5E"));

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", "1d".to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ])
            .send()
            .await?;

        let body = checked_text(response).await?;
        let envelope: ChartEnvelope = serde_json::from_str(&body)?;
        parse_chart(symbol, envelope)
    }
}

fn parse_chart(symbol: &str, envelope: ChartEnvelope) -> Result<IndexSeries> {
    if let Some(err) = envelope.chart.error {
        return Err(FeedError::Api(format!("{}: {}", err.code, err.description)));
    }

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| FeedError::Parse(format!("no chart result for {symbol}")))?;

    let adjusted = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .filter(|a| a.len() == result.timestamp.len());
    let closes = match adjusted {
        Some(closes) => closes,
        None => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .ok_or_else(|| FeedError::Parse(format!("no close prices for {symbol}")))?,
    };

    if closes.len() != result.timestamp.len() {
        return Err(FeedError::Parse(format!(
            "{symbol}: {} timestamps but {} closes",
            result.timestamp.len(),
            closes.len()
        )));
    }

    // BTreeMap sorts by date and keeps the last close for a repeated date
    let mut by_date: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    let mut skipped = 0usize;
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let date = DateTime::from_timestamp(ts + result.meta.gmtoffset, 0).map(|d| d.date_naive());
        let price = close
            .filter(|c| c.is_finite() && *c > 0.0)
            .and_then(Decimal::from_f64_retain)
            .map(|d| d.round_dp(4));

        match (date, price) {
            (Some(date), Some(price)) => {
                by_date.insert(date, price);
            }
            _ => skipped += 1,
        }
    }

    tracing::debug!(
        symbol,
        points = by_date.len(),
        skipped,
        currency = result.meta.currency.as_deref().unwrap_or("?"),
        "Parsed Yahoo chart"
    );

    let points = by_date
        .into_iter()
        .map(|(date, close)| PricePoint::new(date, close))
        .collect();
    IndexSeries::new(symbol, points).map_err(|e| FeedError::Parse(e.to_string()))
}

#[async_trait]
impl PriceSeriesProvider for YahooPriceProvider {
    async fn fetch(&self, symbol: &str, lookback_years: u32) -> index_watch::Result<IndexSeries> {
        match self.fetch_chart(symbol, lookback_years).await {
            Ok(series) => {
                tracing::info!(symbol, points = series.len(), "Fetched price history");
                Ok(series)
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, timeout = e.is_timeout(), "Price fetch failed");
                Err(e.into_provider(SOURCE))
            }
        }
    }

    fn name(&self) -> &str {
        SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use index_watch::WatchError;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // 2024-01-02, 2024-01-03, 2024-01-04 and a repeat of 2024-01-04, 14:30 UTC
    const TIMESTAMPS: [i64; 4] = [1_704_205_800, 1_704_292_200, 1_704_378_600, 1_704_382_200];

    fn chart(close: serde_json::Value, adjclose: Option<serde_json::Value>) -> serde_json::Value {
        let mut indicators = json!({ "quote": [{ "close": close }] });
        if let Some(adj) = adjclose {
            indicators["adjclose"] = json!([{ "adjclose": adj }]);
        }
        json!({
            "chart": {
                "result": [{
                    "meta": { "symbol": "^GSPC", "currency": "USD", "gmtoffset": -18000 },
                    "timestamp": TIMESTAMPS,
                    "indicators": indicators
                }],
                "error": null
            }
        })
    }

    async fn provider_for(server: &MockServer) -> YahooPriceProvider {
        YahooPriceProvider::with_base_url(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_prefers_adjusted_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v8/finance/chart/.*GSPC$"))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(
                json!([4742.83, 4704.81, 4688.68, 4690.0]),
                Some(json!([4742.83, null, 4688.5, 4697.24])),
            )))
            .mount(&server)
            .await;

        let series = provider_for(&server).await.fetch("^GSPC", 20).await.unwrap();

        assert_eq!(series.symbol(), "^GSPC");
        let closes: Vec<Decimal> = series.closes().collect();
        // null skipped, the repeated 2024-01-04 keeps its last value
        assert_eq!(closes, vec![dec!(4742.83), dec!(4697.24)]);
        assert_eq!(series.latest().unwrap().date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chart(json!([100.0, 101.5, null, 99.25]), None)),
            )
            .mount(&server)
            .await;

        let series = provider_for(&server).await.fetch("^NDX", 5).await.unwrap();
        let closes: Vec<Decimal> = series.closes().collect();
        assert_eq!(closes, vec![dec!(100), dec!(101.5), dec!(99.25)]);
    }

    #[tokio::test]
    async fn test_api_error_is_provider_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "chart": {
                    "result": null,
                    "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
                }
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).await.fetch("^NOPE", 20).await.unwrap_err();
        match err {
            WatchError::ProviderUnavailable { source_name, reason } => {
                assert_eq!(source_name, "yahoo");
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_lookback_is_an_error() {
        let server = MockServer::start().await;

        let err = provider_for(&server).await.fetch("^GSPC", u32::MAX).await.unwrap_err();

        match err {
            WatchError::ProviderUnavailable { source_name, reason } => {
                assert_eq!(source_name, "yahoo");
                assert!(reason.contains("out of range"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[test]
    fn test_parse_chart_error_body() {
        let envelope: ChartEnvelope = serde_json::from_value(json!({
            "chart": { "result": null, "error": { "code": "Bad Request", "description": "Invalid input" } }
        }))
        .unwrap();
        let err = parse_chart("^GSPC", envelope).unwrap_err();
        assert!(matches!(err, FeedError::Api(msg) if msg.contains("Invalid input")));
    }

    #[test]
    fn test_parse_chart_all_null_is_error() {
        let envelope: ChartEnvelope =
            serde_json::from_value(chart(json!([null, null, null, null]), None)).unwrap();
        assert!(parse_chart("^GSPC", envelope).is_err());
    }
}
