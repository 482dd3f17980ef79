//! CNN Fear & Greed Sentiment Provider

use std::time::Duration;

use async_trait::async_trait;
use index_watch::{Sentiment, SentimentProvider};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{FeedError, Result, checked_text};

pub const DEFAULT_BASE_URL: &str = "https://production.dataviz.cnn.io";

const SOURCE: &str = "cnn";
const GRAPH_PATH: &str = "/index/fearandgreed/graphdata";

#[derive(Debug, Deserialize)]
struct GraphData {
    fear_and_greed: Option<Reading>,
}

#[derive(Debug, Deserialize)]
struct Reading {
    score: f64,
    rating: String,
    timestamp: String,
}

pub struct FearGreedProvider {
    client: Client,
    base_url: String,
}

impl FearGreedProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_reading(&self) -> Result<Sentiment> {
        let response = self
            .client
            .get(format!("{}{GRAPH_PATH}", self.base_url))
            .send()
            .await?;
        let body = checked_text(response).await?;
        let data: GraphData = serde_json::from_str(&body)?;

        let reading = data
            .fear_and_greed
            .ok_or_else(|| FeedError::Parse("missing fear_and_greed section".into()))?;

        if !(0.0..=100.0).contains(&reading.score) {
            return Err(FeedError::Parse(format!("score {} out of range", reading.score)));
        }

        Ok(Sentiment {
            value: reading.score,
            label: reading.rating,
            last_update: reading.timestamp,
        })
    }
}

#[async_trait]
impl SentimentProvider for FearGreedProvider {
    async fn fetch_current(&self) -> index_watch::Result<Sentiment> {
        self.fetch_reading().await.map_err(|e| {
            tracing::warn!(error = %e, "Fear & Greed fetch failed");
            e.into_provider(SOURCE)
        })
    }

    fn name(&self) -> &str {
        SOURCE
    }
}
