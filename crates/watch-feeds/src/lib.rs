//! # watch-feeds
//!
//! HTTP implementations of the index-watch ports.
//!
//! ## Feeds
//!
//! - **Yahoo Finance** (`yahoo`, default): daily index closes
//! - **CNN Fear & Greed** (`cnn`, default): market sentiment
//! - **Telegram Bot API** (`telegram`, default): message delivery and commands
//!
//! ## Usage
//!
//! ```rust,ignore
//! use watch_feeds::YahooPriceProvider;
//!
//! let provider = YahooPriceProvider::new(Duration::from_secs(30))?;
//! let series = provider.fetch("^GSPC", 20).await?;
//! ```

pub mod error;

#[cfg(feature = "cnn")]
pub mod cnn;
#[cfg(feature = "telegram")]
pub mod telegram;
#[cfg(feature = "yahoo")]
pub mod yahoo;

#[cfg(feature = "cnn")]
pub use cnn::FearGreedProvider;
#[cfg(feature = "telegram")]
pub use telegram::TelegramClient;
#[cfg(feature = "yahoo")]
pub use yahoo::YahooPriceProvider;

pub use error::{FeedError, Result};

use std::time::Duration;

/// Browser-like agent; both Yahoo and CNN refuse the reqwest default
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Shared client setup for every feed
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(FeedError::from)
}
