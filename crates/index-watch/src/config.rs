//! Service Configuration
//!
//! Loaded once at startup from environment variables. Parsing goes through
//! a lookup closure so tests never touch the process environment.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use rust_decimal::Decimal;

use crate::error::{Result, WatchError};
use crate::model::ThresholdSet;
use crate::schedule::CronSchedule;

pub const DEFAULT_INDEX_SYMBOLS: &str = "^GSPC=S&P 500,^NDX=NASDAQ-100";
pub const DEFAULT_THRESHOLDS: &str = "5 10 15 20";
pub const DEFAULT_DAILY_CRON: &str = "0 22 * * 1-5";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Longest price history the adapters will request
pub const MAX_HISTORY_YEARS: u32 = 100;

/// Deployment environment; `dev` switches to the development bot token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Dev,
    #[default]
    Prd,
}

impl Environment {
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Self::Dev,
            _ => Self::Prd,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prd => "prd",
        }
    }
}

/// Bot token, never printed
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BotToken([REDACTED])")
    }
}

/// A watched index: ticker symbol and display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub symbol: String,
    pub name: String,
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub environment: Environment,

    /// `None` disables delivery and the command loop
    pub bot_token: Option<BotToken>,

    /// Fallback recipients when nobody has subscribed
    pub chat_ids: Vec<String>,

    pub indices: Vec<IndexSpec>,
    pub thresholds: ThresholdSet,
    pub daily_cron: CronSchedule,
    pub alert_check_interval: Duration,
    pub history_years: u32,
    pub fetch_timeout: Duration,
    pub cache_ttl: Duration,
    pub data_dir: PathBuf,
    pub display_offset: FixedOffset,
    pub bind_addr: String,
}

impl WatchConfig {
    /// Read from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from a map, for tests and tooling
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = get("ENV")
            .map(|v| Environment::from_str_case_insensitive(&v))
            .unwrap_or_default();

        let token_key = match environment {
            Environment::Dev => "BOT_TOKEN_DEV",
            Environment::Prd => "BOT_TOKEN",
        };
        let bot_token = get(token_key).map(BotToken::new);

        let chat_ids = get("TELEGRAM_CHAT_IDS")
            .map(|v| parse_list(&v, &[',']))
            .unwrap_or_default();

        let indices = parse_indices(&get("INDEX_SYMBOLS").unwrap_or_else(|| DEFAULT_INDEX_SYMBOLS.into()))?;
        let thresholds = parse_thresholds(&get("DRAWDOWN_THRESHOLDS_PCT").unwrap_or_else(|| DEFAULT_THRESHOLDS.into()))?;
        let daily_cron = CronSchedule::parse(&get("DAILY_REPORT_CRON").unwrap_or_else(|| DEFAULT_DAILY_CRON.into()))?;

        let alert_minutes: u64 = parse_positive(get("ALERT_CHECK_MINUTES"), "ALERT_CHECK_MINUTES", 30)?;
        let history_years: u32 = parse_positive(get("HISTORY_YEARS"), "HISTORY_YEARS", 20)?;
        if history_years > MAX_HISTORY_YEARS {
            return Err(WatchError::Config(format!(
                "HISTORY_YEARS must be at most {MAX_HISTORY_YEARS}, got {history_years}"
            )));
        }
        let timeout_secs: u64 = parse_positive(get("FETCH_TIMEOUT_SECS"), "FETCH_TIMEOUT_SECS", 30)?;
        let cache_minutes: u64 = parse_number(get("CACHE_TTL_MINUTES"), "CACHE_TTL_MINUTES", 15)?;

        let offset_hours: i32 = parse_number(get("DISPLAY_UTC_OFFSET_HOURS"), "DISPLAY_UTC_OFFSET_HOURS", 8)?;
        if !(-12..=14).contains(&offset_hours) {
            return Err(WatchError::Config(format!(
                "DISPLAY_UTC_OFFSET_HOURS must be between -12 and 14, got {offset_hours}"
            )));
        }
        let alert_check_interval = minutes_to_duration(alert_minutes, "ALERT_CHECK_MINUTES")?;
        let cache_ttl = minutes_to_duration(cache_minutes, "CACHE_TTL_MINUTES")?;
        let display_offset = FixedOffset::east_opt(offset_hours * 3600)
            .ok_or_else(|| WatchError::Config(format!("invalid UTC offset {offset_hours}")))?;

        Ok(Self {
            environment,
            bot_token,
            chat_ids,
            indices,
            thresholds,
            daily_cron,
            alert_check_interval,
            history_years,
            fetch_timeout: Duration::from_secs(timeout_secs),
            cache_ttl,
            data_dir: get("DATA_DIR").map_or_else(|| PathBuf::from("data"), PathBuf::from),
            display_offset,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
        })
    }

    /// Display name for a symbol, falling back to the symbol itself
    pub fn index_name<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.indices
            .iter()
            .find(|i| i.symbol == symbol)
            .map_or(symbol, |i| i.name.as_str())
    }

    pub fn alert_check_minutes(&self) -> u64 {
        self.alert_check_interval.as_secs() / 60
    }

    pub fn alert_state_path(&self) -> PathBuf {
        self.data_dir.join("alert_state.json")
    }

    pub fn subscribers_path(&self) -> PathBuf {
        self.data_dir.join("subscribers.json")
    }

    /// Configuration summary for startup logs
    pub fn log_summary(&self) {
        tracing::info!(
            environment = self.environment.as_str(),
            indices = %self.indices.iter().map(|i| i.symbol.as_str()).collect::<Vec<_>>().join(","),
            thresholds = %self.thresholds,
            daily_cron = %self.daily_cron,
            alert_check_minutes = self.alert_check_minutes(),
            history_years = self.history_years,
            chat_ids = self.chat_ids.len(),
            delivery = self.bot_token.is_some(),
            "Configuration loaded"
        );
    }
}

fn parse_list(value: &str, separators: &[char]) -> Vec<String> {
    value
        .split(|c: char| separators.contains(&c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// `^GSPC=S&P 500,^NDX=NASDAQ-100`; a bare symbol is its own name
fn parse_indices(value: &str) -> Result<Vec<IndexSpec>> {
    let indices: Vec<IndexSpec> = parse_list(value, &[','])
        .iter()
        .map(|entry| {
            let (symbol, name) = entry.split_once('=').unwrap_or((entry.as_str(), entry.as_str()));
            let symbol = symbol.trim();
            let name = Some(name.trim()).filter(|n| !n.is_empty()).unwrap_or(symbol);
            IndexSpec {
                symbol: symbol.to_string(),
                name: name.to_string(),
            }
        })
        .filter(|i| !i.symbol.is_empty())
        .collect();

    if indices.is_empty() {
        return Err(WatchError::Config("INDEX_SYMBOLS names no index".into()));
    }
    Ok(indices)
}

/// `5 10 15 20`, `5,10,15`, `5% 10%`
fn parse_thresholds(value: &str) -> Result<ThresholdSet> {
    let values = parse_list(value, &[' ', ','])
        .iter()
        .map(|raw| {
            raw.trim_end_matches('%')
                .parse::<Decimal>()
                .map_err(|_| WatchError::Config(format!("invalid drawdown threshold '{raw}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    ThresholdSet::new(values)
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    value.map_or(Ok(default), |v| {
        v.parse()
            .map_err(|_| WatchError::Config(format!("{key} is not a valid number: '{v}'")))
    })
}

fn parse_positive<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed = parse_number(value, key, default)?;
    if parsed <= T::default() {
        return Err(WatchError::Config(format!("{key} must be positive")));
    }
    Ok(parsed)
}

fn minutes_to_duration(minutes: u64, key: &str) -> Result<Duration> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| WatchError::Config(format!("{key} is too large: {minutes}")))
}
