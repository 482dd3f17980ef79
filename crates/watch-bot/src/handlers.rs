//! HTTP Handlers

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use index_watch::WatchError;
use index_watch::ports::CacheStats;

use crate::jobs::{self, JobOutcome};
use crate::scheduler::{HealthStats, Job};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub delivery_configured: bool,
    pub uptime_secs: i64,
}

#[derive(Debug, Serialize)]
pub struct IndexStatus {
    pub symbol: String,
    pub name: String,
    pub active_level: Option<Decimal>,
    pub level_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SubscriberSummary {
    pub total: usize,
    pub active: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub environment: &'static str,
    pub indices: Vec<IndexStatus>,
    pub thresholds: Vec<Decimal>,
    pub daily_cron: String,
    pub alert_check_minutes: u64,
    pub history_years: u32,
    pub subscribers: SubscriberSummary,
    pub scheduler: HealthStats,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn persistence_error(err: &WatchError) -> HandlerError {
    tracing::error!(error = %err, "Status lookup failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.user_message(),
            code: "PERSISTENCE".into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_secs = state.health.lock().await.uptime_secs(Utc::now());

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        delivery_configured: state.config.bot_token.is_some(),
        uptime_secs,
    })
}

/// Configuration, alert levels, subscribers and scheduler state
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, HandlerError> {
    let levels = state
        .tracker
        .active_levels()
        .await
        .map_err(|e| persistence_error(&e))?;
    let counts = state
        .subscribers
        .counts()
        .await
        .map_err(|e| persistence_error(&e))?;

    let config = &state.config;
    let indices = config
        .indices
        .iter()
        .map(|index| {
            let level = levels.get(&index.symbol);
            IndexStatus {
                symbol: index.symbol.clone(),
                name: index.name.clone(),
                active_level: level.and_then(|l| l.active_level),
                level_updated_at: level.map(|l| l.updated_at),
            }
        })
        .collect();

    Ok(Json(StatusResponse {
        environment: config.environment.as_str(),
        indices,
        thresholds: config.thresholds.as_slice().to_vec(),
        daily_cron: config.daily_cron.to_string(),
        alert_check_minutes: config.alert_check_minutes(),
        history_years: config.history_years,
        subscribers: SubscriberSummary {
            total: counts.total,
            active: counts.active,
        },
        scheduler: state.health.lock().await.clone(),
        cache: state.prices.stats().await,
    }))
}

/// Run the daily report now and deliver it
pub async fn trigger_report(State(state): State<AppState>) -> Json<JobOutcome> {
    tracing::info!("Daily report triggered over HTTP");
    let outcome = jobs::run_daily_report(&state).await;
    state
        .health
        .lock()
        .await
        .record(Job::DailyReport, &outcome, Utc::now());
    Json(outcome)
}
