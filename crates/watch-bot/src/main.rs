//! index-watch Bot Server
//!
//! Runs the daily report and alert check schedules, answers Telegram
//! commands and serves a small HTTP status API.

mod bot;
mod commands;
mod handlers;
mod jobs;
mod scheduler;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use index_watch::ports::LogNotifier;
use index_watch::store::{JsonFileAlertStore, JsonFileSubscriberStore};
use index_watch::{
    AlertTracker, CachedPriceProvider, Notifier, ReportComposer, SubscriberStore, WatchConfig,
};
use watch_feeds::{FearGreedProvider, TelegramClient, YahooPriceProvider};

use crate::bot::CommandLoop;
use crate::handlers::{health_check, status, trigger_report};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(WatchConfig::from_env().context("invalid configuration")?);
    config.log_summary();

    // Persistence
    let alert_store = Arc::new(
        JsonFileAlertStore::open(config.alert_state_path())
            .await
            .context("failed to open alert state")?,
    );
    let subscribers: Arc<dyn SubscriberStore> = Arc::new(
        JsonFileSubscriberStore::open(config.subscribers_path())
            .await
            .context("failed to open subscriber store")?,
    );
    if subscribers.counts().await?.total == 0 && !config.chat_ids.is_empty() {
        subscribers.migrate_chat_ids(&config.chat_ids).await?;
    }

    // Market data
    let yahoo = Arc::new(YahooPriceProvider::new(config.fetch_timeout)?);
    let prices = Arc::new(CachedPriceProvider::new(yahoo, config.cache_ttl));
    let sentiment = Arc::new(FearGreedProvider::new(config.fetch_timeout)?);

    // Delivery
    let telegram = match config.bot_token.clone() {
        Some(token) => Some(Arc::new(TelegramClient::new(token)?)),
        None => None,
    };
    let notifier: Arc<dyn Notifier> = if let Some(client) = &telegram {
        tracing::info!("✓ Telegram delivery configured");
        client.clone()
    } else {
        tracing::warn!("⚠ No bot token - messages will only be logged");
        tracing::warn!("  Set BOT_TOKEN (or BOT_TOKEN_DEV with ENV=dev) in .env");
        Arc::new(LogNotifier)
    };

    // Build application state
    let state = AppState {
        tracker: Arc::new(AlertTracker::new(config.thresholds.clone(), alert_store)),
        composer: ReportComposer::from_config(&config),
        health: scheduler::shared_health(),
        config: config.clone(),
        prices,
        sentiment,
        subscribers,
        notifier: notifier.clone(),
    };

    // Initialize commands
    let registry = Arc::new(commands::build_registry(&state));
    tracing::info!("Registered {} commands:", registry.len());
    for name in registry.names() {
        tracing::info!("  • /{}", name);
    }

    // Background tasks
    let mut tasks = vec![
        tokio::spawn(scheduler::run_daily_loop(state.clone())),
        tokio::spawn(scheduler::run_alert_loop(state.clone())),
    ];
    if let Some(client) = telegram {
        tasks.push(tokio::spawn(CommandLoop::new(client, registry, notifier).run()));
    }

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(status))
        .route("/api/report", post(trigger_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 index-watch running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health     - Health check");
    tracing::info!("  GET  /api/status - Alert levels, subscribers, scheduler");
    tracing::info!("  POST /api/report - Send the daily report now");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in tasks {
        task.abort();
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
