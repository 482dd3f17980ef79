//! Chat Commands
//!
//! Handlers for every bot command, registered into one
//! [`CommandRegistry`]. `/start` and `/help` are answered by the registry.

use std::time::Duration;

use async_trait::async_trait;

use index_watch::report::format::{escape_html, format_drawdown, format_timestamp};
use index_watch::{BotCommand, CommandContext, CommandRegistry, CommandSpec, Result};

use crate::jobs;
use crate::scheduler::Job;
use crate::state::AppState;

const REPORT_COOLDOWN: Duration = Duration::from_secs(300);
const SUBSCRIPTION_COOLDOWN: Duration = Duration::from_secs(60);
const QUERY_COOLDOWN: Duration = Duration::from_secs(10);
const DEBUG_COOLDOWN: Duration = Duration::from_secs(60);

/// Registry with every command wired to `state`
pub fn build_registry(state: &AppState) -> CommandRegistry {
    let mut registry = CommandRegistry::default();
    registry.register(DailyCommand(state.clone()));
    registry.register(AlertsCommand(state.clone()));
    registry.register(SubscribeCommand(state.clone()));
    registry.register(UnsubscribeCommand(state.clone()));
    registry.register(StatusCommand(state.clone()));
    registry.register(MyStatsCommand(state.clone()));
    registry.register(DebugCommand(state.clone()));
    registry
}

fn timestamp(state: &AppState, at: chrono::DateTime<chrono::Utc>) -> String {
    format_timestamp(at, state.config.display_offset)
}

// ============================================================================
// Reports
// ============================================================================

/// `/daily`: the full report, on demand
pub struct DailyCommand(AppState);

#[async_trait]
impl BotCommand for DailyCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("daily", "Get the drawdown report now").with_cooldown(REPORT_COOLDOWN)
    }

    async fn execute(&self, _ctx: &CommandContext) -> Result<String> {
        Ok(jobs::compose_daily_report(&self.0).await.text)
    }
}

/// `/alerts`: thresholds and schedule
pub struct AlertsCommand(AppState);

#[async_trait]
impl BotCommand for AlertsCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("alerts", "Show alert thresholds and schedule")
            .with_cooldown(QUERY_COOLDOWN)
    }

    async fn execute(&self, _ctx: &CommandContext) -> Result<String> {
        Ok(self.0.composer.config_summary(&self.0.config))
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

pub struct SubscribeCommand(AppState);

#[async_trait]
impl BotCommand for SubscribeCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("subscribe", "Receive daily reports and alerts")
            .with_cooldown(SUBSCRIPTION_COOLDOWN)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<String> {
        let config = &self.0.config;
        if !self.0.subscribers.add(&ctx.chat_id, ctx.username.clone()).await? {
            return Ok("ℹ️ You're already subscribed!\n\nUse /status to check your subscription.".into());
        }

        tracing::info!(chat_id = %ctx.chat_id, username = ?ctx.username, "New subscriber");
        Ok(format!(
            "✅ <b>You're subscribed!</b>\n\n\
             You'll receive:\n\
             • 📊 Daily reports (<code>{}</code> UTC)\n\
             • 🚨 Drawdown alerts at {}\n\n\
             Use /unsubscribe to stop.",
            config.daily_cron, config.thresholds
        ))
    }
}

pub struct UnsubscribeCommand(AppState);

#[async_trait]
impl BotCommand for UnsubscribeCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("unsubscribe", "Stop notifications").with_cooldown(SUBSCRIPTION_COOLDOWN)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<String> {
        if self.0.subscribers.remove(&ctx.chat_id).await? {
            tracing::info!(chat_id = %ctx.chat_id, "Subscriber left");
            Ok("👋 <b>You've been unsubscribed.</b>\n\nUse /subscribe to start again.".into())
        } else {
            Ok("ℹ️ You're not currently subscribed.".into())
        }
    }
}

/// `/status`: subscription state and what comes next
pub struct StatusCommand(AppState);

#[async_trait]
impl BotCommand for StatusCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("status", "Check your subscription").with_cooldown(QUERY_COOLDOWN)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<String> {
        let config = &self.0.config;
        let status = if self.0.subscribers.is_active(&ctx.chat_id).await? {
            "✅ Subscribed"
        } else {
            "❌ Not subscribed"
        };
        let next_daily = config
            .daily_cron
            .next_after(ctx.received_at)
            .map_or_else(|| "not scheduled".to_string(), |at| timestamp(&self.0, at));

        Ok(format!(
            "<b>📊 Your Subscription Status</b>\n\n\
             Status: {status}\n\
             Next daily report: {next_daily}\n\
             Alert thresholds: {}\n\
             Alert checks: every {} minutes",
            config.thresholds,
            config.alert_check_minutes()
        ))
    }
}

/// `/mystats`: delivery history for the calling chat
pub struct MyStatsCommand(AppState);

#[async_trait]
impl BotCommand for MyStatsCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("mystats", "Your delivery history").with_cooldown(QUERY_COOLDOWN)
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<String> {
        let Some(sub) = self.0.subscribers.get(&ctx.chat_id).await? else {
            return Ok("ℹ️ You're not subscribed yet. Use /subscribe to start.".into());
        };

        let last_daily = sub
            .last_daily_sent
            .map_or_else(|| "Not yet received".to_string(), |at| timestamp(&self.0, at));
        let last_alert = sub
            .last_alert_sent
            .map_or_else(|| "None sent".to_string(), |at| timestamp(&self.0, at));

        Ok(format!(
            "<b>📈 Your Stats</b>\n\n\
             Subscribed since: {}\n\
             Last daily report: {last_daily}\n\
             Last alert: {last_alert}\n\
             Status: {}",
            timestamp(&self.0, sub.subscribed_at),
            if sub.active { "✅ Active" } else { "❌ Inactive" }
        ))
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// `/debug`: scheduler, subscriber and alert-state internals
pub struct DebugCommand(AppState);

#[async_trait]
impl BotCommand for DebugCommand {
    fn spec(&self) -> CommandSpec {
        CommandSpec::new("debug", "Scheduler and system info").with_cooldown(DEBUG_COOLDOWN)
    }

    async fn execute(&self, _ctx: &CommandContext) -> Result<String> {
        let state = &self.0;
        let counts = state.subscribers.counts().await?;
        let levels = state.tracker.active_levels().await?;
        let cache = state.prices.stats().await;
        let health = state.health.lock().await.clone();

        let mut lines = vec![
            "🔧 <b>Debug Info</b>".to_string(),
            String::new(),
            "<b>Scheduler</b>".to_string(),
        ];
        for job in Job::ALL {
            let stats = health.job(job);
            let next = stats
                .next_run
                .map_or_else(|| "not scheduled".to_string(), |at| timestamp(state, at));
            lines.push(format!(
                "• {}: {} runs, {} with problems, next {next}",
                job.name(),
                stats.runs,
                stats.failures
            ));
            if let Some(error) = &stats.last_error {
                lines.push(format!("  last problem: {}", escape_html(error)));
            }
        }

        lines.push(String::new());
        lines.push(format!("<b>Subscribers:</b> {} active / {} total", counts.active, counts.total));
        lines.push(format!("<b>Configured chat ids:</b> {}", state.config.chat_ids.len()));
        lines.push(format!("<b>Indices:</b> {}", state.config.indices.len()));
        lines.push(format!("<b>Thresholds:</b> {}", state.config.thresholds.len()));
        lines.push(format!(
            "<b>Price cache:</b> {} entries, {:.0}% hits",
            cache.entries,
            cache.hit_rate_pct()
        ));

        lines.push(String::new());
        lines.push("<b>Alert levels</b>".to_string());
        if levels.is_empty() {
            lines.push("• none recorded".to_string());
        }
        let mut symbols: Vec<&String> = levels.keys().collect();
        symbols.sort();
        for symbol in symbols {
            let level = levels[symbol]
                .active_level
                .map_or_else(|| "none".to_string(), format_drawdown);
            lines.push(format!("• {}: {level}", escape_html(state.config.index_name(symbol))));
        }

        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{Harness, harness};
    use chrono::{TimeDelta, Utc};
    use index_watch::IncomingMessage;
    use index_watch::ports::mock::RecordingNotifier;

    fn message(chat_id: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            update_id: 1,
            chat_id: chat_id.into(),
            username: Some("alice".into()),
            text: text.into(),
        }
    }

    fn setup() -> (Harness, CommandRegistry) {
        let h = harness(&[("TELEGRAM_CHAT_IDS", "100")], RecordingNotifier::new());
        let registry = build_registry(&h.state);
        (h, registry)
    }

    #[test]
    fn test_registry_lists_commands() {
        let (_h, registry) = setup();
        assert_eq!(
            registry.names(),
            vec!["daily", "alerts", "subscribe", "unsubscribe", "status", "mystats", "debug"]
        );
        let help = registry.help_text();
        assert!(help.contains("/subscribe: Receive daily reports and alerts"));
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let (h, registry) = setup();
        let now = Utc::now();
        let later = now + TimeDelta::seconds(61);

        let reply = registry.dispatch(&message("5", "/subscribe"), now).await.unwrap();
        assert!(reply.contains("You're subscribed!"));
        assert!(reply.contains("5%, 10%, 15%, 20%"));
        assert!(h.state.subscribers.is_active("5").await.unwrap());

        let reply = registry.dispatch(&message("5", "/subscribe"), now).await.unwrap();
        assert!(reply.starts_with("⏱ Please wait"));

        let reply = registry.dispatch(&message("5", "/subscribe"), later).await.unwrap();
        assert!(reply.contains("already subscribed"));

        let reply = registry.dispatch(&message("5", "/status"), later).await.unwrap();
        assert!(reply.contains("✅ Subscribed"));
        assert!(reply.contains("every 30 minutes"));

        let reply = registry.dispatch(&message("5", "/unsubscribe"), later).await.unwrap();
        assert!(reply.contains("unsubscribed"));
        assert!(!h.state.subscribers.is_active("5").await.unwrap());

        let reply = registry
            .dispatch(&message("5", "/unsubscribe"), later + TimeDelta::seconds(61))
            .await
            .unwrap();
        assert!(reply.contains("not currently subscribed"));
    }

    #[tokio::test]
    async fn test_mystats() {
        let (h, registry) = setup();
        let now = Utc::now();

        let reply = registry.dispatch(&message("9", "/mystats"), now).await.unwrap();
        assert!(reply.contains("not subscribed yet"));

        h.state.subscribers.add("9", None).await.unwrap();
        let reply = registry
            .dispatch(&message("9", "/mystats"), now + TimeDelta::seconds(11))
            .await
            .unwrap();
        assert!(reply.contains("Not yet received"));
        assert!(reply.contains("None sent"));
        assert!(reply.contains("✅ Active"));
    }

    #[tokio::test]
    async fn test_daily_command_composes_report() {
        let (h, registry) = setup();

        let reply = registry.dispatch(&message("7", "/daily"), Utc::now()).await.unwrap();

        assert!(reply.contains("Daily Index Watch"));
        assert!(reply.contains("-17.00%"));
        // replying to the caller is the poll loop's job
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_alerts_and_unknown_commands() {
        let (_h, registry) = setup();
        let now = Utc::now();

        let reply = registry.dispatch(&message("7", "/alerts"), now).await.unwrap();
        assert!(reply.contains("Drawdown Alerts"));
        assert!(reply.contains("S&amp;P 500, NASDAQ-100"));

        let reply = registry.dispatch(&message("7", "/bogus"), now).await.unwrap();
        assert!(reply.contains("<b>Commands:</b>"));
        assert!(registry.dispatch(&message("7", "hello"), now).await.is_none());
    }

    #[tokio::test]
    async fn test_debug_reports_alert_levels() {
        let (h, registry) = setup();
        crate::jobs::run_alert_check(&h.state).await;

        let reply = registry.dispatch(&message("7", "/debug"), Utc::now()).await.unwrap();

        assert!(reply.contains("daily_report: 0 runs"));
        assert!(reply.contains("<b>Subscribers:</b> 0 active / 0 total"));
        assert!(reply.contains("<b>Configured chat ids:</b> 1"));
        assert!(reply.contains("• S&amp;P 500: -15.00%"));
    }
}
