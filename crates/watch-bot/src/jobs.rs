//! Scheduled Jobs
//!
//! The daily report and the alert check. Both resolve recipients first and
//! scope every failure to one index or one recipient; a run never aborts
//! because a single fetch or send went wrong.

use chrono::Utc;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use index_watch::ports::{DeliveryReport, fetch_with_timeout};
use index_watch::{FrequencyStat, IndexAnalysis, IndexSection, IndexSpec, Result, WatchError, analyze};

use crate::state::AppState;

/// What one job run did
#[derive(Clone, Debug, Default, Serialize)]
pub struct JobOutcome {
    pub cycle_id: String,
    pub recipients: usize,

    /// Distinct messages composed and broadcast
    pub messages: usize,
    pub delivered: usize,
    pub failed: usize,

    /// Indices left out of this run
    pub skipped: Vec<String>,

    /// `SYMBOL -N%` per threshold crossing sent
    pub alerts: Vec<String>,
}

impl JobOutcome {
    fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            ..Self::default()
        }
    }

    fn absorb(&mut self, delivery: &DeliveryReport) {
        self.messages += 1;
        self.delivered += delivery.delivered.len();
        self.failed += delivery.failed.len();
    }

    /// Short description of what went wrong, if anything
    pub fn error_summary(&self) -> Option<String> {
        let mut problems = Vec::new();
        if !self.skipped.is_empty() {
            problems.push(format!("skipped {}", self.skipped.join(", ")));
        }
        if self.failed > 0 {
            problems.push(format!("{} deliveries failed", self.failed));
        }
        (!problems.is_empty()).then(|| problems.join("; "))
    }
}

/// A composed daily report
#[derive(Clone, Debug)]
pub struct DailyReport {
    pub text: String,
    pub unavailable: Vec<String>,
}

#[derive(Clone, Copy)]
enum Sent {
    Daily,
    Alert,
}

/// Active subscribers, or the configured chat ids when there are none
pub async fn resolve_recipients(state: &AppState) -> Vec<String> {
    match state.subscribers.active_chat_ids().await {
        Ok(active) if !active.is_empty() => active,
        Ok(_) => state.config.chat_ids.clone(),
        Err(e) => {
            tracing::warn!(error = %e, "Subscriber lookup failed, using configured chat ids");
            state.config.chat_ids.clone()
        }
    }
}

/// Fetch one index within the configured timeout and analyze it
pub async fn analyze_index(state: &AppState, index: &IndexSpec) -> Result<IndexAnalysis> {
    let series = fetch_with_timeout(
        state.prices.as_ref(),
        &index.symbol,
        state.config.history_years,
        state.config.fetch_timeout,
    )
    .await?;
    analyze(&series, &state.config.thresholds)
}

fn log_index_failure(index: &IndexSpec, err: &WatchError) {
    if err.is_bug() {
        tracing::error!(symbol = %index.symbol, error = %err, "Index analysis failed");
    } else {
        tracing::warn!(symbol = %index.symbol, error = %err, "Index skipped this cycle");
    }
}

/// Analyze every configured index and compose the report.
///
/// Indices that fail are listed as unavailable; a sentiment failure only
/// blanks the sentiment line.
pub async fn compose_daily_report(state: &AppState) -> DailyReport {
    let mut analyses: Vec<(&str, IndexAnalysis)> = Vec::new();
    let mut unavailable = Vec::new();

    for index in &state.config.indices {
        match analyze_index(state, index).await {
            Ok(analysis) => analyses.push((index.name.as_str(), analysis)),
            Err(e) => {
                log_index_failure(index, &e);
                unavailable.push(index.name.clone());
            }
        }
    }

    let sentiment = match state.sentiment.fetch_current().await {
        Ok(reading) => Some(reading),
        Err(e) => {
            tracing::warn!(source = state.sentiment.name(), error = %e, "Sentiment unavailable");
            None
        }
    };

    let sections: Vec<IndexSection<'_>> = analyses
        .iter()
        .map(|(name, analysis)| IndexSection { name: *name, analysis })
        .collect();
    let missing: Vec<&str> = unavailable.iter().map(String::as_str).collect();
    let text = state
        .composer
        .daily_report(&sections, &missing, sentiment.as_ref(), Utc::now());

    DailyReport { text, unavailable }
}

async fn mark_sent(state: &AppState, delivery: &DeliveryReport, kind: Sent) {
    let now = Utc::now();
    for chat_id in &delivery.delivered {
        let result = match kind {
            Sent::Daily => state.subscribers.mark_daily_sent(chat_id, now).await,
            Sent::Alert => state.subscribers.mark_alert_sent(chat_id, now).await,
        };
        if let Err(e) = result {
            tracing::warn!(chat_id = %chat_id, error = %e, "Failed to record delivery");
        }
    }
}

/// Compose the daily report and send it to every recipient
pub async fn run_daily_report(state: &AppState) -> JobOutcome {
    let cycle_id = Uuid::new_v4();
    let span = tracing::info_span!("daily_report", %cycle_id);

    async move {
        let mut outcome = JobOutcome::new(cycle_id);
        let recipients = resolve_recipients(state).await;
        if recipients.is_empty() {
            tracing::warn!("No recipients, skipping daily report");
            return outcome;
        }
        outcome.recipients = recipients.len();

        let report = compose_daily_report(state).await;
        let delivery = state.notifier.broadcast(&recipients, &report.text).await;
        mark_sent(state, &delivery, Sent::Daily).await;

        outcome.absorb(&delivery);
        outcome.skipped = report.unavailable;

        tracing::info!(
            recipients = outcome.recipients,
            delivered = outcome.delivered,
            failed = outcome.failed,
            skipped = outcome.skipped.len(),
            "Daily report sent"
        );
        outcome
    }
    .instrument(span)
    .await
}

/// Check every index for newly crossed thresholds and alert on each
pub async fn run_alert_check(state: &AppState) -> JobOutcome {
    let cycle_id = Uuid::new_v4();
    let span = tracing::info_span!("alert_check", %cycle_id);

    async move {
        let mut outcome = JobOutcome::new(cycle_id);
        let recipients = resolve_recipients(state).await;
        if recipients.is_empty() {
            tracing::debug!("No recipients, skipping alert check");
            return outcome;
        }
        outcome.recipients = recipients.len();

        for index in &state.config.indices {
            let analysis = match analyze_index(state, index).await {
                Ok(analysis) => analysis,
                Err(e) => {
                    log_index_failure(index, &e);
                    outcome.skipped.push(index.name.clone());
                    continue;
                }
            };

            // state is already persisted once this returns
            let crossings = match state.tracker.check(&analysis.snapshot).await {
                Ok(crossings) => crossings,
                Err(e) => {
                    tracing::warn!(symbol = %index.symbol, error = %e, "Alert state unavailable");
                    outcome.skipped.push(index.name.clone());
                    continue;
                }
            };

            for crossing in &crossings {
                let stat = analysis
                    .frequency
                    .get(&crossing.threshold)
                    .copied()
                    .unwrap_or(FrequencyStat {
                        threshold: crossing.threshold,
                        days: 0,
                        total_days: analysis.total_days,
                    });
                let text = state.composer.alert_message(&index.name, crossing, &stat);
                let delivery = state.notifier.broadcast(&recipients, &text).await;
                mark_sent(state, &delivery, Sent::Alert).await;

                tracing::info!(
                    symbol = %index.symbol,
                    threshold = %crossing.threshold,
                    drawdown_pct = %crossing.drawdown_pct.round_dp(2),
                    delivered = delivery.delivered.len(),
                    "Threshold alert sent"
                );
                outcome.absorb(&delivery);
                outcome.alerts.push(format!("{} -{}%", index.symbol, crossing.threshold));
            }
        }

        tracing::info!(
            alerts = outcome.alerts.len(),
            skipped = outcome.skipped.len(),
            "Alert check complete"
        );
        outcome
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::harness;
    use index_watch::ports::mock::RecordingNotifier;
    use rust_decimal_macros::dec;

    const CHATS: (&str, &str) = ("TELEGRAM_CHAT_IDS", "100,200");

    #[tokio::test]
    async fn test_recipients_fall_back_to_config() {
        let h = harness(&[CHATS], RecordingNotifier::new());
        assert_eq!(resolve_recipients(&h.state).await, vec!["100", "200"]);

        h.state.subscribers.add("300", None).await.unwrap();
        assert_eq!(resolve_recipients(&h.state).await, vec!["300"]);
    }

    #[tokio::test]
    async fn test_daily_report_lists_unavailable_index() {
        let h = harness(&[CHATS], RecordingNotifier::new());

        let outcome = run_daily_report(&h.state).await;

        assert_eq!(outcome.recipients, 2);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.skipped, vec!["NASDAQ-100"]);
        assert!(outcome.error_summary().unwrap().contains("NASDAQ-100"));

        let text = &h.notifier.sent_to("100")[0];
        assert!(text.contains("S&amp;P 500"));
        assert!(text.contains("-17.00%"));
        assert!(text.contains("<b>NASDAQ-100</b>: market data unavailable"));
        assert!(text.contains("Fear &amp; Greed"));
    }

    #[tokio::test]
    async fn test_daily_report_marks_subscribers() {
        let h = harness(&[], RecordingNotifier::new());
        h.state.subscribers.add("300", Some("alice".into())).await.unwrap();

        run_daily_report(&h.state).await;

        let sub = h.state.subscribers.get("300").await.unwrap().unwrap();
        assert!(sub.last_daily_sent.is_some());
        assert!(sub.last_alert_sent.is_none());
    }

    #[tokio::test]
    async fn test_no_recipients_skips_fetching() {
        let h = harness(&[], RecordingNotifier::new());

        let daily = run_daily_report(&h.state).await;
        let alerts = run_alert_check(&h.state).await;

        assert_eq!(daily.messages, 0);
        assert_eq!(alerts.messages, 0);
        assert_eq!(h.prices.calls(), 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_alert_check_sends_each_crossing_once() {
        let h = harness(&[CHATS], RecordingNotifier::new());

        let first = run_alert_check(&h.state).await;
        assert_eq!(first.alerts, vec!["^GSPC -5%", "^GSPC -10%", "^GSPC -15%"]);
        assert_eq!(first.messages, 3);
        assert_eq!(h.notifier.sent().len(), 6);
        assert!(h.notifier.sent_to("200")[2].contains("crossed -15% threshold"));

        let second = run_alert_check(&h.state).await;
        assert!(second.alerts.is_empty());
        assert_eq!(h.notifier.sent().len(), 6);

        let levels = h.state.tracker.active_levels().await.unwrap();
        assert_eq!(levels["^GSPC"].active_level, Some(dec!(15)));
    }

    #[tokio::test]
    async fn test_failed_recipient_does_not_stop_others() {
        let h = harness(&[CHATS], RecordingNotifier::new().failing_for("100"));

        let outcome = run_alert_check(&h.state).await;

        assert_eq!(outcome.delivered, 3);
        assert_eq!(outcome.failed, 3);
        assert_eq!(h.notifier.sent_to("200").len(), 3);
        assert!(outcome.error_summary().unwrap().contains("3 deliveries failed"));
    }

    #[tokio::test]
    async fn test_cache_shared_between_jobs() {
        let h = harness(&[CHATS], RecordingNotifier::new());

        run_daily_report(&h.state).await;
        run_alert_check(&h.state).await;

        // ^GSPC fetched once; the unknown ^NDX errors are never cached
        assert_eq!(h.prices.calls(), 3);
    }
}
