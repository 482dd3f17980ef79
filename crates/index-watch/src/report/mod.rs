//! Report Composer
//!
//! Builds the HTML messages sent to chats: the daily report, threshold
//! alerts and the configuration summary. Composition is pure; callers
//! decide what to fetch and whom to send it to.

pub mod format;

use chrono::{DateTime, FixedOffset, Utc};

use crate::config::WatchConfig;
use crate::model::{FrequencyStat, IndexAnalysis, Sentiment, ThresholdCrossing};
use format::{
    drawdown_emoji, escape_html, format_drawdown, format_pct, format_price, format_timestamp,
    sentiment_emoji, threshold_indicator,
};

/// Share of history under which a crossing is called rare
const RARE_EVENT_PCT: f64 = 5.0;

const RULE: &str = "━━━━━━━━━━━━━━━━━";

/// One index section of the daily report
#[derive(Clone, Copy, Debug)]
pub struct IndexSection<'a> {
    pub name: &'a str,
    pub analysis: &'a IndexAnalysis,
}

#[derive(Clone, Debug)]
pub struct ReportComposer {
    display_offset: FixedOffset,
    history_years: u32,
}

impl ReportComposer {
    pub const fn new(display_offset: FixedOffset, history_years: u32) -> Self {
        Self {
            display_offset,
            history_years,
        }
    }

    pub const fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.display_offset, config.history_years)
    }

    /// Current status, history and recovery figures for one index
    pub fn drawdown_block(&self, name: &str, analysis: &IndexAnalysis) -> String {
        let snap = &analysis.snapshot;
        let rec = &analysis.recovery;
        let emoji = drawdown_emoji(snap.drawdown_pct);

        [
            format!("<b>📊 {}</b> {emoji}", escape_html(name)),
            RULE.to_string(),
            "<b>Current Status</b>".to_string(),
            format!("• Current Drawdown: <b>{}</b> {emoji}", format_drawdown(snap.drawdown_pct)),
            format!("• Last Closing Price: {} ({})", format_price(snap.current_price), snap.as_of),
            format!("• All Time High: {} ({})", format_price(snap.ath), snap.ath_date),
            String::new(),
            "<b>Historical Context</b>".to_string(),
            format!("• Lowest Since ATH: {}", format_price(rec.lowest_since_ath)),
            format!("• Drawdown at Lowest: {}", format_drawdown(rec.drawdown_at_lowest_pct)),
            String::new(),
            "<b>Recovery Metrics</b>".to_string(),
            format!("• Gain From Lowest: <b>+{}%</b>", format_pct(rec.gain_from_lowest_pct)),
            format!(
                "• Gain Needed (Current → ATH): <b>+{}%</b>",
                format_pct(rec.gain_to_ath_from_current_pct)
            ),
            format!(
                "• Gain Needed (Lowest → ATH): +{}%",
                format_pct(rec.gain_to_ath_from_lowest_pct)
            ),
        ]
        .join("\n")
    }

    /// Days at or beyond each threshold over the fetched history
    pub fn frequency_block(&self, name: &str, analysis: &IndexAnalysis) -> String {
        let mut lines = vec![format!(
            "<b>{}</b>: trading days at or below each drawdown",
            escape_html(name)
        )];
        lines.extend(analysis.frequency.values().map(|stat| {
            format!(
                "  {} {}%: {} days ({:.1}% of history)",
                threshold_indicator(stat.threshold),
                stat.threshold,
                stat.days,
                stat.percent_of_history()
            )
        }));
        lines.join("\n")
    }

    /// Sentiment line, or a placeholder when the source failed
    pub fn sentiment_line(&self, sentiment: Option<&Sentiment>) -> String {
        sentiment.map_or_else(
            || "😐 CNN Fear &amp; Greed Index: unavailable".to_string(),
            |s| {
                format!(
                    "{} <b>Fear &amp; Greed Index:</b> {:.1} ({}, updated {})",
                    sentiment_emoji(s.value),
                    s.value,
                    escape_html(&s.label),
                    escape_html(&s.last_update)
                )
            },
        )
    }

    /// Full daily report.
    ///
    /// `unavailable` names indices whose data could not be fetched this cycle.
    pub fn daily_report(
        &self,
        sections: &[IndexSection<'_>],
        unavailable: &[&str],
        sentiment: Option<&Sentiment>,
        as_of: DateTime<Utc>,
    ) -> String {
        let mut parts = vec![
            "<b>📈 Daily Index Watch</b>".to_string(),
            format!("<i>Updated: {}</i>", format_timestamp(as_of, self.display_offset)),
            String::new(),
        ];

        for section in sections {
            parts.push(self.drawdown_block(section.name, section.analysis));
            parts.push(String::new());
        }

        for name in unavailable {
            parts.push(format!("⚠️ <b>{}</b>: market data unavailable", escape_html(name)));
        }
        if !unavailable.is_empty() {
            parts.push(String::new());
        }

        parts.push(self.sentiment_line(sentiment));

        if !sections.is_empty() {
            parts.push(String::new());
            parts.push("<b>📊 Historical Drawdown Frequency</b>".to_string());
            parts.push(format!("<i>(Last {} years)</i>", self.history_years));
            for section in sections {
                parts.push(self.frequency_block(section.name, section.analysis));
                parts.push(String::new());
            }
        }

        parts.join("\n").trim().to_string()
    }

    /// Message for one threshold crossing
    pub fn alert_message(&self, name: &str, crossing: &ThresholdCrossing, stat: &FrequencyStat) -> String {
        let emoji = drawdown_emoji(crossing.drawdown_pct);
        let pct_of_history = stat.percent_of_history();
        let rarity = if pct_of_history < RARE_EVENT_PCT {
            "a relatively rare"
        } else {
            "not uncommon"
        };

        format!(
            "🚨 <b>Drawdown Alert: {name}</b> {emoji}\n\n\
             📉 <b>Current:</b> {current} (crossed -{threshold}% threshold)\n\
             Status: {emoji}\n\n\
             <b>📊 Historical Context</b>\n\
             In the last {years} years, we've seen -{threshold}% or worse on:\n\
             • {days} trading days ({pct_of_history:.1}% of ~{total} days)\n\n\
             💡 <i>This is {rarity} event.</i>",
            name = escape_html(name),
            current = format_drawdown(crossing.drawdown_pct),
            threshold = crossing.threshold,
            years = self.history_years,
            days = stat.days,
            total = stat.total_days,
        )
    }

    /// Thresholds, indices and schedule, for `/alerts`
    pub fn config_summary(&self, config: &WatchConfig) -> String {
        let names: Vec<String> = config.indices.iter().map(|i| escape_html(&i.name)).collect();
        [
            "🔔 <b>Drawdown Alerts</b>".to_string(),
            String::new(),
            format!("• Thresholds: {}", config.thresholds),
            format!("• Indices: {}", names.join(", ")),
            format!("• Alert check interval: every {} minutes", config.alert_check_minutes()),
            format!("• Daily report schedule: <code>{}</code> (UTC)", config.daily_cron),
        ]
        .join("\n")
    }
}
