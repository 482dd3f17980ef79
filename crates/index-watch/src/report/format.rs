//! Formatting helpers shared by every message

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;

/// Escape the characters Telegram's HTML parse mode treats as markup
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Two decimals with comma thousands separators: `19,211.10`
pub fn format_price(value: Decimal) -> String {
    let fixed = format!("{:.2}", value.round_dp(2));
    let (sign, unsigned) = fixed
        .strip_prefix('-')
        .map_or(("", fixed.as_str()), |rest| ("-", rest));
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, d) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*d);
    }

    format!("{sign}{grouped}.{frac_part}")
}

/// Two-decimal percentage without the sign handling: `17.00`
pub fn format_pct(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

/// A drawdown shown as a loss: `-17.00%`, or `0.00%` at the high
pub fn format_drawdown(drawdown_pct: Decimal) -> String {
    let rounded = drawdown_pct.round_dp(2);
    if rounded.is_zero() {
        "0.00%".into()
    } else {
        format!("-{}%", format_pct(rounded))
    }
}

/// Severity marker for a drawdown percentage
pub fn drawdown_emoji(drawdown_pct: Decimal) -> &'static str {
    if drawdown_pct <= Decimal::from(5) {
        "🟢"
    } else if drawdown_pct <= Decimal::from(10) {
        "🟡"
    } else if drawdown_pct <= Decimal::from(15) {
        "🟠"
    } else if drawdown_pct <= Decimal::from(20) {
        "🔴"
    } else {
        "🚨"
    }
}

/// Marker for a threshold row in the frequency table
pub fn threshold_indicator(threshold: Decimal) -> &'static str {
    if threshold <= Decimal::from(5) {
        "🟢"
    } else if threshold <= Decimal::from(10) {
        "🟡"
    } else if threshold <= Decimal::from(15) {
        "🟠"
    } else {
        "🔴"
    }
}

/// Fear & Greed band (0 extreme fear, 100 extreme greed)
pub fn sentiment_emoji(value: f64) -> &'static str {
    match value {
        v if v < 25.0 => "😱",
        v if v < 45.0 => "😨",
        v if v < 55.0 => "😐",
        v if v < 75.0 => "😃",
        _ => "🤑",
    }
}

/// `2025-04-07 22:00 GMT+8`
pub fn format_timestamp(at: DateTime<Utc>, offset: FixedOffset) -> String {
    let hours = offset.local_minus_utc() / 3600;
    format!(
        "{} GMT{hours:+}",
        at.with_timezone(&offset).format("%Y-%m-%d %H:%M")
    )
}
