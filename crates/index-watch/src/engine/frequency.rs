//! Historical drawdown frequency
//!
//! One forward pass over the series tracking the running ATH. Each day's
//! drawdown is measured against the high as of that day, not the global high,
//! and every threshold is counted in the same pass.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::drawdown::drawdown_pct;
use crate::error::Result;
use crate::model::{FrequencyStat, IndexSeries, ThresholdSet};

/// Days at or beyond each threshold, with the window size as denominator
pub fn compute_frequency_stats(
    series: &IndexSeries,
    thresholds: &ThresholdSet,
) -> Result<BTreeMap<Decimal, FrequencyStat>> {
    let levels = thresholds.as_slice();
    let mut counts = vec![0usize; levels.len()];
    let mut running_ath = Decimal::ZERO;

    for close in series.closes() {
        running_ath = running_ath.max(close);
        let drawdown = drawdown_pct(running_ath, close, series.symbol())?;

        // levels are ascending, so every threshold before the partition point is met
        let met = levels.partition_point(|t| *t <= drawdown);
        for count in &mut counts[..met] {
            *count += 1;
        }
    }

    let total_days = series.len();
    Ok(levels
        .iter()
        .zip(counts)
        .map(|(threshold, days)| {
            (
                *threshold,
                FrequencyStat {
                    threshold: *threshold,
                    days,
                    total_days,
                },
            )
        })
        .collect())
}
