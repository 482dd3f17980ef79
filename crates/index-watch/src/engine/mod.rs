//! Drawdown Engine
//!
//! Pure computations over an [`IndexSeries`](crate::model::IndexSeries).
//! Nothing here does I/O or reads the clock except to stamp snapshots.

mod drawdown;
mod frequency;

pub use drawdown::{compute_recovery, compute_snapshot, compute_snapshot_at};
pub use frequency::compute_frequency_stats;

use chrono::Utc;

use crate::error::Result;
use crate::model::{IndexAnalysis, IndexSeries, ThresholdSet};

/// Snapshot, recovery metrics and frequency table in one call
pub fn analyze(series: &IndexSeries, thresholds: &ThresholdSet) -> Result<IndexAnalysis> {
    let snapshot = compute_snapshot_at(series, Utc::now())?;
    let recovery = compute_recovery(series)?;
    let frequency = compute_frequency_stats(series, thresholds)?;

    Ok(IndexAnalysis {
        snapshot,
        recovery,
        frequency,
        total_days: series.len(),
    })
}
