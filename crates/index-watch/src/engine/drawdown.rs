//! Current drawdown and recovery metrics

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{Result, WatchError};
use crate::model::{DrawdownSnapshot, IndexSeries, PricePoint, RecoveryMetrics};

/// Drawdown of the latest close from the highest close in the series
pub fn compute_snapshot(series: &IndexSeries) -> Result<DrawdownSnapshot> {
    compute_snapshot_at(series, Utc::now())
}

pub fn compute_snapshot_at(
    series: &IndexSeries,
    computed_at: DateTime<Utc>,
) -> Result<DrawdownSnapshot> {
    let latest = series.latest().ok_or_else(|| {
        WatchError::InsufficientData(format!("empty series for {}", series.symbol()))
    })?;

    // First occurrence wins so the ATH date is when the high was set.
    let peak = series
        .points()
        .iter()
        .fold(None, |best: Option<&PricePoint>, p| match best {
            Some(b) if b.close >= p.close => Some(b),
            _ => Some(p),
        })
        .ok_or_else(|| {
            WatchError::InsufficientData(format!("empty series for {}", series.symbol()))
        })?;

    let drawdown_pct = drawdown_pct(peak.close, latest.close, series.symbol())?;

    Ok(DrawdownSnapshot {
        symbol: series.symbol().to_string(),
        current_price: latest.close,
        as_of: latest.date,
        ath: peak.close,
        ath_date: peak.date,
        drawdown_pct,
        computed_at,
    })
}

/// Lowest close since the last ATH and the gains needed to recover
pub fn compute_recovery(series: &IndexSeries) -> Result<RecoveryMetrics> {
    let mut closes = series.closes();
    let first = closes.next().ok_or_else(|| {
        WatchError::InsufficientData(format!("empty series for {}", series.symbol()))
    })?;

    let (ath, lowest, current) = closes.fold((first, first, first), |(ath, lowest, _), p| {
        if p > ath {
            (p, p, p)
        } else if p < lowest {
            (ath, p, p)
        } else {
            (ath, lowest, p)
        }
    });

    if lowest <= Decimal::ZERO || current <= Decimal::ZERO {
        return Err(WatchError::DataIntegrity(format!(
            "{}: non-positive close in recovery metrics",
            series.symbol()
        )));
    }

    Ok(RecoveryMetrics {
        lowest_since_ath: lowest,
        drawdown_at_lowest_pct: drawdown_pct(ath, lowest, series.symbol())?,
        gain_from_lowest_pct: gain_pct(lowest, current),
        gain_to_ath_from_current_pct: gain_pct(current, ath),
        gain_to_ath_from_lowest_pct: gain_pct(lowest, ath),
    })
}

/// (peak - price) / peak * 100
pub(crate) fn drawdown_pct(peak: Decimal, price: Decimal, symbol: &str) -> Result<Decimal> {
    if peak <= Decimal::ZERO {
        return Err(WatchError::DataIntegrity(format!(
            "{symbol}: all-time high {peak} is not positive"
        )));
    }

    let pct = (peak - price) / peak * Decimal::ONE_HUNDRED;

    if pct < Decimal::ZERO || pct >= Decimal::ONE_HUNDRED {
        return Err(WatchError::DataIntegrity(format!(
            "{symbol}: drawdown {pct}% outside [0, 100)"
        )));
    }

    Ok(pct)
}

/// Percentage move from `from` to `to`; callers guarantee `from > 0`
fn gain_pct(from: Decimal, to: Decimal) -> Decimal {
    (to / from - Decimal::ONE) * Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn series(closes: &[Decimal]) -> IndexSeries {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        IndexSeries::from_closes("^GSPC", start, closes).unwrap()
    }

    #[test]
    fn test_flat_series_has_zero_drawdown() {
        let snap = compute_snapshot(&series(&[dec!(250); 30])).unwrap();
        assert_eq!(snap.drawdown_pct, Decimal::ZERO);
        assert_eq!(snap.ath, dec!(250));
    }

    #[test]
    fn test_single_point() {
        let snap = compute_snapshot(&series(&[dec!(42)])).unwrap();
        assert_eq!(snap.current_price, dec!(42));
        assert_eq!(snap.drawdown_pct, Decimal::ZERO);
    }

    #[test]
    fn test_drawdown_from_global_high() {
        let s = series(&[dec!(80), dec!(100), dec!(97), dec!(94), dec!(91), dec!(83)]);
        let snap = compute_snapshot(&s).unwrap();
        assert_eq!(snap.ath, dec!(100));
        assert_eq!(snap.current_price, dec!(83));
        assert_eq!(snap.drawdown_pct, dec!(17));
        assert_eq!(snap.ath_date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(snap.as_of, NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
    }

    #[test]
    fn test_ath_is_max_and_drawdown_in_range() {
        let closes = [dec!(10), dec!(55.5), dec!(3), dec!(54), dec!(0.01)];
        let snap = compute_snapshot(&series(&closes)).unwrap();
        assert_eq!(snap.ath, dec!(55.5));
        assert!(snap.drawdown_pct >= Decimal::ZERO);
        assert!(snap.drawdown_pct < Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_exact_boundary() {
        let snap = compute_snapshot(&series(&[dec!(100), dec!(95)])).unwrap();
        assert_eq!(snap.drawdown_pct, dec!(5));
    }

    #[test]
    fn test_non_positive_peak_is_integrity_error() {
        let err = drawdown_pct(Decimal::ZERO, dec!(1), "X").unwrap_err();
        assert!(matches!(err, WatchError::DataIntegrity(_)));
    }

    #[test]
    fn test_recovery_metrics() {
        let s = series(&[dec!(7002.28), dec!(6780.13), dec!(6836.17)]);
        let snap = compute_snapshot(&s).unwrap();
        let rec = compute_recovery(&s).unwrap();

        assert_eq!(snap.drawdown_pct.round_dp(2), dec!(2.37));
        assert_eq!(rec.lowest_since_ath, dec!(6780.13));
        assert_eq!(rec.drawdown_at_lowest_pct.round_dp(2), dec!(3.17));
        assert_eq!(rec.gain_from_lowest_pct.round_dp(2), dec!(0.83));
        assert_eq!(rec.gain_to_ath_from_current_pct.round_dp(2), dec!(2.43));
        assert_eq!(rec.gain_to_ath_from_lowest_pct.round_dp(2), dec!(3.28));
    }

    #[test]
    fn test_new_ath_resets_lowest() {
        let s = series(&[dec!(100), dec!(90), dec!(95), dec!(105), dec!(102)]);
        let rec = compute_recovery(&s).unwrap();
        assert_eq!(rec.lowest_since_ath, dec!(102));
    }

    #[test]
    fn test_recovery_at_ath() {
        let s = series(&[dec!(80), dec!(100)]);
        let rec = compute_recovery(&s).unwrap();
        assert_eq!(rec.lowest_since_ath, dec!(100));
        assert_eq!(rec.gain_to_ath_from_current_pct, Decimal::ZERO);
        assert_eq!(rec.drawdown_at_lowest_pct, Decimal::ZERO);
    }
}
