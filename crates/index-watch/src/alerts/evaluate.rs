//! Pure crossing evaluation

use crate::model::{AlertState, DrawdownSnapshot, ThresholdCrossing, ThresholdSet};

/// Result of comparing a snapshot against the prior state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    /// Newly crossed thresholds, ascending
    pub events: Vec<ThresholdCrossing>,

    pub state: AlertState,
}

/// Compare the snapshot's level against the prior active level.
///
/// A deeper level emits one event per threshold in `(prior, current]` so a
/// jump from 3% to 17% between two checks still reports 5, 10 and 15.
/// Staying level or recovering emits nothing and lowers the active level,
/// which lets a later re-crossing alert again.
pub fn evaluate(
    snapshot: &DrawdownSnapshot,
    thresholds: &ThresholdSet,
    prior: &AlertState,
) -> Evaluation {
    let current_level = thresholds.level_for(snapshot.drawdown_pct);

    let events = if current_level > prior.active_level {
        thresholds
            .between(prior.active_level, current_level)
            .map(|threshold| ThresholdCrossing {
                symbol: snapshot.symbol.clone(),
                threshold,
                drawdown_pct: snapshot.drawdown_pct,
                at: snapshot.computed_at,
            })
            .collect()
    } else {
        Vec::new()
    };

    Evaluation {
        events,
        state: AlertState::new(current_level, snapshot.computed_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn snapshot(drawdown_pct: Decimal) -> DrawdownSnapshot {
        let date = NaiveDate::from_ymd_opt(2025, 4, 7).unwrap();
        DrawdownSnapshot {
            symbol: "^GSPC".into(),
            current_price: Decimal::ONE_HUNDRED - drawdown_pct,
            as_of: date,
            ath: Decimal::ONE_HUNDRED,
            ath_date: date,
            drawdown_pct,
            computed_at: Utc::now(),
        }
    }

    fn levels(eval: &Evaluation) -> Vec<Decimal> {
        eval.events.iter().map(|e| e.threshold).collect()
    }

    fn at(level: Option<Decimal>) -> AlertState {
        AlertState::new(level, Utc::now())
    }

    #[test]
    fn test_below_every_threshold() {
        let eval = evaluate(&snapshot(dec!(3)), &ThresholdSet::default(), &AlertState::default());
        assert!(eval.events.is_empty());
        assert_eq!(eval.state.active_level, None);
    }

    #[test]
    fn test_deeper_level_emits_skipped_thresholds() {
        let eval = evaluate(&snapshot(dec!(15.2)), &ThresholdSet::default(), &at(Some(dec!(5))));
        assert_eq!(levels(&eval), vec![dec!(10), dec!(15)]);
        assert_eq!(eval.state.active_level, Some(dec!(15)));
    }

    #[test]
    fn test_crash_from_nothing() {
        let eval = evaluate(&snapshot(dec!(17)), &ThresholdSet::default(), &AlertState::default());
        assert_eq!(levels(&eval), vec![dec!(5), dec!(10), dec!(15)]);
        assert!(eval.events.iter().all(|e| e.symbol == "^GSPC" && e.drawdown_pct == dec!(17)));
    }

    #[test]
    fn test_unchanged_snapshot_does_not_repeat() {
        let thresholds = ThresholdSet::default();
        let snap = snapshot(dec!(11));

        let first = evaluate(&snap, &thresholds, &AlertState::default());
        assert_eq!(levels(&first), vec![dec!(5), dec!(10)]);

        let second = evaluate(&snap, &thresholds, &first.state);
        assert!(second.events.is_empty());
        assert_eq!(second.state.active_level, Some(dec!(10)));
    }

    #[test]
    fn test_recovery_lowers_level_silently() {
        let eval = evaluate(&snapshot(dec!(6)), &ThresholdSet::default(), &at(Some(dec!(15))));
        assert!(eval.events.is_empty());
        assert_eq!(eval.state.active_level, Some(dec!(5)));
    }

    #[test]
    fn test_recovery_then_recross_alerts_once() {
        let thresholds = ThresholdSet::default();

        let recovered = evaluate(&snapshot(dec!(4)), &thresholds, &at(Some(dec!(5))));
        assert!(recovered.events.is_empty());
        assert_eq!(recovered.state.active_level, None);

        let recrossed = evaluate(&snapshot(dec!(5.5)), &thresholds, &recovered.state);
        assert_eq!(levels(&recrossed), vec![dec!(5)]);
    }

    #[test]
    fn test_exact_boundary_crosses() {
        let eval = evaluate(&snapshot(dec!(5.000)), &ThresholdSet::default(), &AlertState::default());
        assert_eq!(levels(&eval), vec![dec!(5)]);
    }

    #[test]
    fn test_beyond_deepest_threshold() {
        let eval = evaluate(&snapshot(dec!(48)), &ThresholdSet::default(), &at(Some(dec!(20))));
        assert!(eval.events.is_empty());
        assert_eq!(eval.state.active_level, Some(dec!(20)));
    }
}
