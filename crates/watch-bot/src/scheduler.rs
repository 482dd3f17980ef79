//! Job Scheduler
//!
//! Two long-lived tasks: the daily report on its cron schedule and the alert
//! check on a fixed interval. Every run lands in [`HealthStats`]; nothing a
//! job does can end its loop.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::instrument;

use crate::jobs::{self, JobOutcome};
use crate::state::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Job {
    DailyReport,
    AlertCheck,
}

impl Job {
    pub const ALL: [Self; 2] = [Self::DailyReport, Self::AlertCheck];

    pub const fn name(self) -> &'static str {
        match self {
            Self::DailyReport => "daily_report",
            Self::AlertCheck => "alert_check",
        }
    }
}

/// Per-job run bookkeeping
#[derive(Clone, Debug, Default, Serialize)]
pub struct JobStats {
    pub runs: u64,

    /// Runs that skipped an index or failed a delivery
    pub failures: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_delivered: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthStats {
    pub started_at: DateTime<Utc>,
    pub daily_report: JobStats,
    pub alert_check: JobStats,
}

pub type SharedHealthStats = Arc<Mutex<HealthStats>>;

pub fn shared_health() -> SharedHealthStats {
    Arc::new(Mutex::new(HealthStats::new(Utc::now())))
}

impl HealthStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            daily_report: JobStats::default(),
            alert_check: JobStats::default(),
        }
    }

    pub const fn job(&self, job: Job) -> &JobStats {
        match job {
            Job::DailyReport => &self.daily_report,
            Job::AlertCheck => &self.alert_check,
        }
    }

    fn job_mut(&mut self, job: Job) -> &mut JobStats {
        match job {
            Job::DailyReport => &mut self.daily_report,
            Job::AlertCheck => &mut self.alert_check,
        }
    }

    pub fn uptime_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }

    pub fn schedule(&mut self, job: Job, next_run: Option<DateTime<Utc>>) {
        self.job_mut(job).next_run = next_run;
    }

    /// Fold a finished run into the stats
    pub fn record(&mut self, job: Job, outcome: &JobOutcome, at: DateTime<Utc>) {
        let stats = self.job_mut(job);
        stats.runs += 1;
        stats.last_run = Some(at);
        stats.last_delivered = outcome.delivered;
        if let Some(error) = outcome.error_summary() {
            stats.failures += 1;
            stats.last_error = Some(error);
        }
    }
}

async fn sleep_until(target: DateTime<Utc>) {
    let wait = (target - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
}

/// Run the daily report at every fire time of the configured cron schedule
#[instrument(skip(state), fields(cron = %state.config.daily_cron))]
pub async fn run_daily_loop(state: AppState) {
    let schedule = state.config.daily_cron.clone();

    loop {
        let Some(next) = schedule.next_after(Utc::now()) else {
            tracing::error!("Daily report schedule never fires, stopping");
            state.health.lock().await.schedule(Job::DailyReport, None);
            return;
        };
        state.health.lock().await.schedule(Job::DailyReport, Some(next));
        tracing::info!(next_run = %next, "Next daily report scheduled");

        sleep_until(next).await;

        let outcome = jobs::run_daily_report(&state).await;
        state
            .health
            .lock()
            .await
            .record(Job::DailyReport, &outcome, Utc::now());
    }
}

/// Run the alert check every configured interval, starting one interval
/// after startup
#[instrument(skip(state), fields(minutes = state.config.alert_check_minutes()))]
pub async fn run_alert_loop(state: AppState) {
    let period = state.config.alert_check_interval;
    let step = TimeDelta::from_std(period).ok();
    let next_run = || step.map(|s| Utc::now() + s);

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    state.health.lock().await.schedule(Job::AlertCheck, next_run());
    tracing::info!("Alert checks scheduled");

    loop {
        ticker.tick().await;

        let outcome = jobs::run_alert_check(&state).await;
        let mut health = state.health.lock().await;
        health.record(Job::AlertCheck, &outcome, Utc::now());
        health.schedule(Job::AlertCheck, next_run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(delivered: usize, failed: usize, skipped: &[&str]) -> JobOutcome {
        JobOutcome {
            delivered,
            failed,
            skipped: skipped.iter().map(|s| (*s).to_string()).collect(),
            ..JobOutcome::default()
        }
    }

    #[test]
    fn test_record_counts_runs_and_failures() {
        let start = Utc::now();
        let mut stats = HealthStats::new(start);

        stats.record(Job::AlertCheck, &outcome(2, 0, &[]), start);
        assert_eq!(stats.alert_check.runs, 1);
        assert_eq!(stats.alert_check.failures, 0);
        assert!(stats.alert_check.last_error.is_none());

        stats.record(Job::AlertCheck, &outcome(1, 1, &["NASDAQ-100"]), start);
        let job = stats.job(Job::AlertCheck);
        assert_eq!(job.runs, 2);
        assert_eq!(job.failures, 1);
        assert_eq!(job.last_delivered, 1);
        assert_eq!(
            job.last_error.as_deref(),
            Some("skipped NASDAQ-100; 1 deliveries failed")
        );

        // a later clean run keeps the last error for inspection
        stats.record(Job::AlertCheck, &outcome(2, 0, &[]), start);
        assert!(stats.alert_check.last_error.is_some());
        assert_eq!(stats.daily_report.runs, 0);
    }

    #[test]
    fn test_schedule_and_uptime() {
        let start = Utc::now();
        let mut stats = HealthStats::new(start);
        let next = start + TimeDelta::minutes(30);

        stats.schedule(Job::DailyReport, Some(next));
        assert_eq!(stats.daily_report.next_run, Some(next));
        assert_eq!(stats.uptime_secs(start + TimeDelta::seconds(90)), 90);
        assert_eq!(stats.uptime_secs(start - TimeDelta::seconds(5)), 0);
    }

    #[test]
    fn test_job_names() {
        let names: Vec<&str> = Job::ALL.iter().map(|j| j.name()).collect();
        assert_eq!(names, vec!["daily_report", "alert_check"]);
    }
}
