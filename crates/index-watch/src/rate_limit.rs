//! Per-chat command cooldowns

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Remembers when each chat last ran each command
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_request: Mutex<HashMap<(String, String), DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if allowed (and records `now`), otherwise the time left
    pub fn check(
        &self,
        chat_id: &str,
        command: &str,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let mut last_request = self.lock();
        let key = (chat_id.to_string(), command.to_string());

        let elapsed = last_request
            .get(&key)
            .and_then(|last| (now - *last).to_std().ok())
            .filter(|elapsed| *elapsed < cooldown);

        if let Some(elapsed) = elapsed {
            let remaining = cooldown - elapsed;
            tracing::info!(
                chat_id,
                command,
                remaining_secs = remaining.as_secs(),
                "Rate limit hit"
            );
            return Some(remaining);
        }

        last_request.insert(key, now);
        None
    }

    /// Forget every cooldown for one chat
    pub fn reset(&self, chat_id: &str) {
        self.lock().retain(|(chat, _), _| chat != chat_id);
    }

    /// Drop entries older than `max_age`; returns how many were removed
    pub fn cleanup(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let mut last_request = self.lock();
        let before = last_request.len();
        last_request.retain(|_, last| (now - *last).to_std().map_or(true, |age| age <= max_age));
        let removed = before - last_request.len();
        if removed > 0 {
            tracing::debug!(removed, "Rate limiter entries cleaned up");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), DateTime<Utc>>> {
        self.last_request.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `4m 59s`, rounding partial seconds up so the wait never reads `0m 0s`
pub fn format_wait(remaining: Duration) -> String {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    format!("{}m {}s", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const FIVE_MIN: Duration = Duration::from_secs(300);

    #[test]
    fn test_cooldown_per_chat_and_command() {
        let limiter = RateLimiter::new();
        let t0 = Utc::now();

        assert_eq!(limiter.check("1", "daily", FIVE_MIN, t0), None);

        let wait = limiter.check("1", "daily", FIVE_MIN, t0 + TimeDelta::seconds(1));
        assert_eq!(wait, Some(Duration::from_secs(299)));

        assert_eq!(limiter.check("2", "daily", FIVE_MIN, t0), None);
        assert_eq!(limiter.check("1", "status", FIVE_MIN, t0), None);

        assert_eq!(limiter.check("1", "daily", FIVE_MIN, t0 + TimeDelta::seconds(300)), None);
    }

    #[test]
    fn test_rejected_request_does_not_extend_cooldown() {
        let limiter = RateLimiter::new();
        let t0 = Utc::now();
        let ten = Duration::from_secs(10);

        limiter.check("1", "alerts", ten, t0);
        assert!(limiter.check("1", "alerts", ten, t0 + TimeDelta::seconds(9)).is_some());
        assert!(limiter.check("1", "alerts", ten, t0 + TimeDelta::seconds(10)).is_none());
    }

    #[test]
    fn test_reset_and_cleanup() {
        let limiter = RateLimiter::new();
        let t0 = Utc::now();

        limiter.check("1", "daily", FIVE_MIN, t0);
        limiter.check("1", "debug", FIVE_MIN, t0);
        limiter.check("2", "daily", FIVE_MIN, t0 + TimeDelta::hours(23));
        assert_eq!(limiter.len(), 3);

        limiter.reset("1");
        assert_eq!(limiter.len(), 1);

        let removed = limiter.cleanup(Duration::from_secs(3600), t0 + TimeDelta::hours(25));
        assert_eq!(removed, 1);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(Duration::from_secs(299)), "4m 59s");
        assert_eq!(format_wait(Duration::from_secs(60)), "1m 0s");
        assert_eq!(format_wait(Duration::from_millis(9_200)), "0m 10s");
    }
}
