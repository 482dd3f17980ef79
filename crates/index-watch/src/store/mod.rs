//! Persistence
//!
//! Key-value repositories for alert state and subscribers. Implementations
//! report every failure as [`WatchError::Persistence`](crate::WatchError).

mod json_file;
mod memory;

pub use json_file::{JsonFileAlertStore, JsonFileSubscriberStore};
pub use memory::{MemoryAlertStore, MemorySubscriberStore};

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{AlertState, Subscriber};

/// Last notified level per symbol
#[async_trait]
pub trait AlertStateStore: Send + Sync {
    /// State for one symbol, `None` if never stored
    async fn get(&self, symbol: &str) -> Result<Option<AlertState>>;

    async fn set(&self, symbol: &str, state: &AlertState) -> Result<()>;

    /// Every stored state
    async fn all(&self) -> Result<HashMap<String, AlertState>>;
}

/// Subscriber totals
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscriberCounts {
    pub total: usize,
    pub active: usize,
}

/// Chats that opted in to reports and alerts
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Returns true when newly added or reactivated
    async fn add(&self, chat_id: &str, username: Option<String>) -> Result<bool>;

    /// Soft delete; returns false if unknown or already inactive
    async fn remove(&self, chat_id: &str) -> Result<bool>;

    async fn get(&self, chat_id: &str) -> Result<Option<Subscriber>>;

    async fn active_chat_ids(&self) -> Result<Vec<String>>;

    async fn mark_daily_sent(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn mark_alert_sent(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn counts(&self) -> Result<SubscriberCounts>;

    async fn is_active(&self, chat_id: &str) -> Result<bool> {
        Ok(self.get(chat_id).await?.is_some_and(|s| s.active))
    }

    /// Seed from configured chat ids; returns how many were added
    async fn migrate_chat_ids(&self, chat_ids: &[String]) -> Result<usize> {
        let mut migrated = 0;
        for chat_id in chat_ids {
            if self.add(chat_id, None).await? {
                migrated += 1;
            }
        }
        if migrated > 0 {
            tracing::info!(migrated, "Migrated configured chat ids to subscriber store");
        }
        Ok(migrated)
    }
}

/// Shared add/remove/mark logic over a plain map
pub(crate) mod subscribers {
    use std::collections::HashMap;

    use chrono::{DateTime, Utc};

    use super::SubscriberCounts;
    use crate::model::Subscriber;

    pub fn add(map: &mut HashMap<String, Subscriber>, chat_id: &str, username: Option<String>) -> bool {
        match map.get_mut(chat_id) {
            Some(existing) if existing.active => false,
            Some(existing) => {
                existing.active = true;
                existing.subscribed_at = Utc::now();
                if username.is_some() {
                    existing.username = username;
                }
                true
            }
            None => {
                map.insert(chat_id.to_string(), Subscriber::new(chat_id, username));
                true
            }
        }
    }

    pub fn remove(map: &mut HashMap<String, Subscriber>, chat_id: &str) -> bool {
        match map.get_mut(chat_id) {
            Some(existing) if existing.active => {
                existing.active = false;
                true
            }
            _ => false,
        }
    }

    pub fn active_chat_ids(map: &HashMap<String, Subscriber>) -> Vec<String> {
        let mut ids: Vec<String> = map
            .values()
            .filter(|s| s.active)
            .map(|s| s.chat_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn counts(map: &HashMap<String, Subscriber>) -> SubscriberCounts {
        SubscriberCounts {
            total: map.len(),
            active: map.values().filter(|s| s.active).count(),
        }
    }

    /// Returns true if the chat was known
    pub fn mark(
        map: &mut HashMap<String, Subscriber>,
        chat_id: &str,
        update: impl FnOnce(&mut Subscriber),
    ) -> bool {
        map.get_mut(chat_id).map(update).is_some()
    }

    pub fn daily(at: DateTime<Utc>) -> impl FnOnce(&mut Subscriber) {
        move |s: &mut Subscriber| s.last_daily_sent = Some(at)
    }

    pub fn alert(at: DateTime<Utc>) -> impl FnOnce(&mut Subscriber) {
        move |s: &mut Subscriber| s.last_alert_sent = Some(at)
    }
}
