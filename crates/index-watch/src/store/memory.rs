//! In-memory stores (for development/testing)

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{AlertStateStore, SubscriberCounts, SubscriberStore, subscribers};
use crate::error::Result;
use crate::model::{AlertState, Subscriber};

#[derive(Default)]
pub struct MemoryAlertStore {
    states: RwLock<HashMap<String, AlertState>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStateStore for MemoryAlertStore {
    async fn get(&self, symbol: &str) -> Result<Option<AlertState>> {
        Ok(self.states.read().await.get(symbol).cloned())
    }

    async fn set(&self, symbol: &str, state: &AlertState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(symbol.to_string(), state.clone());
        Ok(())
    }

    async fn all(&self) -> Result<HashMap<String, AlertState>> {
        Ok(self.states.read().await.clone())
    }
}

#[derive(Default)]
pub struct MemorySubscriberStore {
    subscribers: RwLock<HashMap<String, Subscriber>>,
}

impl MemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn add(&self, chat_id: &str, username: Option<String>) -> Result<bool> {
        Ok(subscribers::add(&mut *self.subscribers.write().await, chat_id, username))
    }

    async fn remove(&self, chat_id: &str) -> Result<bool> {
        Ok(subscribers::remove(&mut *self.subscribers.write().await, chat_id))
    }

    async fn get(&self, chat_id: &str) -> Result<Option<Subscriber>> {
        Ok(self.subscribers.read().await.get(chat_id).cloned())
    }

    async fn active_chat_ids(&self) -> Result<Vec<String>> {
        Ok(subscribers::active_chat_ids(&*self.subscribers.read().await))
    }

    async fn mark_daily_sent(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()> {
        subscribers::mark(&mut *self.subscribers.write().await, chat_id, subscribers::daily(at));
        Ok(())
    }

    async fn mark_alert_sent(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()> {
        subscribers::mark(&mut *self.subscribers.write().await, chat_id, subscribers::alert(at));
        Ok(())
    }

    async fn counts(&self) -> Result<SubscriberCounts> {
        Ok(subscribers::counts(&*self.subscribers.read().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_alert_store_round_trip() {
        let store = MemoryAlertStore::new();
        assert!(store.get("^GSPC").await.unwrap().is_none());

        let state = AlertState::new(Some(dec!(10)), Utc::now());
        store.set("^GSPC", &state).await.unwrap();

        assert_eq!(store.get("^GSPC").await.unwrap(), Some(state));
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_lifecycle() {
        let store = MemorySubscriberStore::new();

        assert!(store.add("123", Some("alice".into())).await.unwrap());
        assert!(!store.add("123", None).await.unwrap());
        assert!(store.is_active("123").await.unwrap());

        assert!(store.remove("123").await.unwrap());
        assert!(!store.remove("123").await.unwrap());
        assert!(!store.is_active("123").await.unwrap());

        // reactivation keeps the record
        assert!(store.add("123", None).await.unwrap());
        let sub = store.get("123").await.unwrap().unwrap();
        assert_eq!(sub.username.as_deref(), Some("alice"));

        assert_eq!(store.counts().await.unwrap(), SubscriberCounts { total: 1, active: 1 });
    }

    #[tokio::test]
    async fn test_migrate_and_mark() {
        let store = MemorySubscriberStore::new();
        let ids = vec!["1".to_string(), "2".to_string()];

        assert_eq!(store.migrate_chat_ids(&ids).await.unwrap(), 2);
        assert_eq!(store.migrate_chat_ids(&ids).await.unwrap(), 0);
        assert_eq!(store.active_chat_ids().await.unwrap(), ids);

        let now = Utc::now();
        store.mark_alert_sent("1", now).await.unwrap();
        store.mark_daily_sent("unknown", now).await.unwrap();

        let sub = store.get("1").await.unwrap().unwrap();
        assert_eq!(sub.last_alert_sent, Some(now));
        assert_eq!(sub.last_daily_sent, None);
    }
}
