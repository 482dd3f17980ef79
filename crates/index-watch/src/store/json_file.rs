//! JSON file stores
//!
//! Each store keeps its map in memory and writes the whole map through on
//! every mutation (temp file + rename, so a crash never leaves half a file).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use super::{AlertStateStore, SubscriberCounts, SubscriberStore, subscribers};
use crate::error::{Result, WatchError};
use crate::model::{AlertState, Subscriber};

struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(T::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| self.error("parse", e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(self.error("read", e)),
        }
    }

    async fn save<T: Serialize + Sync>(&self, value: &T) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.error("create directory for", e))?;
        }

        let bytes = serde_json::to_vec_pretty(value).map_err(|e| self.error("encode", e))?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| self.error("write", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.error("replace", e))
    }

    fn error(&self, action: &str, err: impl std::fmt::Display) -> WatchError {
        WatchError::Persistence(format!("{action} {}: {err}", self.path.display()))
    }
}

/// Alert state persisted as `{ "<symbol>": AlertState }`
pub struct JsonFileAlertStore {
    file: JsonFile,
    states: RwLock<HashMap<String, AlertState>>,
}

impl JsonFileAlertStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = JsonFile::new(path.as_ref());
        let states: HashMap<String, AlertState> = file.load().await?;
        tracing::info!(
            path = %path.as_ref().display(),
            symbols = states.len(),
            "Loaded alert state"
        );
        Ok(Self {
            file,
            states: RwLock::new(states),
        })
    }
}

#[async_trait]
impl AlertStateStore for JsonFileAlertStore {
    async fn get(&self, symbol: &str) -> Result<Option<AlertState>> {
        Ok(self.states.read().await.get(symbol).cloned())
    }

    async fn set(&self, symbol: &str, state: &AlertState) -> Result<()> {
        let mut states = self.states.write().await;
        let mut next = states.clone();
        next.insert(symbol.to_string(), state.clone());

        // memory only changes once the file write succeeded
        self.file.save(&next).await?;
        *states = next;
        Ok(())
    }

    async fn all(&self) -> Result<HashMap<String, AlertState>> {
        Ok(self.states.read().await.clone())
    }
}

/// Subscribers persisted as `{ "<chat_id>": Subscriber }`
pub struct JsonFileSubscriberStore {
    file: JsonFile,
    subscribers: RwLock<HashMap<String, Subscriber>>,
}

impl JsonFileSubscriberStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = JsonFile::new(path.as_ref());
        let subscribers: HashMap<String, Subscriber> = file.load().await?;
        tracing::info!(
            path = %path.as_ref().display(),
            subscribers = subscribers.len(),
            "Loaded subscribers"
        );
        Ok(Self {
            file,
            subscribers: RwLock::new(subscribers),
        })
    }

    /// Apply `change` to a copy of the map and persist it if anything changed
    async fn mutate<R>(
        &self,
        change: impl FnOnce(&mut HashMap<String, Subscriber>) -> R,
    ) -> Result<R> {
        let mut current = self.subscribers.write().await;
        let mut next = current.clone();
        let result = change(&mut next);

        if next != *current {
            self.file.save(&next).await?;
            *current = next;
        }
        Ok(result)
    }
}

#[async_trait]
impl SubscriberStore for JsonFileSubscriberStore {
    async fn add(&self, chat_id: &str, username: Option<String>) -> Result<bool> {
        self.mutate(|map| subscribers::add(map, chat_id, username)).await
    }

    async fn remove(&self, chat_id: &str) -> Result<bool> {
        self.mutate(|map| subscribers::remove(map, chat_id)).await
    }

    async fn get(&self, chat_id: &str) -> Result<Option<Subscriber>> {
        Ok(self.subscribers.read().await.get(chat_id).cloned())
    }

    async fn active_chat_ids(&self) -> Result<Vec<String>> {
        Ok(subscribers::active_chat_ids(&*self.subscribers.read().await))
    }

    async fn mark_daily_sent(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.mutate(|map| subscribers::mark(map, chat_id, subscribers::daily(at)))
            .await
            .map(drop)
    }

    async fn mark_alert_sent(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.mutate(|map| subscribers::mark(map, chat_id, subscribers::alert(at)))
            .await
            .map(drop)
    }

    async fn counts(&self) -> Result<SubscriberCounts> {
        Ok(subscribers::counts(&*self.subscribers.read().await))
    }
}
