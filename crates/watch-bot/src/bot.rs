//! Command Loop
//!
//! Long-polls the update feed, dispatches each command through the registry
//! and sends the reply back to the chat it came from.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use index_watch::{CommandRegistry, IncomingMessage, Notifier, Result, UpdateSource};

/// Pause after a failed poll
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// How often stale cooldown entries are dropped
const LIMITER_SWEEP_EVERY: Duration = Duration::from_secs(3600);
const LIMITER_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

pub struct CommandLoop {
    updates: Arc<dyn UpdateSource>,
    registry: Arc<CommandRegistry>,
    notifier: Arc<dyn Notifier>,

    /// Next update id to ask for
    offset: i64,
}

impl CommandLoop {
    pub fn new(
        updates: Arc<dyn UpdateSource>,
        registry: Arc<CommandRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            updates,
            registry,
            notifier,
            offset: 0,
        }
    }

    pub const fn offset(&self) -> i64 {
        self.offset
    }

    async fn handle(&self, message: &IncomingMessage) {
        // updates without a chat (membership changes and the like)
        if message.chat_id.is_empty() {
            return;
        }
        let Some(reply) = self.registry.dispatch(message, Utc::now()).await else {
            return;
        };
        if let Err(e) = self.notifier.send(&message.chat_id, &reply).await {
            tracing::warn!(chat_id = %message.chat_id, error = %e, "Failed to send reply");
        }
    }

    /// Move the offset past updates queued before startup without answering
    /// them; returns how many were dropped
    pub async fn skip_pending(&mut self) -> Result<usize> {
        let stale = self.updates.pending().await?;
        for message in &stale {
            self.offset = self.offset.max(message.update_id + 1);
        }
        Ok(stale.len())
    }

    /// One poll; returns how many updates were consumed
    pub async fn poll_once(&mut self) -> Result<usize> {
        let messages = self.updates.poll(self.offset).await?;
        for message in &messages {
            self.offset = self.offset.max(message.update_id + 1);
            self.handle(message).await;
        }
        Ok(messages.len())
    }

    /// Poll forever, backing off after errors
    pub async fn run(mut self) {
        tracing::info!(commands = self.registry.len(), "Command loop started");
        match self.skip_pending().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, offset = self.offset(), "Dropped pending updates"),
            Err(e) => tracing::warn!(error = %e, "Could not drop pending updates"),
        }
        let mut last_sweep = Instant::now();

        loop {
            match self.poll_once().await {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, offset = self.offset(), "Processed updates"),
                Err(e) => {
                    tracing::warn!(error = %e, "Polling failed, backing off");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }

            if last_sweep.elapsed() >= LIMITER_SWEEP_EVERY {
                let removed = self.registry.limiter().cleanup(LIMITER_MAX_AGE, Utc::now());
                tracing::debug!(removed, "Swept command cooldowns");
                last_sweep = Instant::now();
            }
        }
    }
}
