//! Command System
//!
//! Chat commands are registered at startup and dispatched by name.
//! The registry enforces per-chat cooldowns and turns handler errors into
//! short user-facing replies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::ports::IncomingMessage;
use crate::rate_limit::{RateLimiter, format_wait};

/// A parsed `/name[@bot] args…` message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Lowercased, without the slash or bot mention
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    /// `None` for anything that isn't a command
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let head = words.next()?.strip_prefix('/')?;
        let name = head.split_once('@').map_or(head, |(name, _bot)| name);

        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_lowercase(),
            args: words.map(String::from).collect(),
        })
    }
}

/// Command metadata
#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub name: &'static str,

    /// One line shown in the help text
    pub description: &'static str,

    /// Minimum time between two runs from the same chat
    pub cooldown: Option<Duration>,

    /// Left out of the help text
    pub hidden: bool,
}

impl CommandSpec {
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            cooldown: None,
            hidden: false,
        }
    }

    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Everything a handler knows about the request
#[derive(Clone, Debug)]
pub struct CommandContext {
    pub chat_id: String,
    pub username: Option<String>,
    pub command: Command,
    pub received_at: DateTime<Utc>,
}

/// Implement to add a chat command
#[async_trait]
pub trait BotCommand: Send + Sync {
    fn spec(&self) -> CommandSpec;

    /// HTML reply for the originating chat
    async fn execute(&self, ctx: &CommandContext) -> Result<String>;
}

/// Registry of available commands
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn BotCommand>>,
    order: Vec<String>,
    limiter: RateLimiter,
    title: String,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new("📈 <b>Index Watch</b>")
    }
}

impl CommandRegistry {
    /// `title` heads the help text
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            commands: HashMap::new(),
            order: Vec::new(),
            limiter: RateLimiter::new(),
            title: title.into(),
        }
    }

    pub fn register<T: BotCommand + 'static>(&mut self, command: T) {
        self.register_arc(Arc::new(command));
    }

    pub fn register_arc(&mut self, command: Arc<dyn BotCommand>) {
        let name = command.spec().name.to_string();
        if self.commands.insert(name.clone(), command).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BotCommand>> {
        self.commands.get(name).cloned()
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Title plus one line per visible command
    pub fn help_text(&self) -> String {
        let mut text = format!("{}\n\n<b>Commands:</b>\n", self.title);
        for spec in self.order.iter().filter_map(|n| self.commands.get(n)).map(|c| c.spec()) {
            if !spec.hidden {
                text.push_str(&format!("• /{}: {}\n", spec.name, spec.description));
            }
        }
        text.push_str("\n<i>Use /subscribe to start receiving notifications!</i>");
        text
    }

    /// Reply for one incoming message, `None` when it isn't a command.
    ///
    /// `/start`, `/help` and unknown commands get the help text unless a
    /// handler is registered under that name.
    pub async fn dispatch(&self, message: &IncomingMessage, now: DateTime<Utc>) -> Option<String> {
        let command = Command::parse(&message.text)?;

        let Some(handler) = self.get(&command.name) else {
            if command.name != "start" && command.name != "help" {
                tracing::debug!(chat_id = %message.chat_id, command = %command.name, "Unknown command");
            }
            return Some(self.help_text());
        };

        let spec = handler.spec();
        let wait = spec
            .cooldown
            .and_then(|cooldown| self.limiter.check(&message.chat_id, spec.name, cooldown, now));
        if let Some(remaining) = wait {
            return Some(format!(
                "⏱ Please wait {} before using /{} again.",
                format_wait(remaining),
                spec.name
            ));
        }

        let ctx = CommandContext {
            chat_id: message.chat_id.clone(),
            username: message.username.clone(),
            command,
            received_at: now,
        };

        tracing::info!(chat_id = %ctx.chat_id, command = spec.name, "Handling command");
        match handler.execute(&ctx).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                if e.is_bug() {
                    tracing::error!(chat_id = %ctx.chat_id, command = spec.name, error = %e, "Command failed");
                } else {
                    tracing::warn!(chat_id = %ctx.chat_id, command = spec.name, error = %e, "Command failed");
                }
                Some(format!("❌ {}", e.user_message()))
            }
        }
    }
}
