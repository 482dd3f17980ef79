//! Telegram Bot API Transport
//!
//! `sendMessage` (HTML parse mode) as a [`Notifier`] and `getUpdates` long
//! polling as an [`UpdateSource`].

use std::time::Duration;

use async_trait::async_trait;
use index_watch::config::BotToken;
use index_watch::{IncomingMessage, Notifier, UpdateSource};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{FeedError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Telegram rejects longer messages
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    username: Option<String>,
}

pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: BotToken,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(token: BotToken) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, token, Duration::from_secs(30))
    }

    /// `poll_timeout` is the server-side long-poll wait for `getUpdates`
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: BotToken,
        poll_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            // the HTTP timeout must outlast the long poll
            client: crate::http_client(poll_timeout + Duration::from_secs(15))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token.expose())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response = self.client.post(self.method_url(method)).json(&body).send().await?;
        let status = response.status();
        let api: ApiResponse<T> = response.json().await.map_err(|e| {
            FeedError::Status {
                status: status.as_u16(),
                body: e.without_url().to_string(),
            }
        })?;

        if !api.ok {
            return Err(FeedError::Api(format!(
                "{} ({})",
                api.description.unwrap_or_else(|| "unknown error".into()),
                api.error_code.unwrap_or_else(|| i64::from(status.as_u16()))
            )));
        }
        api.result
            .ok_or_else(|| FeedError::Parse(format!("{method}: ok without result")))
    }

    async fn send_chunk(&self, chat_id: &str, text: &str) -> Result<()> {
        self.call::<serde_json::Value>(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }),
        )
        .await
        .map(drop)
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send(&self, recipient: &str, text: &str) -> index_watch::Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            self.send_chunk(recipient, &chunk)
                .await
                .map_err(|e| e.into_delivery(recipient))?;
        }
        tracing::debug!(recipient, "Message sent");
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn poll(&self, offset: i64) -> index_watch::Result<Vec<IncomingMessage>> {
        self.get_updates(offset, self.poll_timeout.as_secs()).await
    }

    /// `offset: -1` returns only the newest update and forgets the rest
    async fn pending(&self) -> index_watch::Result<Vec<IncomingMessage>> {
        self.get_updates(-1, 0).await
    }
}

impl TelegramClient {
    async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> index_watch::Result<Vec<IncomingMessage>> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message"],
                }),
            )
            .await
            .map_err(|e| e.into_provider("telegram"))?;

        // updates without a text message still advance the offset
        Ok(updates
            .into_iter()
            .map(|u| {
                let (chat_id, username, text) = u.message.map_or_else(
                    || (String::new(), None, String::new()),
                    |m| {
                        (
                            m.chat.id.to_string(),
                            m.from.and_then(|f| f.username),
                            m.text.unwrap_or_default(),
                        )
                    },
                );
                IncomingMessage {
                    update_id: u.update_id,
                    chat_id,
                    username,
                    text,
                }
            })
            .collect())
    }
}

/// Split on line boundaries so that each chunk has at most `max_chars`
/// characters. Lines longer than that are cut between characters, never
/// inside an HTML tag or entity unless one is itself longer than a chunk.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current.chars().count() + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current).trim_end().to_string());
        }
        if line_len > max_chars {
            chunks.extend(split_long_line(line, max_chars));
        } else {
            current.push_str(line);
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim_end().to_string());
    }
    chunks
}

fn split_long_line(line: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = line.chars().collect();

    // cut[i]: a chunk may end before chars[i]
    let mut cut = vec![true; chars.len() + 1];
    let mut closing: Option<char> = None;
    for (i, &c) in chars.iter().enumerate() {
        if let Some(end) = closing {
            if c == end {
                cut[i] = false;
                closing = None;
                continue;
            }
            if end == '>' || c.is_ascii_alphanumeric() || c == '#' {
                cut[i] = false;
                continue;
            }
            // a bare `&`, not an entity
            closing = None;
        }
        closing = match c {
            '<' => Some('>'),
            '&' => Some(';'),
            _ => None,
        };
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let limit = (start + max_chars).min(chars.len());
        let end = if limit == chars.len() {
            limit
        } else {
            (start + 1..=limit).rev().find(|&i| cut[i]).unwrap_or(limit)
        };
        pieces.push(chars[start..end].iter().collect());
        start = end;
    }
    pieces
}
