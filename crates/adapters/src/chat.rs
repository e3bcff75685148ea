// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive chat channel
//!
//! Unlike email and push, the chat channel is two-way: users message the bot
//! with an upload id to subscribe, and the bot messages them when the job is
//! done. Only one worker in the fleet may poll it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from the chat channel
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat api error: {description}")]
    Api { description: String },
}

/// An incoming chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUpdate {
    /// Monotonic per-bot update counter, used to acknowledge updates
    pub update_id: i64,
    pub chat_id: String,
    pub text: String,
}

#[async_trait]
pub trait ChatChannel: Send + Sync + 'static {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError>;

    /// Wait up to `timeout` for messages with `update_id >= offset`.
    ///
    /// Passing an offset acknowledges every earlier update.
    async fn poll_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<ChatUpdate>, ChatError>;
}

/// Chat channel used when no bot is configured: sends are logged, nothing is
/// ever received.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChatChannel;

#[async_trait]
impl ChatChannel for LogChatChannel {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        tracing::info!(%chat_id, %text, "no chat bot configured, message dropped");
        Ok(())
    }

    async fn poll_updates(
        &self,
        _offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<ChatUpdate>, ChatError> {
        tokio::time::sleep(timeout).await;
        Ok(Vec::new())
    }
}

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Telegram Bot API client (`sendMessage` and long-polling `getUpdates`).
#[derive(Clone)]
pub struct TelegramChannel {
    client: reqwest::Client,
    /// `{api}/bot{token}`; never logged
    base: String,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel").finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    chat: RawChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<Option<T>, ChatError> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(ChatError::Api {
                description: self.description.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}

fn into_updates(raw: Vec<RawUpdate>) -> Vec<ChatUpdate> {
    raw.into_iter()
        .filter_map(|u| {
            let message = u.message?;
            Some(ChatUpdate {
                update_id: u.update_id,
                chat_id: message.chat.id.to_string(),
                text: message.text?,
            })
        })
        .collect()
}

impl TelegramChannel {
    pub fn new(client: reqwest::Client, token: &str) -> Self {
        Self::with_api_url(client, TELEGRAM_API_URL, token)
    }

    pub fn with_api_url(client: reqwest::Client, api_url: &str, token: &str) -> Self {
        Self { client, base: format!("{}/bot{}", api_url.trim_end_matches('/'), token) }
    }
}

#[async_trait]
impl ChatChannel for TelegramChannel {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
        let resp: ApiResponse<serde_json::Value> = self
            .client
            .post(format!("{}/sendMessage", self.base))
            .json(&SendMessage { chat_id, text })
            .send()
            .await?
            .json()
            .await?;
        resp.into_result()?;
        Ok(())
    }

    async fn poll_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<ChatUpdate>, ChatError> {
        let mut query = vec![("timeout", timeout.as_secs().to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        let resp: ApiResponse<Vec<RawUpdate>> = self
            .client
            .get(format!("{}/getUpdates", self.base))
            .query(&query)
            .timeout(timeout + Duration::from_secs(10))
            .send()
            .await?
            .json()
            .await?;
        Ok(into_updates(resp.into_result()?.unwrap_or_default()))
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ChatChannel, ChatError, ChatUpdate};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Recorded outgoing chat message
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentMessage {
        pub chat_id: String,
        pub text: String,
    }

    #[derive(Default)]
    struct FakeChatState {
        sent: Vec<SentMessage>,
        inbox: VecDeque<ChatUpdate>,
        next_update_id: i64,
        failing: bool,
    }

    /// Fake chat channel: tests push incoming messages and read what was sent.
    #[derive(Clone, Default)]
    pub struct FakeChatChannel {
        inner: Arc<Mutex<FakeChatState>>,
        arrived: Arc<Notify>,
    }

    impl FakeChatChannel {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulate a user sending `text` from `chat_id`.
        pub fn receive(&self, chat_id: &str, text: &str) {
            {
                let mut inner = self.inner.lock();
                inner.next_update_id += 1;
                let update_id = inner.next_update_id;
                inner.inbox.push_back(ChatUpdate {
                    update_id,
                    chat_id: chat_id.to_string(),
                    text: text.to_string(),
                });
            }
            self.arrived.notify_one();
        }

        pub fn set_failing(&self, failing: bool) {
            self.inner.lock().failing = failing;
        }

        pub fn sent(&self) -> Vec<SentMessage> {
            self.inner.lock().sent.clone()
        }

        fn take_from(&self, offset: Option<i64>) -> Vec<ChatUpdate> {
            let mut inner = self.inner.lock();
            if let Some(offset) = offset {
                inner.inbox.retain(|u| u.update_id >= offset);
            }
            inner.inbox.iter().cloned().collect()
        }
    }

    #[async_trait]
    impl ChatChannel for FakeChatChannel {
        async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChatError> {
            let mut inner = self.inner.lock();
            if inner.failing {
                return Err(ChatError::Api { description: "bot blocked".to_string() });
            }
            inner.sent.push(SentMessage { chat_id: chat_id.to_string(), text: text.to_string() });
            Ok(())
        }

        async fn poll_updates(
            &self,
            offset: Option<i64>,
            timeout: Duration,
        ) -> Result<Vec<ChatUpdate>, ChatError> {
            let updates = self.take_from(offset);
            if !updates.is_empty() {
                return Ok(updates);
            }
            let _ = tokio::time::timeout(timeout, self.arrived.notified()).await;
            Ok(self.take_from(offset))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeChatChannel, SentMessage};

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
