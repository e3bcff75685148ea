// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound notification transports (email and push)

use async_trait::async_trait;
use serde::Serialize;
use sq_core::JobId;
use thiserror::Error;

/// Notification channel a transport delivers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Push,
    Chat,
}

sq_core::simple_display! {
    Channel {
        Email => "email",
        Push => "push",
        Chat => "chat",
    }
}

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{channel} send failed: {message}")]
    SendFailed { channel: Channel, message: String },

    #[error("{channel} request failed: {source}")]
    Http {
        channel: Channel,
        #[source]
        source: reqwest::Error,
    },
}

/// A message telling a user what happened to their job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub job_id: JobId,
    pub subject: String,
    pub body: String,
}

/// Delivers notices to one kind of recipient (an address, a push token).
#[async_trait]
pub trait NotifyTransport: Send + Sync + 'static {
    fn channel(&self) -> Channel;

    async fn send(&self, recipient: &str, notice: &Notice) -> Result<(), NotifyError>;
}

/// Transport used when a channel has no relay configured: the notice is
/// only logged.
#[derive(Debug, Clone, Copy)]
pub struct LogTransport {
    channel: Channel,
}

impl LogTransport {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl NotifyTransport for LogTransport {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, recipient: &str, notice: &Notice) -> Result<(), NotifyError> {
        tracing::info!(
            channel = %self.channel,
            job_id = %notice.job_id,
            %recipient,
            subject = %notice.subject,
            "no transport configured, notice dropped"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    channel: Channel,
    recipient: &'a str,
    #[serde(flatten)]
    notice: &'a Notice,
}

/// Posts each notice as JSON to a relay service (mail gateway, web-push
/// sender).
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
    channel: Channel,
}

impl WebhookTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>, channel: Channel) -> Self {
        Self { client, url: url.into(), channel }
    }
}

#[async_trait]
impl NotifyTransport for WebhookTransport {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, recipient: &str, notice: &Notice) -> Result<(), NotifyError> {
        let channel = self.channel;
        let payload = WebhookPayload { channel, recipient, notice };
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| NotifyError::Http { channel, source })?;
        tracing::debug!(%channel, job_id = %notice.job_id, "notice relayed");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{Channel, Notice, NotifyError, NotifyTransport};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded notice
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentNotice {
        pub recipient: String,
        pub notice: Notice,
    }

    struct FakeTransportState {
        sent: Vec<SentNotice>,
        failing: bool,
    }

    /// Fake transport for testing
    #[derive(Clone)]
    pub struct FakeTransport {
        channel: Channel,
        inner: Arc<Mutex<FakeTransportState>>,
    }

    impl FakeTransport {
        pub fn new(channel: Channel) -> Self {
            Self {
                channel,
                inner: Arc::new(Mutex::new(FakeTransportState { sent: Vec::new(), failing: false })),
            }
        }

        /// Make every send fail
        pub fn set_failing(&self, failing: bool) {
            self.inner.lock().failing = failing;
        }

        pub fn sent(&self) -> Vec<SentNotice> {
            self.inner.lock().sent.clone()
        }
    }

    #[async_trait]
    impl NotifyTransport for FakeTransport {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, recipient: &str, notice: &Notice) -> Result<(), NotifyError> {
            let mut inner = self.inner.lock();
            if inner.failing {
                return Err(NotifyError::SendFailed {
                    channel: self.channel,
                    message: "transport down".to_string(),
                });
            }
            inner.sent.push(SentNotice { recipient: recipient.to_string(), notice: notice.clone() });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTransport, SentNotice};

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
