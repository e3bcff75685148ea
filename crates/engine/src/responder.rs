// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive chat responder
//!
//! Runs only on the worker that owns the chat channel. Users message the bot
//! with their upload id; the bot answers with the job's status and, for jobs
//! not finished yet, subscribes the chat to the completion message.

use crate::dispatcher::{describe, view_url};
use chrono::NaiveDate;
use sq_adapters::ChatChannel;
use sq_core::{Clock, Job, JobId, JobStatus, SystemClock};
use sq_storage::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub const INVALID_ID_REPLY: &str = "Hi, if you send me a valid upload ID, then I will keep you \
    updated about the processing of your data.\nWhat you sent me is not a valid ID. An ID \
    contains only letters, numbers, '-' and '_'.";
pub const STORE_DOWN_REPLY: &str = "I am sorry, but I could not connect to my database. \
    Please try again later.";

pub struct Responder<S, C = SystemClock> {
    store: S,
    chat: Arc<dyn ChatChannel>,
    website_url: String,
    poll_timeout: Duration,
    clock: C,
}

impl<S: JobStore> Responder<S, SystemClock> {
    pub fn new(store: S, chat: Arc<dyn ChatChannel>, website_url: impl Into<String>) -> Self {
        Self::with_clock(store, chat, website_url, SystemClock)
    }
}

impl<S: JobStore, C: Clock> Responder<S, C> {
    pub fn with_clock(
        store: S,
        chat: Arc<dyn ChatChannel>,
        website_url: impl Into<String>,
        clock: C,
    ) -> Self {
        Self {
            store,
            chat,
            website_url: website_url.into(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            clock,
        }
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Answer incoming messages until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("chat responder started");
        let mut offset = None;
        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.chat.poll_updates(offset, self.poll_timeout) => polled,
            };
            let updates = match polled {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "chat poll failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => continue,
                    }
                }
            };
            for update in updates {
                offset = Some(update.update_id + 1);
                let reply = self.reply(&update.chat_id, &update.text).await;
                if let Err(e) = self.chat.send_message(&update.chat_id, &reply).await {
                    warn!(chat_id = %update.chat_id, error = %e, "chat reply not delivered");
                }
            }
        }
        info!("chat responder stopped");
    }

    /// Build the answer to `text` received from `chat_id`, registering the
    /// chat for the completion message when the job is still pending.
    pub async fn reply(&self, chat_id: &str, text: &str) -> String {
        let Some(id) = parse_job_id(text) else {
            return INVALID_ID_REPLY.to_string();
        };
        let job = match self.store.get(&id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return format!(
                    "I am sorry, but I could not find your upload ID '{}' in my database. \
                     Please double check your ID and try again.",
                    id
                );
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "status lookup failed");
                return STORE_DOWN_REPLY.to_string();
            }
        };
        if let Some(reply) = self.terminal_reply(&job) {
            return reply;
        }

        let mut reply = format!("I have not processed your data with the upload ID {} yet.", id);
        match self.store.set_chat_target(&id, chat_id).await {
            Ok(()) => {
                debug!(job_id = %id, %chat_id, "chat subscribed");
                // The job may have finished before the subscription landed.
                if let Ok(Some(job)) = self.store.get(&id).await {
                    if let Some(reply) = self.terminal_reply(&job) {
                        return reply;
                    }
                }
                reply.push_str(" Once I am done, I will send you a message in this chat.");
            }
            Err(e) => warn!(job_id = %id, error = %e, "could not subscribe chat"),
        }
        if let Some(expected) = job.navigation_requirement().latest_date() {
            reply.push(' ');
            reply.push_str(&expectation(expected, self.clock.utc_now().date_naive()));
        }
        reply
    }

    fn terminal_reply(&self, job: &Job) -> Option<String> {
        match job.status {
            JobStatus::Complete => Some(format!(
                "I have already processed your data. Go to {} to view and download your track.",
                view_url(&self.website_url, &job.id)
            )),
            JobStatus::Failed => Some(format!(
                "I could not process your data with the upload ID {}: {}.",
                job.id,
                job.failure.as_ref().map_or_else(|| "unknown error".to_string(), describe)
            )),
            JobStatus::Waiting | JobStatus::Processing => None,
        }
    }
}

/// Extract an upload id from a chat message (`<id>` or `/start <id>`).
pub fn parse_job_id(text: &str) -> Option<JobId> {
    let text = text.trim();
    let id = text.strip_prefix("/start").map(str::trim).unwrap_or(text);
    let valid = !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| JobId::from(id))
}

/// When the user can expect the result, given the last capture date.
///
/// Navigation data for a day is complete once the day is over.
fn expectation(last_capture: NaiveDate, today: NaiveDate) -> String {
    let ready = last_capture.succ_opt().unwrap_or(last_capture);
    if ready <= today {
        "I expect to process your data later today.".to_string()
    } else if ready.pred_opt() == Some(today) {
        "I expect to process your data tomorrow.".to_string()
    } else {
        format!("I expect to process your data on {}.", ready)
    }
}

#[cfg(test)]
#[path = "responder_tests.rs"]
mod tests;
