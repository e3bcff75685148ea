// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification dispatcher
//!
//! Tells the user how their job ended on every channel they gave us. Each
//! channel is independent: a failed send is logged and never reaches the
//! job's status or another channel.

use sq_adapters::{Channel, ChatChannel, Notice, NotifyTransport};
use sq_core::{FailureReason, Job, JobId, Resolution};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const COMPLETE_SUBJECT: &str = "Processing Done";
pub const FAILED_SUBJECT: &str = "Processing Failed";

/// Which channels a dispatch reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: Vec<Channel>,
    pub failed: Vec<Channel>,
    /// A chat target was set but this process does not own the chat channel
    pub suppressed_chat: bool,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    email: Arc<dyn NotifyTransport>,
    push: Arc<dyn NotifyTransport>,
    chat: Arc<dyn ChatChannel>,
    website_url: String,
    interactive: bool,
}

impl NotificationDispatcher {
    pub fn new(
        email: Arc<dyn NotifyTransport>,
        push: Arc<dyn NotifyTransport>,
        chat: Arc<dyn ChatChannel>,
        website_url: impl Into<String>,
        interactive: bool,
    ) -> Self {
        Self { email, push, chat, website_url: website_url.into(), interactive }
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    pub fn view_url(&self, job_id: &JobId) -> String {
        view_url(&self.website_url, job_id)
    }

    pub fn notice(&self, job_id: &JobId, resolution: &Resolution) -> Notice {
        match resolution {
            Resolution::Complete => Notice {
                job_id: job_id.clone(),
                subject: COMPLETE_SUBJECT.to_string(),
                body: format!(
                    "I have processed your data. You can go to {} to view and download your track.",
                    self.view_url(job_id)
                ),
            },
            Resolution::Failed(reason) => Notice {
                job_id: job_id.clone(),
                subject: FAILED_SUBJECT.to_string(),
                body: format!(
                    "I could not process your data with the upload ID {}: {}.",
                    job_id,
                    describe(reason)
                ),
            },
        }
    }

    /// Send the terminal notice for `job` on each of its configured channels.
    pub async fn notify(&self, job: &Job, resolution: &Resolution) -> Delivery {
        let notice = self.notice(&job.id, resolution);
        let targets = &job.notify_targets;
        let mut delivery = Delivery::default();

        let transports = [(&targets.email, &self.email), (&targets.push, &self.push)];
        for (recipient, transport) in transports {
            let Some(recipient) = recipient else { continue };
            let channel = transport.channel();
            match transport.send(recipient, &notice).await {
                Ok(()) => delivery.delivered.push(channel),
                Err(e) => {
                    warn!(job_id = %job.id, %channel, error = %e, "notification not delivered");
                    delivery.failed.push(channel);
                }
            }
        }

        if let Some(chat_id) = &targets.chat_id {
            if !self.interactive {
                debug!(job_id = %job.id, "chat channel owned by another worker, skipping");
                delivery.suppressed_chat = true;
            } else {
                match self.chat.send_message(chat_id, &notice.body).await {
                    Ok(()) => delivery.delivered.push(Channel::Chat),
                    Err(e) => {
                        warn!(job_id = %job.id, channel = %Channel::Chat, error = %e, "notification not delivered");
                        delivery.failed.push(Channel::Chat);
                    }
                }
            }
        }

        info!(
            job_id = %job.id,
            delivered = delivery.delivered.len(),
            failed = delivery.failed.len(),
            "user notified"
        );
        delivery
    }
}

/// Page where the user views and downloads the track of `job_id`.
pub fn view_url(website_url: &str, job_id: &JobId) -> String {
    format!("{}/view?uploadid={}", website_url.trim_end_matches('/'), job_id)
}

/// User-facing explanation of a failed job.
pub(crate) fn describe(reason: &FailureReason) -> String {
    match reason {
        FailureReason::NavigationDataUnavailable { .. } => {
            "the satellite navigation data for your recording is not available".to_string()
        }
        FailureReason::Positioning { snapshot, kind } => {
            format!("snapshot {} could not be positioned ({})", snapshot, kind)
        }
        FailureReason::NoEstimates => "none of your snapshots could be positioned".to_string(),
        FailureReason::Rejected { message } => message.clone(),
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
