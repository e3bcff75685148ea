// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: connect, run, restart on failure, stop on signal.

use crate::config::Settings;
use anyhow::Context;
use sq_adapters::{
    Channel, ChatChannel, CommandEngine, FsNavigationIndex, LogChatChannel, LogTransport,
    NotifyTransport, TelegramChannel, WebhookTransport,
};
use sq_core::WorkerId;
use sq_engine::{NotificationDispatcher, Reaper, Responder, Worker};
use sq_storage::PgJobStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// First wait before restarting a failed worker loop; doubles on each
/// consecutive failure.
pub const INITIAL_RESTART_DELAY: Duration = Duration::from_secs(60);
pub const MAX_RESTART_DELAY: Duration = Duration::from_secs(60 * 60);
/// A run at least this long counts as healthy and resets the delay.
pub const HEALTHY_RUN: Duration = Duration::from_secs(10 * 60);
const CONNECT_ATTEMPTS: usize = 10;

/// Delay before the next restart of the worker loop.
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    next: Duration,
}

impl Default for RestartBackoff {
    fn default() -> Self {
        Self { next: INITIAL_RESTART_DELAY }
    }
}

impl RestartBackoff {
    /// Delay to wait after a run that failed after `ran_for`.
    pub fn after_failure(&mut self, ran_for: Duration) -> Duration {
        if ran_for >= HEALTHY_RUN {
            self.next = INITIAL_RESTART_DELAY;
        }
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_RESTART_DELAY);
        delay
    }
}

/// Sends fatal worker errors to the operator's chat, if one is configured.
pub struct OperatorReport {
    target: Option<(Arc<dyn ChatChannel>, String)>,
}

impl OperatorReport {
    pub fn new(chat: Option<Arc<dyn ChatChannel>>, chat_id: Option<String>) -> Self {
        Self { target: chat.zip(chat_id) }
    }

    fn from_settings(settings: &Settings, http: &reqwest::Client) -> Self {
        let token = settings.notify.operator_bot_token.as_ref().or(settings.notify.telegram_token.as_ref());
        let chat = token.map(|t| Arc::new(TelegramChannel::new(http.clone(), t)) as Arc<dyn ChatChannel>);
        Self::new(chat, settings.notify.operator_chat_id.clone())
    }

    pub fn message(error: &anyhow::Error, restart_in: Duration) -> String {
        format!(
            "Error during processing:\n\n{:#}\n\nAttempting restart in {} s.",
            error,
            restart_in.as_secs()
        )
    }

    pub async fn report(&self, error: &anyhow::Error, restart_in: Duration) {
        let Some((chat, chat_id)) = &self.target else { return };
        if let Err(e) = chat.send_message(chat_id, &Self::message(error, restart_in)).await {
            warn!(error = %e, "operator report not delivered");
        }
    }
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
pub async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                    _ = term.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot watch SIGTERM, only SIGINT stops the daemon");
                let _ = tokio::signal::ctrl_c().await;
                info!("received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received interrupt");
    }
    info!("shutting down, letting the current batch finish");
    shutdown.cancel();
}

/// Run the worker until `shutdown`, restarting it with backoff on failure.
pub async fn serve(settings: Settings, shutdown: CancellationToken) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("building http client")?;
    let operator = OperatorReport::from_settings(&settings, &http);
    let worker_id = WorkerId::generate();
    let mut backoff = RestartBackoff::default();

    info!(worker = %worker_id, interactive = settings.worker.interactive, "sqd starting");
    loop {
        let started = Instant::now();
        let err = match run_once(&settings, &worker_id, &http, &shutdown).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if shutdown.is_cancelled() {
            return Err(err);
        }

        let delay = backoff.after_failure(started.elapsed());
        error!(error = %format!("{:#}", err), restart_in_secs = delay.as_secs(), "worker loop failed");
        operator.report(&err, delay).await;
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_once(
    settings: &Settings,
    worker_id: &WorkerId,
    http: &reqwest::Client,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    let store = PgJobStore::connect_with_retry(&settings.database_url, settings.pool_size, CONNECT_ATTEMPTS)
        .await
        .context("connecting to the job store")?;

    let chat: Arc<dyn ChatChannel> = match &settings.notify.telegram_token {
        Some(token) => Arc::new(TelegramChannel::new(http.clone(), token)),
        None => Arc::new(LogChatChannel),
    };
    let dispatcher = NotificationDispatcher::new(
        transport(settings.notify.email_relay_url.as_deref(), Channel::Email, http),
        transport(settings.notify.push_relay_url.as_deref(), Channel::Push, http),
        Arc::clone(&chat),
        settings.website_url.clone(),
        settings.worker.interactive,
    );
    let engine = CommandEngine::new(&settings.engine_command)
        .with_args(settings.engine_args.iter().cloned())
        .with_timeout(settings.engine_timeout);
    let worker = Worker::new(
        worker_id.clone(),
        store.clone(),
        FsNavigationIndex::new(&settings.navigation_dir),
        engine,
        dispatcher,
        settings.worker.clone(),
    );

    let run = shutdown.child_token();
    let mut background = JoinSet::new();
    if let Some(stale_after) = settings.reap_after {
        let reaper = Reaper::new(store.clone(), stale_after, Reaper::<PgJobStore>::default_interval(stale_after));
        let token = run.clone();
        background.spawn(async move { reaper.run(token).await });
    }
    if settings.worker.interactive {
        let responder = Responder::new(store.clone(), chat, settings.website_url.clone());
        let token = run.clone();
        background.spawn(async move { responder.run(token).await });
    }

    let result = worker.run(run.clone()).await;
    run.cancel();
    while background.join_next().await.is_some() {}
    result.context("worker loop")
}

fn transport(relay: Option<&str>, channel: Channel, http: &reqwest::Client) -> Arc<dyn NotifyTransport> {
    match relay {
        Some(url) => Arc::new(WebhookTransport::new(http.clone(), url, channel)),
        None => Arc::new(LogTransport::new(channel)),
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
