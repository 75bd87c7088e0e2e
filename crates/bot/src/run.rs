// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level bridge runner: wiring, startup order, and ordered shutdown.

use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use teloxide::Bot;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::chat::ChatTransport;
use crate::commands::CommandRouter;
use crate::config::Config;
use crate::event::{MessageTask, NewMessage};
use crate::hub::Hub;
use crate::monitor::{MonitorConfig, TranscriptMonitor};
use crate::mux::Mux;
use crate::notify::NotifyFilter;
use crate::offsets::OffsetStore;
use crate::pane::PaneClassifier;
use crate::poller::StatusPoller;
use crate::queue::{DeliveryConfig, PendingTools, UserQueues};
use crate::session_map::SessionMap;
use crate::skills::Skills;
use crate::telegram::TelegramTransport;

fn init_logging(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    if let Err(e) = result {
        eprintln!("logging init failed: {e}");
    }
}

/// Start the bridge and run until SIGINT/SIGTERM.
///
/// Startup is fail-fast: unreachable tmux, an unwritable config directory,
/// or invalid configuration abort before anything is spawned. Shutdown is
/// ordered: producers (monitor, poller) stop first, then the per-user
/// workers drain within their budget.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_logging(&config);

    let config_dir = config.config_dir();
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("cannot create config dir {}", config_dir.display()))?;

    let mux = Mux::new(&config.tmux_session);
    mux.ensure_session().await.context("cannot reach the tmux server")?;

    let hub = Arc::new(Hub::load(config.state_path())?);
    let live = mux.list_windows().await?;
    hub.resolve_stale_ids(&live)?;

    let store = Arc::new(Mutex::new(OffsetStore::load(config.monitor_state_path())?));
    let filter = NotifyFilter::load_or_create(config.notify_path())?;
    let skills = Skills::load(&config.skills_path())?;
    info!(skills = skills.len(), windows = live.len(), "state loaded");

    let token = config.token.clone().context("missing bot token")?;
    let bot = Bot::new(token);
    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramTransport::new(bot.clone()));

    let pending = Arc::new(PendingTools::new());
    let queues = Arc::new(UserQueues::new(
        Arc::clone(&transport),
        Arc::clone(&pending),
        DeliveryConfig::default(),
    ));
    let router = Arc::new(CommandRouter::new(
        Arc::clone(&hub),
        mux.clone(),
        Arc::clone(&queues),
        Arc::clone(&transport),
        skills,
        config.agent_command.clone(),
    ));

    let shutdown = CancellationToken::new();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let monitor = TranscriptMonitor::new(
        MonitorConfig {
            session_map_path: config.session_map_path(),
            tmux_session: config.tmux_session.clone(),
            poll_interval: config.poll_interval(),
            projects_root: crate::monitor::default_projects_root(),
        },
        Arc::clone(&store),
        event_tx,
    );
    let monitor_task = tokio::spawn(monitor.run(shutdown.child_token()));

    let poller = StatusPoller::new(
        Arc::clone(&hub),
        mux.clone(),
        Arc::clone(&queues),
        Arc::clone(&router),
        PaneClassifier::new()?,
        config.status_poll_interval(),
    );
    let poller_task = tokio::spawn(poller.run(shutdown.child_token()));

    let dispatch_task = tokio::spawn(dispatch_events(
        event_rx,
        Arc::clone(&hub),
        Arc::clone(&queues),
        Arc::clone(&pending),
        Arc::clone(&store),
        filter,
        config.session_map_path(),
        config.tmux_session.clone(),
    ));

    let allowed = config.allowed_user_ids()?;
    let bot_loop = crate::telegram::run_dispatcher(bot, router, allowed);

    tokio::select! {
        _ = bot_loop => {
            warn!("telegram dispatcher exited");
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    // Producers first, then the event fan-out, then the workers drain.
    shutdown.cancel();
    let _ = monitor_task.await;
    let _ = poller_task.await;
    let _ = dispatch_task.await;
    queues.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = async {
            match sigterm {
                Some(ref mut s) => { s.recv().await; }
                None => std::future::pending().await,
            }
        } => {}
    }
}

/// Fan monitor events out to subscribers: resolve the session to bound
/// topics, apply the notification filter, render, enqueue, and advance each
/// subscriber's read cursor. Ends when the monitor drops its sender.
#[allow(clippy::too_many_arguments)]
async fn dispatch_events(
    mut rx: mpsc::UnboundedReceiver<NewMessage>,
    hub: Arc<Hub>,
    queues: Arc<UserQueues>,
    pending: Arc<PendingTools>,
    store: Arc<Mutex<OffsetStore>>,
    filter: NotifyFilter,
    session_map_path: std::path::PathBuf,
    tmux_session: String,
) {
    while let Some(msg) = rx.recv().await {
        let map = match SessionMap::load(&session_map_path) {
            Ok(map) => map,
            Err(e) => {
                warn!("session map unreadable during dispatch: {e:#}");
                continue;
            }
        };

        // Keep the hub's window view current with what the hook wrote.
        if let Some(window_id) = map.window_for_session(&tmux_session, &msg.agent_session_id) {
            if let Some(entry) = map.get(&tmux_session, window_id) {
                hub.sync_window(window_id, &entry.session_id, &entry.cwd, &entry.window_name);
            }
        }

        let subscribers = hub.find_subscribers(&map, &tmux_session, &msg.agent_session_id);
        if subscribers.is_empty() {
            continue;
        }

        let has_pending_pair =
            msg.tool_use_id.as_deref().map(|id| pending.contains(id)).unwrap_or(false);
        if !filter.allows(msg.content_type, has_pending_pair) {
            continue;
        }

        let text = crate::chat::render_message(&msg);
        let delivered_offset =
            store.lock().offset(&msg.agent_session_id).unwrap_or(0);

        for sub in subscribers {
            let mut task = MessageTask::content(
                &sub.window_id,
                sub.chat_id,
                sub.topic_id,
                msg.content_type,
                text.clone(),
            );
            task.tool_use_id = msg.tool_use_id.clone();
            queues.enqueue_content(sub.user_id, task);
            hub.advance_cursor(sub.user_id, &sub.window_id, delivered_offset);
        }
    }
}
