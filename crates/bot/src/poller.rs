// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Low-rate status polling over bound windows.
//!
//! Once a second, every bound window's pane is captured and classified.
//! Status lines become (deduplicated) status updates, going idle clears the
//! displayed status, and an interactive dialog suppresses status traffic
//! while it is on screen. A window missing from the live multiplexer is an
//! external kill and triggers unbinding.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::commands::CommandRouter;
use crate::error::ErrorKind;
use crate::event::{ContentType, MessageTask};
use crate::hub::Hub;
use crate::mux::Mux;
use crate::pane::{PaneClassifier, PaneView};
use crate::queue::UserQueues;

/// Last classified state per (user, window).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Status(String),
    Prompt(String),
}

/// Work the transition decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    SendStatus(String),
    ClearStatus,
    AnnouncePrompt(String),
}

/// Pure transition: previous state × new pane view → next state + actions.
pub fn transition(prev: &PollState, view: PaneView) -> (PollState, Vec<PollAction>) {
    match view {
        PaneView::Prompt(prompt) => {
            let mut actions = Vec::new();
            if matches!(prev, PollState::Status(_)) {
                actions.push(PollAction::ClearStatus);
            }
            let changed = !matches!(prev, PollState::Prompt(c) if *c == prompt.content);
            if changed {
                actions.push(PollAction::AnnouncePrompt(prompt.content.clone()));
            }
            (PollState::Prompt(prompt.content), actions)
        }
        PaneView::Status(phrase) => {
            let actions = if matches!(prev, PollState::Status(p) if *p == phrase) {
                Vec::new()
            } else {
                vec![PollAction::SendStatus(phrase.clone())]
            };
            (PollState::Status(phrase), actions)
        }
        PaneView::Idle => {
            let actions = if matches!(prev, PollState::Status(_)) {
                vec![PollAction::ClearStatus]
            } else {
                Vec::new()
            };
            (PollState::Idle, actions)
        }
    }
}

pub struct StatusPoller {
    hub: Arc<Hub>,
    mux: Mux,
    queues: Arc<UserQueues>,
    router: Arc<CommandRouter>,
    classifier: PaneClassifier,
    interval: Duration,
    states: HashMap<(u64, String), PollState>,
}

impl StatusPoller {
    pub fn new(
        hub: Arc<Hub>,
        mux: Mux,
        queues: Arc<UserQueues>,
        router: Arc<CommandRouter>,
        classifier: PaneClassifier,
        interval: Duration,
    ) -> Self {
        Self { hub, mux, queues, router, classifier, interval, states: HashMap::new() }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.tick().await;
        }
    }

    async fn tick(&mut self) {
        for sub in self.hub.bound_windows() {
            let pane = match self.mux.capture_pane(&sub.window_id, false).await {
                Ok(pane) => pane,
                Err(e) if crate::error::classify(&e) == ErrorKind::NotFound => {
                    debug!(window_id = %sub.window_id, "window vanished, unbinding");
                    self.states.remove(&(sub.user_id, sub.window_id.clone()));
                    self.router.window_gone(sub.user_id, sub.chat_id, sub.topic_id).await;
                    continue;
                }
                Err(e) => {
                    debug!(window_id = %sub.window_id, "capture failed: {e:#}");
                    continue;
                }
            };

            let key = (sub.user_id, sub.window_id.clone());
            let prev = self.states.remove(&key).unwrap_or_default();
            let (next, actions) = transition(&prev, self.classifier.classify(&pane));
            self.states.insert(key, next);

            for action in actions {
                match action {
                    PollAction::SendStatus(phrase) => self.queues.enqueue_status_update(
                        sub.user_id,
                        MessageTask::status_update(
                            &sub.window_id,
                            sub.chat_id,
                            sub.topic_id,
                            phrase,
                        ),
                    ),
                    PollAction::ClearStatus => self.queues.enqueue_status_clear(
                        sub.user_id,
                        MessageTask::status_clear(&sub.window_id, sub.chat_id, sub.topic_id),
                    ),
                    PollAction::AnnouncePrompt(content) => {
                        // The inline-keyboard rendering of prompts lives in
                        // an external subsystem; the bridge relays the text.
                        self.queues.enqueue_content(
                            sub.user_id,
                            MessageTask::content(
                                &sub.window_id,
                                sub.chat_id,
                                sub.topic_id,
                                ContentType::InteractivePrompt,
                                content,
                            ),
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
