// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::pane::{PaneView, PromptKind, PromptView};

use super::{transition, PollAction, PollState};

fn prompt(content: &str) -> PaneView {
    PaneView::Prompt(PromptView { kind: PromptKind::Permission, content: content.to_owned() })
}

#[test]
fn idle_to_status_sends_an_update() {
    let (next, actions) = transition(&PollState::Idle, PaneView::Status("Thinking…".into()));
    assert_eq!(next, PollState::Status("Thinking…".into()));
    assert_eq!(actions, vec![PollAction::SendStatus("Thinking…".into())]);
}

#[test]
fn unchanged_status_is_quiet() {
    let prev = PollState::Status("Thinking…".into());
    let (_, actions) = transition(&prev, PaneView::Status("Thinking…".into()));
    assert!(actions.is_empty());
}

#[test]
fn changed_status_reissues() {
    let prev = PollState::Status("Reading…".into());
    let (_, actions) = transition(&prev, PaneView::Status("Writing…".into()));
    assert_eq!(actions, vec![PollAction::SendStatus("Writing…".into())]);
}

#[test]
fn status_to_idle_clears() {
    let prev = PollState::Status("Thinking…".into());
    let (next, actions) = transition(&prev, PaneView::Idle);
    assert_eq!(next, PollState::Idle);
    assert_eq!(actions, vec![PollAction::ClearStatus]);
}

#[test]
fn idle_stays_quiet() {
    let (_, actions) = transition(&PollState::Idle, PaneView::Idle);
    assert!(actions.is_empty());
}

#[test]
fn prompt_clears_status_and_announces_once() {
    let prev = PollState::Status("Thinking…".into());
    let (next, actions) = transition(&prev, prompt("1. Yes\n2. No"));
    assert_eq!(next, PollState::Prompt("1. Yes\n2. No".into()));
    assert_eq!(
        actions,
        vec![PollAction::ClearStatus, PollAction::AnnouncePrompt("1. Yes\n2. No".into())]
    );

    // Same dialog on the next tick: silence.
    let (_, actions) = transition(&next, prompt("1. Yes\n2. No"));
    assert!(actions.is_empty());
}

#[test]
fn status_updates_are_suppressed_while_prompting() {
    // The pane shows a prompt; a stale status line underneath must not leak.
    let prev = PollState::Prompt("1. Yes".into());
    let (next, actions) = transition(&prev, prompt("1. Yes"));
    assert_eq!(next, prev);
    assert!(actions.is_empty());
}

#[test]
fn leaving_a_prompt_for_work_resumes_status() {
    let prev = PollState::Prompt("1. Yes".into());
    let (_, actions) = transition(&prev, PaneView::Status("Running…".into()));
    assert_eq!(actions, vec![PollAction::SendStatus("Running…".into())]);
}
