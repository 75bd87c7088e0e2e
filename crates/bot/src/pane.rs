// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal-pane classification.
//!
//! The status poller captures each bound window's visible pane and needs to
//! know three things: is the agent showing an interactive dialog, is it
//! working (spinner + phrase status line), or is it idle. Dialog detection
//! is template-driven: each known screen is a pair of delimiter patterns
//! with a minimum number of enclosed lines, and a match extracts the content
//! between them.

use regex::Regex;

/// Interactive dialog families the agent can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    MultiChoice,
    Plan,
    Permission,
    Checkpoint,
    Settings,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultiChoice => "multi_choice",
            Self::Plan => "plan",
            Self::Permission => "permission",
            Self::Checkpoint => "checkpoint",
            Self::Settings => "settings",
        }
    }
}

/// A recognized interactive dialog with its extracted body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptView {
    pub kind: PromptKind,
    pub content: String,
}

/// What a captured pane means to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneView {
    /// An interactive dialog is on screen; status updates are suppressed.
    Prompt(PromptView),
    /// The agent is working; the extracted spinner phrase.
    Status(String),
    Idle,
}

/// `(top delimiter, bottom delimiter, minimum lines between them)`.
struct Template {
    kind: PromptKind,
    top: &'static str,
    bottom: &'static str,
    min_gap: usize,
}

/// Dialog templates, checked in order. Permission is listed before plan
/// because both can show "esc to cancel" footers.
const TEMPLATES: &[Template] = &[
    Template {
        kind: PromptKind::Permission,
        top: r"Do you want to (proceed|allow|make this edit)",
        bottom: r"(tell Claude what to do differently|don't ask again|esc to cancel)",
        min_gap: 1,
    },
    Template {
        kind: PromptKind::Plan,
        top: r"Would you like to proceed\?",
        bottom: r"(keep planning|auto-accept edits)",
        min_gap: 1,
    },
    Template {
        kind: PromptKind::Checkpoint,
        top: r"Restore checkpoint\?",
        bottom: r"(esc to cancel|No, continue from here)",
        min_gap: 1,
    },
    Template {
        kind: PromptKind::Settings,
        top: r"^\s*[│|]?\s*Settings\b",
        bottom: r"(Esc to close|enter to confirm)",
        min_gap: 1,
    },
    Template {
        kind: PromptKind::MultiChoice,
        top: r"^\s*[│|]?\s*\?\s+\S",
        bottom: r"(Enter to confirm|enter to select)",
        min_gap: 1,
    },
];

/// Status lines sit near the pane footer: a spinner glyph, a capitalized
/// gerund phrase, and a trailing ellipsis. Token counts and interrupt hints
/// after the phrase are ignored.
const STATUS_PATTERN: &str = r"^\s*[✻✶✳✢·✽\*⠁-⠿]\s+([A-Z][A-Za-z’' -]{1,40}…)";

/// How far up from the bottom the status scan looks.
const STATUS_WINDOW: usize = 12;

struct CompiledTemplate {
    kind: PromptKind,
    top: Regex,
    bottom: Regex,
    min_gap: usize,
}

/// Pane classifier with all templates compiled once.
pub struct PaneClassifier {
    templates: Vec<CompiledTemplate>,
    status: Regex,
}

impl PaneClassifier {
    pub fn new() -> anyhow::Result<Self> {
        let templates = TEMPLATES
            .iter()
            .map(|t| {
                Ok(CompiledTemplate {
                    kind: t.kind,
                    top: Regex::new(t.top)?,
                    bottom: Regex::new(t.bottom)?,
                    min_gap: t.min_gap,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { templates, status: Regex::new(STATUS_PATTERN)? })
    }

    /// Classify a captured pane. Dialogs take priority over status lines:
    /// a permission dialog can sit above a stale spinner line.
    pub fn classify(&self, pane: &str) -> PaneView {
        let lines: Vec<&str> = pane.lines().collect();

        for template in &self.templates {
            if let Some(view) = match_template(template, &lines) {
                return PaneView::Prompt(view);
            }
        }

        if let Some(phrase) = self.extract_status(&lines) {
            return PaneView::Status(phrase);
        }

        PaneView::Idle
    }

    fn extract_status(&self, lines: &[&str]) -> Option<String> {
        let start = lines.len().saturating_sub(STATUS_WINDOW);
        for line in lines[start..].iter().rev() {
            if let Some(caps) = self.status.captures(line) {
                if let Some(phrase) = caps.get(1) {
                    return Some(phrase.as_str().trim_end().to_owned());
                }
            }
        }
        None
    }
}

fn match_template(template: &CompiledTemplate, lines: &[&str]) -> Option<PromptView> {
    let top = lines.iter().position(|l| template.top.is_match(l))?;
    // The bottom delimiter must leave at least min_gap enclosed lines, so
    // matches closer than that are not candidates at all.
    let bottom = lines
        .iter()
        .enumerate()
        .skip(top + 1 + template.min_gap)
        .find(|(_, l)| template.bottom.is_match(l))
        .map(|(i, _)| i)?;

    let content: Vec<String> = lines[top + 1..bottom]
        .iter()
        .map(|l| strip_box_chars(l))
        .filter(|l| !l.is_empty())
        .collect();
    Some(PromptView { kind: template.kind, content: content.join("\n") })
}

/// Drop box-drawing borders and surrounding whitespace from a dialog line.
fn strip_box_chars(line: &str) -> String {
    line.trim_matches(|c: char| c.is_whitespace() || "│┃|╭╮╰╯─═".contains(c)).to_owned()
}

#[cfg(test)]
#[path = "pane_tests.rs"]
mod tests;
