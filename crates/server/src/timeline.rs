// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only ring of recent desktop activity.
//!
//! User interactions and side-effect summaries from non-main agents land
//! here; the next main-agent prompt drains everything since the previous
//! drain into a compact "recent interactions" block. Entries older than the
//! ring capacity are silently dropped.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::protocol::{InteractionKind, OsAction, UserInteraction};

const TIMELINE_CAPACITY: usize = 200;
const SUMMARY_MAX_CHARS: usize = 100;

/// One timeline entry.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    User { interaction: UserInteraction },
    Ai { role: String, summary: String, actions: Vec<OsAction>, window_id: Option<String> },
}

impl TimelineEntry {
    /// One-line rendering for the prompt block.
    pub fn describe(&self) -> String {
        match self {
            Self::User { interaction } => format!("[user] {}", interaction.describe()),
            Self::Ai { role, summary, actions, .. } => {
                if actions.is_empty() {
                    format!("[{role}] {summary}")
                } else {
                    let kinds: Vec<&str> = actions.iter().map(|a| a.kind_str()).collect();
                    format!("[{role}] {summary} (actions: {})", kinds.join(", "))
                }
            }
        }
    }
}

struct TimelineState {
    entries: VecDeque<(u64, TimelineEntry)>,
    total_pushed: u64,
    drained_upto: u64,
}

/// Ring of (user interaction, agent side-effect) entries with drain
/// semantics: each drain returns only entries newer than the previous drain.
pub struct InteractionTimeline {
    state: Mutex<TimelineState>,
    capacity: usize,
}

impl Default for InteractionTimeline {
    fn default() -> Self {
        Self::new(TIMELINE_CAPACITY)
    }
}

impl InteractionTimeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(TimelineState {
                entries: VecDeque::new(),
                total_pushed: 0,
                drained_upto: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Record a user interaction. `draw` is skipped — it travels out-of-band
    /// as an image attachment on the task itself.
    pub fn push_user(&self, interaction: UserInteraction) {
        if interaction.kind == InteractionKind::Draw {
            return;
        }
        self.push(TimelineEntry::User { interaction });
    }

    /// Record an agent-emitted action summary.
    pub fn push_ai(
        &self,
        role: impl Into<String>,
        summary: &str,
        actions: Vec<OsAction>,
        window_id: Option<String>,
    ) {
        let summary: String = summary.chars().take(SUMMARY_MAX_CHARS).collect();
        self.push(TimelineEntry::Ai { role: role.into(), summary, actions, window_id });
    }

    fn push(&self, entry: TimelineEntry) {
        let mut state = self.state.lock();
        let index = state.total_pushed;
        state.total_pushed += 1;
        state.entries.push_back((index, entry));
        if state.entries.len() > self.capacity {
            state.entries.pop_front();
        }
    }

    /// Return entries pushed since the last drain and mark them consumed.
    pub fn drain_for_main(&self) -> Vec<TimelineEntry> {
        let mut state = self.state.lock();
        let since = state.drained_upto;
        state.drained_upto = state.total_pushed;
        state
            .entries
            .iter()
            .filter(|(index, _)| *index >= since)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.drained_upto = state.total_pushed;
    }
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod tests;
