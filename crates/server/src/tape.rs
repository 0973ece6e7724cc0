// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-by-message conversation log, tagged by source.
//!
//! The tape bootstraps a new window agent with the recent main conversation
//! and restores a session on reconnect. Messages belonging to a closed
//! window are pruned wholesale when its group's agent is disposed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::protocol::epoch_ms;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Which conversation a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    Main,
    Window { id: String },
}

impl Source {
    pub fn window(id: impl Into<String>) -> Self {
        Self::Window { id: id.into() }
    }
}

/// One logged conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
    pub source: Source,
    pub timestamp_ms: u64,
}

/// Append-only conversation log with whole-window pruning.
#[derive(Default)]
pub struct ContextTape {
    messages: Mutex<Vec<ContextMessage>>,
}

impl ContextTape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user(&self, content: impl Into<String>, source: Source) {
        self.append(Role::User, content.into(), source);
    }

    pub fn append_assistant(&self, content: impl Into<String>, source: Source) {
        self.append(Role::Assistant, content.into(), source);
    }

    fn append(&self, role: Role, content: String, source: Source) {
        self.messages.lock().push(ContextMessage {
            role,
            content,
            source,
            timestamp_ms: epoch_ms(),
        });
    }

    /// Remove every message tagged with the given window. Returns how many
    /// were removed; messages from other sources are untouched.
    pub fn prune_window(&self, window_id: &str) -> usize {
        let mut messages = self.messages.lock();
        let before = messages.len();
        messages.retain(|m| !matches!(&m.source, Source::Window { id } if id == window_id));
        before - messages.len()
    }

    /// Replace the tape with a previously captured sequence.
    pub fn restore(&self, restored: Vec<ContextMessage>) {
        *self.messages.lock() = restored;
    }

    /// The last `count` messages, oldest first.
    pub fn recent(&self, count: usize) -> Vec<ContextMessage> {
        let messages = self.messages.lock();
        let start = messages.len().saturating_sub(count);
        messages[start..].to_vec()
    }

    pub fn snapshot(&self) -> Vec<ContextMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[cfg(test)]
#[path = "tape_tests.rs"]
mod tests;
