// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent workers and their per-session pool.

pub mod pool;
pub mod session;

pub use pool::AgentPool;
pub use session::{AgentOptions, AgentSession, TurnOutcome};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::ServerEvent;

/// Capability handed to agents for emitting outbound events. The owning
/// session supplies a closure that stamps and broadcasts; agents never hold a
/// back-pointer to the session itself.
pub type EventSink = Arc<dyn Fn(ServerEvent) + Send + Sync>;

/// Saved provider thread ids keyed by canonical agent name
/// (`default/<monitor>` or `window-<group>`), enabling resume across agent
/// instances. A saved id is consumed by the first turn that reads it.
#[derive(Default)]
pub struct ThreadStore {
    threads: Mutex<HashMap<String, String>>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, canonical: &str, thread_id: &str) {
        self.threads.lock().insert(canonical.to_owned(), thread_id.to_owned());
    }

    /// Read and delete: resume ids are first-turn-only.
    pub fn take(&self, canonical: &str) -> Option<String> {
        self.threads.lock().remove(canonical)
    }

    pub fn peek(&self, canonical: &str) -> Option<String> {
        self.threads.lock().get(canonical).cloned()
    }

    pub fn clear(&self) {
        self.threads.lock().clear();
    }
}
