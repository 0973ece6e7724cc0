// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide registry of live sessions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::session::{LiveSession, SessionShared};

/// Session id used when a client connects without requesting one.
pub const DEFAULT_SESSION: &str = "default";

/// Registry of [`LiveSession`]s keyed by id.
pub struct SessionHub {
    shared: SessionShared,
    sessions: RwLock<HashMap<String, Arc<LiveSession>>>,
}

impl SessionHub {
    pub fn new(shared: SessionShared) -> Self {
        Self { shared, sessions: RwLock::new(HashMap::new()) }
    }

    /// Look up a session by id, reusing the default session when none was
    /// requested, creating on first use.
    pub fn get_or_create(&self, requested: Option<&str>) -> Arc<LiveSession> {
        let id = requested.unwrap_or(DEFAULT_SESSION);
        if let Some(session) = self.sessions.read().get(id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(id.to_owned())
                .or_insert_with(|| LiveSession::new(id, self.shared.clone())),
        )
    }

    pub fn get(&self, id: &str) -> Option<Arc<LiveSession>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove and clean up a session.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id);
        match removed {
            Some(session) => {
                session.cleanup().await;
                info!(session = id, "session removed");
                true
            }
            None => false,
        }
    }

    /// Drop a session once its last connection is gone. The default session
    /// is kept alive indefinitely.
    pub async fn remove_if_idle(&self, id: &str) -> bool {
        if id == DEFAULT_SESSION {
            return false;
        }
        let idle = self.sessions.read().get(id).is_some_and(|s| s.connection_count() == 0);
        if idle {
            self.remove(id).await
        } else {
            false
        }
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shared(&self) -> &SessionShared {
        &self.shared
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
