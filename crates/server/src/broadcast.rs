// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry and fanout.
//!
//! Each live connection registers an unbounded sender the transport drains
//! into its socket. Fanout never fails upward: a closed or lagging channel is
//! logged and skipped, and the connection is reaped on its next unsubscribe.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::Envelope;

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<Envelope>,
    session_id: String,
    /// Empty set means "receive everything" (no monitor filter).
    monitors: HashSet<String>,
}

/// Maps connections to sessions and publishes events by session or by
/// per-connection monitor subscription.
#[derive(Default)]
pub struct BroadcastCenter {
    connections: RwLock<HashMap<String, ConnectionEntry>>,
    by_session: RwLock<HashMap<String, HashSet<String>>>,
}

impl BroadcastCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel under a session.
    pub fn subscribe(
        &self,
        conn_id: impl Into<String>,
        tx: mpsc::UnboundedSender<Envelope>,
        session_id: impl Into<String>,
    ) {
        let conn_id = conn_id.into();
        let session_id = session_id.into();
        self.by_session
            .write()
            .entry(session_id.clone())
            .or_default()
            .insert(conn_id.clone());
        self.connections
            .write()
            .insert(conn_id, ConnectionEntry { tx, session_id, monitors: HashSet::new() });
    }

    /// Remove a connection. Idempotent.
    pub fn unsubscribe(&self, conn_id: &str) {
        let removed = self.connections.write().remove(conn_id);
        if let Some(entry) = removed {
            let mut by_session = self.by_session.write();
            if let Some(set) = by_session.get_mut(&entry.session_id) {
                set.remove(conn_id);
                if set.is_empty() {
                    by_session.remove(&entry.session_id);
                }
            }
        }
    }

    /// Add a monitor to the connection's subscription set.
    pub fn subscribe_to_monitor(&self, conn_id: &str, monitor_id: impl Into<String>) {
        if let Some(entry) = self.connections.write().get_mut(conn_id) {
            entry.monitors.insert(monitor_id.into());
        }
    }

    /// Session a connection is attached to, if registered.
    pub fn session_of(&self, conn_id: &str) -> Option<String> {
        self.connections.read().get(conn_id).map(|e| e.session_id.clone())
    }

    /// Number of open connections for a session.
    pub fn connection_count(&self, session_id: &str) -> usize {
        self.by_session.read().get(session_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Deliver to a single connection. Returns whether the event was handed
    /// to the transport channel.
    pub fn publish_to_connection(&self, event: &Envelope, conn_id: &str) -> bool {
        let connections = self.connections.read();
        let Some(entry) = connections.get(conn_id) else {
            return false;
        };
        if entry.tx.send(event.clone()).is_err() {
            debug!(conn = conn_id, "dropping event for closed connection");
            return false;
        }
        true
    }

    /// Fan out to every open connection of a session. Returns deliveries.
    pub fn publish_to_session(&self, session_id: &str, event: &Envelope) -> usize {
        self.fanout(session_id, event, None)
    }

    /// Fan out to the session, skipping connections whose subscription set is
    /// non-empty and does not include `monitor_id`. Connections with zero
    /// subscriptions receive all monitors.
    pub fn publish_to_monitor(&self, session_id: &str, monitor_id: &str, event: &Envelope) -> usize {
        self.fanout(session_id, event, Some(monitor_id))
    }

    fn fanout(&self, session_id: &str, event: &Envelope, monitor_id: Option<&str>) -> usize {
        let conn_ids: Vec<String> = match self.by_session.read().get(session_id) {
            Some(set) => set.iter().cloned().collect(),
            None => return 0,
        };
        let connections = self.connections.read();
        let mut delivered = 0;
        for conn_id in conn_ids {
            let Some(entry) = connections.get(&conn_id) else {
                continue;
            };
            if let Some(monitor) = monitor_id {
                if !entry.monitors.is_empty() && !entry.monitors.contains(monitor) {
                    continue;
                }
            }
            if entry.tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(conn = %conn_id, "dropping event for closed connection");
            }
        }
        delivered
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
