// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action bus: the channel by which tool executions hand actions to the
//! agent that is currently running, plus the pending-wait resolvers that let
//! tools block on client feedback (rendering, dialogs, app-protocol RPC).
//!
//! Delivery is filtered by agent instance id, not by task-local context:
//! every published action names the instance that owns it, and every
//! subscriber drops actions addressed elsewhere. Instance ids come from one
//! process-wide counter so sessions sharing the process can never collide.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use crate::protocol::OsAction;

/// Allocate a process-unique agent instance id.
pub fn next_instance_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// An action published by a tool on behalf of a specific agent instance.
#[derive(Debug, Clone)]
pub struct BusAction {
    pub instance_id: u64,
    pub action: OsAction,
}

/// Client answer to a rendering request.
#[derive(Debug, Clone)]
pub struct RenderingOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub url: Option<String>,
    pub locked: Option<bool>,
    pub image_data: Option<String>,
}

/// Client answer to an approval dialog.
#[derive(Debug, Clone)]
pub struct DialogOutcome {
    pub confirmed: bool,
    pub remember_choice: Option<bool>,
}

/// Single-writer-many-reader action channel plus feedback resolvers.
pub struct ActionBus {
    tx: broadcast::Sender<BusAction>,
    pending_renders: Mutex<HashMap<String, oneshot::Sender<RenderingOutcome>>>,
    pending_dialogs: Mutex<HashMap<String, oneshot::Sender<DialogOutcome>>>,
    pending_app: Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>,
}

impl Default for ActionBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            tx,
            pending_renders: Mutex::new(HashMap::new()),
            pending_dialogs: Mutex::new(HashMap::new()),
            pending_app: Mutex::new(HashMap::new()),
        }
    }
}

impl ActionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an action for the named agent instance.
    pub fn publish(&self, instance_id: u64, action: OsAction) {
        // Send fails only when no agent is subscribed; that is a dropped
        // action, not an error.
        if self.tx.send(BusAction { instance_id, action }).is_err() {
            debug!(instance = instance_id, "action published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusAction> {
        self.tx.subscribe()
    }

    // -- Rendering feedback ---------------------------------------------------

    /// Register a wait for rendering feedback on `request_id`.
    pub fn wait_rendering(&self, request_id: impl Into<String>) -> oneshot::Receiver<RenderingOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending_renders.lock().insert(request_id.into(), tx);
        rx
    }

    /// Resolve a pending rendering wait. Returns false when nothing waited.
    pub fn resolve_rendering(&self, request_id: &str, outcome: RenderingOutcome) -> bool {
        match self.pending_renders.lock().remove(request_id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    // -- Dialog feedback ------------------------------------------------------

    pub fn wait_dialog(&self, dialog_id: impl Into<String>) -> oneshot::Receiver<DialogOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending_dialogs.lock().insert(dialog_id.into(), tx);
        rx
    }

    pub fn resolve_dialog(&self, dialog_id: &str, outcome: DialogOutcome) -> bool {
        match self.pending_dialogs.lock().remove(dialog_id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    // -- App protocol ---------------------------------------------------------

    pub fn wait_app_response(&self, request_id: impl Into<String>) -> oneshot::Receiver<serde_json::Value> {
        let (tx, rx) = oneshot::channel();
        self.pending_app.lock().insert(request_id.into(), tx);
        rx
    }

    pub fn resolve_app_response(&self, request_id: &str, response: serde_json::Value) -> bool {
        match self.pending_app.lock().remove(request_id) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop every pending wait; their receivers resolve with a closed error.
    /// Used by reset so tools blocked on feedback fail fast.
    pub fn fail_pending(&self) {
        self.pending_renders.lock().clear();
        self.pending_dialogs.lock().clear();
        self.pending_app.lock().clear();
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
