// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative server-side view of window existence, bounds, and
//! app-protocol readiness.
//!
//! The registry is fed from two directions: AI-emitted actions observed on
//! the action bus, and user interactions folded back in as synthetic actions
//! so a restore reflects user moves and closes.

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::protocol::{AppProtocolRequest, Bounds, OsAction};

/// Replayed app-protocol history is capped per window.
const APP_COMMAND_HISTORY: usize = 32;

/// One tracked window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    pub id: String,
    pub title: String,
    pub bounds: Bounds,
    pub content: String,
    pub locked: bool,
    pub app_protocol_ready: bool,
    pub app_commands: Vec<AppProtocolRequest>,
}

type CloseCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Authoritative record of windows, keyed by id in creation order.
#[derive(Default)]
pub struct WindowStateRegistry {
    windows: RwLock<IndexMap<String, WindowRecord>>,
    on_close: RwLock<Option<CloseCallback>>,
}

impl WindowStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked synchronously whenever a window closes.
    pub fn set_on_window_close(&self, cb: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_close.write() = Some(Box::new(cb));
    }

    /// Fold a single action into the window map.
    ///
    /// Closing an unknown window is a no-op; the close callback only fires
    /// for windows that were actually tracked.
    pub fn handle_action(&self, action: &OsAction) {
        let closed = {
            let mut windows = self.windows.write();
            match action {
                OsAction::WindowCreate { window_id, title, bounds, content } => {
                    windows.insert(
                        window_id.clone(),
                        WindowRecord {
                            id: window_id.clone(),
                            title: title.clone(),
                            bounds: *bounds,
                            content: content.clone(),
                            locked: false,
                            app_protocol_ready: false,
                            app_commands: vec![],
                        },
                    );
                    None
                }
                OsAction::WindowClose { window_id } => {
                    windows.shift_remove(window_id).map(|_| window_id.clone())
                }
                OsAction::WindowMove { window_id, x, y } => {
                    if let Some(record) = windows.get_mut(window_id) {
                        record.bounds.x = *x;
                        record.bounds.y = *y;
                    }
                    None
                }
                OsAction::WindowResize { window_id, width, height } => {
                    if let Some(record) = windows.get_mut(window_id) {
                        record.bounds.width = *width;
                        record.bounds.height = *height;
                    }
                    None
                }
                OsAction::WindowLock { window_id } => {
                    if let Some(record) = windows.get_mut(window_id) {
                        record.locked = true;
                    }
                    None
                }
                OsAction::WindowUnlock { window_id } => {
                    if let Some(record) = windows.get_mut(window_id) {
                        record.locked = false;
                    }
                    None
                }
                _ => None,
            }
        };

        // Callback fires outside the map lock so handlers may re-enter.
        if let Some(window_id) = closed {
            debug!(window = %window_id, "window closed");
            if let Some(ref cb) = *self.on_close.read() {
                cb(&window_id);
            }
        }
    }

    /// Snapshot of all live windows in creation order.
    pub fn list_windows(&self) -> Vec<WindowRecord> {
        self.windows.read().values().cloned().collect()
    }

    pub fn get_window(&self, id: &str) -> Option<WindowRecord> {
        self.windows.read().get(id).cloned()
    }

    pub fn window_count(&self) -> usize {
        self.windows.read().len()
    }

    /// Rebuild the map from a recorded action sequence.
    pub fn restore_from_actions(&self, actions: &[OsAction]) {
        for action in actions {
            self.handle_action(action);
        }
    }

    /// Mark a window's embedded app as protocol-ready. Returns the previous
    /// readiness so callers can detect re-registration.
    pub fn set_app_protocol(&self, id: &str) -> bool {
        let mut windows = self.windows.write();
        match windows.get_mut(id) {
            Some(record) => std::mem::replace(&mut record.app_protocol_ready, true),
            None => false,
        }
    }

    /// Record an app-protocol request for later replay. History is bounded;
    /// the oldest entry is dropped first.
    pub fn push_app_command(&self, request: AppProtocolRequest) {
        let mut windows = self.windows.write();
        if let Some(record) = windows.get_mut(&request.window_id) {
            if record.app_commands.len() >= APP_COMMAND_HISTORY {
                record.app_commands.remove(0);
            }
            record.app_commands.push(request);
        }
    }

    pub fn get_app_commands(&self, id: &str) -> Vec<AppProtocolRequest> {
        self.windows.read().get(id).map(|r| r.app_commands.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        self.windows.write().clear();
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
