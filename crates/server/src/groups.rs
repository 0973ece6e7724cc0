// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Window-group membership.
//!
//! A window task that creates child windows pulls those children into its
//! group, so the whole family shares one agent (and one provider thread).
//! The group is keyed by its root window id; the shared agent may only be
//! disposed once the last member is gone.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Outcome of a close as seen by the group policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOutcome {
    pub should_dispose_agent: bool,
}

#[derive(Default)]
struct GroupState {
    /// window id → group root id (roots map to themselves).
    root_of: HashMap<String, String>,
    /// group root id → live member count.
    members: HashMap<String, usize>,
}

/// Tracks parent→child window groups so a group shares one agent.
#[derive(Default)]
pub struct WindowConnectionPolicy {
    state: Mutex<GroupState>,
}

impl WindowConnectionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `child` to `parent`'s group, forming a new group rooted at
    /// `parent` when the parent was standalone. Children created in one turn
    /// join in emission order.
    pub fn connect_window(&self, parent: &str, child: &str) {
        let mut state = self.state.lock();
        let root = match state.root_of.get(parent) {
            Some(root) => root.clone(),
            None => {
                state.root_of.insert(parent.to_owned(), parent.to_owned());
                state.members.insert(parent.to_owned(), 1);
                parent.to_owned()
            }
        };
        if state.root_of.insert(child.to_owned(), root.clone()).is_none() {
            *state.members.entry(root).or_insert(0) += 1;
        }
    }

    /// Group root for a window, or `None` for standalone windows (callers
    /// then key the agent by the window id itself).
    pub fn group_id(&self, id: &str) -> Option<String> {
        self.state.lock().root_of.get(id).cloned()
    }

    /// Live member count of the group containing `id` (0 when standalone).
    pub fn member_count(&self, id: &str) -> usize {
        let state = self.state.lock();
        match state.root_of.get(id) {
            Some(root) => state.members.get(root).copied().unwrap_or(0),
            None => 0,
        }
    }

    /// Record a window close. The shared agent may be disposed once the last
    /// group member (or a standalone window) is gone.
    pub fn handle_close(&self, id: &str) -> CloseOutcome {
        let mut state = self.state.lock();
        let Some(root) = state.root_of.remove(id) else {
            // Standalone window: its dedicated agent has nothing left to serve.
            return CloseOutcome { should_dispose_agent: true };
        };
        let remaining = match state.members.get_mut(&root) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            state.members.remove(&root);
        }
        CloseOutcome { should_dispose_agent: remaining == 0 }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.root_of.clear();
        state.members.clear();
    }
}

#[cfg(test)]
#[path = "groups_tests.rs"]
mod tests;
