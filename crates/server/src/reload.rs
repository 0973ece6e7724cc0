// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fingerprint → action-sequence cache.
//!
//! When a task fingerprint matches a previously recorded turn, the dispatcher
//! injects the recorded candidates into the prompt so the agent may
//! short-circuit by replaying actions instead of re-deriving them. Entries
//! are invalidated (never evicted) when a referenced window closes or a user
//! reports the replay as wrong.
//!
//! The cache is persisted per session as a single JSON file rewritten through
//! a temp file + atomic rename on every mutation; losing the latest write on
//! a crash is acceptable.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::protocol::{epoch_ms, OsAction};
use crate::registry::WindowRecord;

/// Failures at or past this count invalidate the entry outright.
const FAIL_THRESHOLD: u32 = 2;

/// Stable digest of a task in its window context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recorded action sequence keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadCacheEntry {
    pub event_id: String,
    pub fingerprint: Fingerprint,
    pub actions: Vec<OsAction>,
    pub created_at_ms: u64,
    #[serde(default)]
    pub fail_count: u32,
    #[serde(default)]
    pub invalidated_windows: BTreeSet<String>,
    /// Window the recording originated from, when it was a window task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_window: Option<String>,
}

impl ReloadCacheEntry {
    pub fn is_invalidated(&self) -> bool {
        self.fail_count >= FAIL_THRESHOLD || !self.invalidated_windows.is_empty()
    }

    /// Whether this entry references the given window, either as its source
    /// or through a recorded action.
    fn references_window(&self, window_id: &str) -> bool {
        if self.source_window.as_deref() == Some(window_id) {
            return true;
        }
        self.actions.iter().any(|a| a.window_id() == Some(window_id))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCache {
    entries: Vec<ReloadCacheEntry>,
}

/// Per-session fingerprint cache with file persistence.
pub struct ReloadCache {
    path: Option<PathBuf>,
    entries: Mutex<Vec<ReloadCacheEntry>>,
}

/// Collapse whitespace runs, trim, lowercase.
fn normalize(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Derive the fingerprint of a task against a window snapshot.
///
/// Fields are length-prefixed before hashing so `("ab", "c")` and
/// `("a", "bc")` cannot collide. Window titles are sorted to make the
/// digest independent of creation order.
pub fn build_fingerprint(
    content: &str,
    monitor_id: &str,
    window_id: Option<&str>,
    windows: &[WindowRecord],
) -> Fingerprint {
    let mut hasher = Sha256::new();
    let mut feed = |field: &str| {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    };
    feed(&normalize(content));
    feed(monitor_id);
    feed(window_id.unwrap_or(""));
    let mut titles: Vec<&str> = windows.iter().map(|w| w.title.as_str()).collect();
    titles.sort_unstable();
    for title in titles {
        feed(title);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Fingerprint(hex)
}

impl ReloadCache {
    /// Create a cache persisting to `<dir>/reload_cache.json`, loading any
    /// existing file. `None` disables persistence (tests).
    pub fn new(dir: Option<PathBuf>) -> Self {
        let path = dir.map(|d| {
            let _ = std::fs::create_dir_all(&d);
            d.join("reload_cache.json")
        });
        let cache = Self { path, entries: Mutex::new(vec![]) };
        cache.load();
        cache
    }

    /// Read the persisted file, replacing in-memory entries. Unreadable or
    /// corrupt files are treated as empty.
    pub fn load(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let Ok(contents) = std::fs::read_to_string(path) else {
            return;
        };
        match serde_json::from_str::<PersistedCache>(&contents) {
            Ok(persisted) => *self.entries.lock() = persisted.entries,
            Err(e) => warn!(path = %path.display(), "ignoring corrupt reload cache: {e}"),
        }
    }

    fn persist(&self, entries: &[ReloadCacheEntry]) {
        let Some(ref path) = self.path else {
            return;
        };
        let Some(dir) = path.parent() else {
            return;
        };
        let persisted = PersistedCache { entries: entries.to_vec() };
        let Ok(json) = serde_json::to_string_pretty(&persisted) else {
            return;
        };
        let result = tempfile::NamedTempFile::new_in(dir).and_then(|mut tmp| {
            tmp.write_all(json.as_bytes())?;
            tmp.persist(path).map_err(|e| e.error)?;
            Ok(())
        });
        if let Err(e) = result {
            warn!(path = %path.display(), "reload cache write failed: {e}");
        }
    }

    /// Best matches for a fingerprint: not-invalidated first, then lower
    /// fail count, then newest.
    pub fn find_matches(&self, fingerprint: &Fingerprint, limit: usize) -> Vec<ReloadCacheEntry> {
        let entries = self.entries.lock();
        let mut matches: Vec<&ReloadCacheEntry> =
            entries.iter().filter(|e| &e.fingerprint == fingerprint).collect();
        matches.sort_by(|a, b| {
            a.is_invalidated()
                .cmp(&b.is_invalidated())
                .then(a.fail_count.cmp(&b.fail_count))
                .then(b.created_at_ms.cmp(&a.created_at_ms))
        });
        matches.into_iter().take(limit).cloned().collect()
    }

    /// Record a completed turn's actions when they are worth replaying:
    /// non-empty and containing at least one externally observable action.
    /// Identical `(fingerprint, actions)` pairs are not duplicated.
    pub fn maybe_record(
        &self,
        fingerprint: Fingerprint,
        actions: Vec<OsAction>,
        source_window: Option<String>,
    ) -> Option<String> {
        if actions.is_empty() || !actions.iter().any(OsAction::is_observable) {
            return None;
        }
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.fingerprint == fingerprint && e.actions == actions) {
            return None;
        }
        let event_id = uuid::Uuid::new_v4().to_string();
        debug!(event = %event_id, fingerprint = %fingerprint, "recording reload entry");
        entries.push(ReloadCacheEntry {
            event_id: event_id.clone(),
            fingerprint,
            actions,
            created_at_ms: epoch_ms(),
            fail_count: 0,
            invalidated_windows: BTreeSet::new(),
            source_window,
        });
        self.persist(&entries);
        Some(event_id)
    }

    /// Render candidate entries as a prompt-injection block. The agent can
    /// short-circuit by naming a candidate's event id through its replay
    /// tool; empty input renders nothing.
    pub fn format_reload_options(matches: &[ReloadCacheEntry]) -> String {
        if matches.is_empty() {
            return String::new();
        }
        let mut block = String::from(
            "<reload_options>\nThis request looks identical to previously completed work. \
             You may replay a recorded action sequence by its event id instead of redoing it:\n",
        );
        for entry in matches {
            let kinds: Vec<&str> = entry.actions.iter().map(|a| a.kind_str()).collect();
            block.push_str(&format!(
                "- event_id={} actions=[{}]{}\n",
                entry.event_id,
                kinds.join(", "),
                if entry.is_invalidated() { " (stale)" } else { "" },
            ));
        }
        block.push_str("</reload_options>\n");
        block
    }

    /// Mark every entry referencing the window as invalidated. Entries are
    /// kept for bookkeeping, not evicted.
    pub fn invalidate_for_window(&self, window_id: &str) {
        let mut entries = self.entries.lock();
        let mut changed = false;
        for entry in entries.iter_mut() {
            if entry.references_window(window_id)
                && entry.invalidated_windows.insert(window_id.to_owned())
            {
                changed = true;
            }
        }
        if changed {
            self.persist(&entries);
        }
    }

    /// Record a user-reported replay failure against an entry.
    pub fn mark_failed(&self, event_id: &str) {
        let mut entries = self.entries.lock();
        let mut changed = false;
        for entry in entries.iter_mut() {
            if entry.event_id == event_id {
                entry.fail_count += 1;
                changed = true;
            }
        }
        if changed {
            self.persist(&entries);
        }
    }

    pub fn get(&self, event_id: &str) -> Option<ReloadCacheEntry> {
        self.entries.lock().iter().find(|e| e.event_id == event_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "reload_tests.rs"]
mod tests;
