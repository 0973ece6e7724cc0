// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded FIFO queues serializing main-agent and per-window-agent work.
//!
//! Both queues pair a task buffer with a processing flag; the flag prevents
//! re-entrant drains, the bound turns runaway backlogs into an explicit
//! rejection the dispatcher surfaces as an error event.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

/// Enqueue rejected: the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

struct MainQueueState<T> {
    queue: VecDeque<T>,
    processing: bool,
}

/// Bounded FIFO for one monitor's main agent.
pub struct MainQueue<T> {
    capacity: usize,
    state: Mutex<MainQueueState<T>>,
}

impl<T> MainQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(MainQueueState { queue: VecDeque::new(), processing: false }),
        }
    }

    /// Append a task; returns the new queue size, or `QueueFull`.
    pub fn enqueue(&self, task: T) -> Result<usize, QueueFull> {
        let mut state = self.state.lock();
        if state.queue.len() >= self.capacity {
            return Err(QueueFull);
        }
        state.queue.push_back(task);
        Ok(state.queue.len())
    }

    pub fn dequeue(&self) -> Option<T> {
        self.state.lock().queue.pop_front()
    }

    /// Claim the drain. Returns false when a drain is already running.
    pub fn begin_processing(&self) -> bool {
        let mut state = self.state.lock();
        if state.processing {
            return false;
        }
        state.processing = true;
        true
    }

    pub fn end_processing(&self) {
        self.state.lock().processing = false;
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().queue.clear();
    }
}

#[derive(Default)]
struct WindowQueueState<T> {
    processing: bool,
    queue: VecDeque<T>,
}

/// Keyed FIFO queues shared by all window agents of a session.
///
/// Keys are agent keys (group roots). Tasks carrying an `action_id` never
/// pass through here — they run in parallel and do not consult the
/// processing flag.
pub struct WindowQueues<T> {
    state: Mutex<HashMap<String, WindowQueueState<T>>>,
}

impl<T> Default for WindowQueues<T> {
    fn default() -> Self {
        Self { state: Mutex::new(HashMap::new()) }
    }
}

impl<T> WindowQueues<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processing(&self, key: &str) -> bool {
        self.state.lock().get(key).map(|s| s.processing).unwrap_or(false)
    }

    pub fn set_processing(&self, key: &str, processing: bool) {
        let mut state = self.state.lock();
        let entry = state.entry(key.to_owned()).or_insert_with(|| WindowQueueState {
            processing: false,
            queue: VecDeque::new(),
        });
        entry.processing = processing;
        if !processing && entry.queue.is_empty() {
            state.remove(key);
        }
    }

    /// Append a task for the key; returns its 1-based queue position.
    pub fn enqueue(&self, key: &str, task: T) -> usize {
        let mut state = self.state.lock();
        let entry = state.entry(key.to_owned()).or_insert_with(|| WindowQueueState {
            processing: false,
            queue: VecDeque::new(),
        });
        entry.queue.push_back(task);
        entry.queue.len()
    }

    pub fn dequeue(&self, key: &str) -> Option<T> {
        let mut state = self.state.lock();
        let entry = state.get_mut(key)?;
        let task = entry.queue.pop_front();
        if entry.queue.is_empty() && !entry.processing {
            state.remove(key);
        }
        task
    }

    /// Atomically pop the next task for a processing key, or mark the key
    /// idle when its queue is empty. Prevents the submit/drain race where a
    /// task lands between "queue empty" and "flag cleared".
    pub fn finish_or_next(&self, key: &str) -> Option<T> {
        let mut state = self.state.lock();
        let Some(entry) = state.get_mut(key) else {
            return None;
        };
        match entry.queue.pop_front() {
            Some(task) => Some(task),
            None => {
                entry.processing = false;
                state.remove(key);
                None
            }
        }
    }

    pub fn clear(&self) {
        self.state.lock().clear();
    }

    pub fn queue_sizes(&self) -> HashMap<String, usize> {
        self.state
            .lock()
            .iter()
            .filter(|(_, s)| !s.queue.is_empty())
            .map(|(k, s)| (k.clone(), s.queue.len()))
            .collect()
    }

    pub fn total_queued(&self) -> usize {
        self.state.lock().values().map(|s| s.queue.len()).sum()
    }
}

#[cfg(test)]
#[path = "queues_tests.rs"]
mod tests;
