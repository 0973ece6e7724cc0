// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::protocol::{Envelope, ServerEvent};

/// Fixed-capacity ring of sequenced outbound events.
///
/// Every event a session emits passes through [`stamp`](Self::stamp), which
/// assigns the next monotonic sequence number and retains the stamped event
/// for late-join replay. When the ring wraps, older events are silently
/// discarded; a client that has fallen behind the oldest retained event must
/// request a full snapshot instead.
#[derive(Debug)]
pub struct EventSequencer {
    ring: Vec<Option<Envelope>>,
    capacity: usize,
    head: usize,
    count: usize,
    next_seq: u64,
}

impl EventSequencer {
    /// Create a sequencer retaining up to `capacity` events. Sequence numbers
    /// start at 1 and are never reused.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: vec![None; capacity.max(1)],
            capacity: capacity.max(1),
            head: 0,
            count: 0,
            next_seq: 1,
        }
    }

    /// Stamp an event with the next sequence number and retain it.
    pub fn stamp(&mut self, event: ServerEvent) -> Envelope {
        let envelope = Envelope { seq: self.next_seq, event };
        self.next_seq += 1;
        self.ring[self.head] = Some(envelope.clone());
        self.head = (self.head + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
        envelope
    }

    /// Sequence number of the oldest retained event, or `None` when empty.
    pub fn oldest_stored_seq(&self) -> Option<u64> {
        if self.count == 0 {
            None
        } else {
            Some(self.next_seq - self.count as u64)
        }
    }

    /// Sequence number that will be assigned to the next stamped event.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Return all retained events with `seq > last_seq`, in order.
    ///
    /// Returns `None` when `last_seq` precedes the oldest retained event by
    /// more than one — the client is too far behind and must request a full
    /// snapshot.
    pub fn replay_after(&self, last_seq: u64) -> Option<Vec<Envelope>> {
        let oldest = match self.oldest_stored_seq() {
            Some(o) => o,
            // Nothing stored yet: every client is caught up.
            None => return Some(vec![]),
        };

        if last_seq + 1 < oldest {
            return None;
        }

        let mut out = Vec::new();
        // Oldest entry sits at `head` once the ring has wrapped, else at 0.
        let start = if self.count == self.capacity { self.head } else { 0 };
        for i in 0..self.count {
            let idx = (start + i) % self.capacity;
            if let Some(ref entry) = self.ring[idx] {
                if entry.seq > last_seq {
                    out.push(entry.clone());
                }
            }
        }
        Some(out)
    }
}

#[cfg(test)]
#[path = "sequencer_tests.rs"]
mod tests;
