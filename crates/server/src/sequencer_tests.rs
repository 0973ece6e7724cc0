// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn ev(n: u32) -> ServerEvent {
    ServerEvent::AgentThinking { content: format!("t{n}"), agent_id: None, message_id: None }
}

fn seqs(replay: Option<Vec<Envelope>>) -> Option<Vec<u64>> {
    replay.map(|v| v.iter().map(|e| e.seq).collect())
}

#[test]
fn first_seq_is_one() {
    let mut s = EventSequencer::new(8);
    assert_eq!(s.stamp(ev(0)).seq, 1);
    assert_eq!(s.stamp(ev(1)).seq, 2);
}

#[test]
fn replay_from_empty() {
    let s = EventSequencer::new(8);
    assert_eq!(seqs(s.replay_after(0)), Some(vec![]));
}

#[test]
fn replay_returns_newer_events_in_order() {
    let mut s = EventSequencer::new(8);
    for n in 0..5 {
        s.stamp(ev(n));
    }
    assert_eq!(seqs(s.replay_after(2)), Some(vec![3, 4, 5]));
    assert_eq!(seqs(s.replay_after(0)), Some(vec![1, 2, 3, 4, 5]));
    assert_eq!(seqs(s.replay_after(5)), Some(vec![]));
}

#[test]
fn replay_boundary_at_capacity() {
    // Capacity 4, stamp 1..=10: retained seqs are 7..=10.
    let mut s = EventSequencer::new(4);
    for n in 0..10 {
        s.stamp(ev(n));
    }
    assert_eq!(s.oldest_stored_seq(), Some(7));
    assert_eq!(seqs(s.replay_after(6)), Some(vec![7, 8, 9, 10]));
    // Two before the oldest means events were lost: snapshot needed.
    assert_eq!(s.replay_after(5), None);
    assert_eq!(s.replay_after(0), None);
}

#[test]
fn replay_ahead_of_stream_is_empty() {
    let mut s = EventSequencer::new(4);
    s.stamp(ev(0));
    assert_eq!(seqs(s.replay_after(99)), Some(vec![]));
}

#[test]
fn capacity_one() {
    let mut s = EventSequencer::new(1);
    s.stamp(ev(0));
    s.stamp(ev(1));
    assert_eq!(s.oldest_stored_seq(), Some(2));
    assert_eq!(seqs(s.replay_after(1)), Some(vec![2]));
    assert_eq!(s.replay_after(0), None);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Stamped seqs form 1,2,...,n with no gap, and any replay inside the
        // retained range returns exactly the events newer than last_seq.
        #[test]
        fn seqs_are_gap_free(total in 1usize..64, capacity in 1usize..16) {
            let mut s = EventSequencer::new(capacity);
            for n in 0..total {
                let envelope = s.stamp(ev(n as u32));
                prop_assert_eq!(envelope.seq, n as u64 + 1);
            }
            let oldest = s.oldest_stored_seq().map(|o| o as usize).unwrap_or(1);
            for last in oldest.saturating_sub(1)..=total {
                let replayed = s.replay_after(last as u64);
                prop_assert!(replayed.is_some());
                if let Some(events) = replayed {
                    let expect: Vec<u64> = ((last as u64 + 1)..=(total as u64)).collect();
                    let got: Vec<u64> = events.iter().map(|e| e.seq).collect();
                    prop_assert_eq!(got, expect);
                }
            }
        }
    }
}
