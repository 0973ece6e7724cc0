// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn main_queue_rejects_at_capacity() {
    let queue = MainQueue::new(2);
    assert_eq!(queue.enqueue("a"), Ok(1));
    assert_eq!(queue.enqueue("b"), Ok(2));
    assert_eq!(queue.enqueue("c"), Err(QueueFull));
    assert_eq!(queue.len(), 2);
}

#[test]
fn main_queue_is_fifo() {
    let queue = MainQueue::new(4);
    let _ = queue.enqueue(1);
    let _ = queue.enqueue(2);
    assert_eq!(queue.dequeue(), Some(1));
    assert_eq!(queue.dequeue(), Some(2));
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn main_queue_processing_flag_is_exclusive() {
    let queue = MainQueue::<u32>::new(2);
    assert!(queue.begin_processing());
    assert!(!queue.begin_processing());
    queue.end_processing();
    assert!(queue.begin_processing());
}

#[test]
fn window_queue_positions_are_one_based() {
    let queues = WindowQueues::new();
    assert_eq!(queues.enqueue("w1", "a"), 1);
    assert_eq!(queues.enqueue("w1", "b"), 2);
    assert_eq!(queues.enqueue("w2", "c"), 1);
    assert_eq!(queues.dequeue("w1"), Some("a"));
}

#[test]
fn window_processing_flags_are_per_key() {
    let queues = WindowQueues::<&str>::new();
    queues.set_processing("w1", true);
    assert!(queues.is_processing("w1"));
    assert!(!queues.is_processing("w2"));
    queues.set_processing("w1", false);
    assert!(!queues.is_processing("w1"));
}

#[test]
fn drained_idle_keys_are_dropped() {
    let queues = WindowQueues::new();
    queues.enqueue("w1", "a");
    assert_eq!(queues.dequeue("w1"), Some("a"));
    assert!(queues.queue_sizes().is_empty());
    assert_eq!(queues.total_queued(), 0);
}

#[test]
fn queue_sizes_report_backlog() {
    let queues = WindowQueues::new();
    queues.enqueue("w1", "a");
    queues.enqueue("w1", "b");
    queues.enqueue("w2", "c");
    let sizes = queues.queue_sizes();
    assert_eq!(sizes.get("w1"), Some(&2));
    assert_eq!(sizes.get("w2"), Some(&1));
    assert_eq!(queues.total_queued(), 3);
}

#[test]
fn clear_empties_all_keys() {
    let queues = WindowQueues::new();
    queues.enqueue("w1", "a");
    queues.set_processing("w2", true);
    queues.clear();
    assert_eq!(queues.total_queued(), 0);
    assert!(!queues.is_processing("w2"));
}
