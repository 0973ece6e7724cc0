// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn standalone_window_has_no_group() {
    let policy = WindowConnectionPolicy::new();
    assert_eq!(policy.group_id("w1"), None);
    assert_eq!(policy.member_count("w1"), 0);
}

#[test]
fn connect_forms_group_rooted_at_parent() {
    let policy = WindowConnectionPolicy::new();
    policy.connect_window("w1", "w2");
    assert_eq!(policy.group_id("w1").as_deref(), Some("w1"));
    assert_eq!(policy.group_id("w2").as_deref(), Some("w1"));
    assert_eq!(policy.member_count("w1"), 2);
}

#[test]
fn grandchildren_share_the_original_root() {
    let policy = WindowConnectionPolicy::new();
    policy.connect_window("w1", "w2");
    policy.connect_window("w2", "w3");
    assert_eq!(policy.group_id("w3").as_deref(), Some("w1"));
    assert_eq!(policy.member_count("w1"), 3);
}

#[test]
fn duplicate_connect_does_not_double_count() {
    let policy = WindowConnectionPolicy::new();
    policy.connect_window("w1", "w2");
    policy.connect_window("w1", "w2");
    assert_eq!(policy.member_count("w1"), 2);
}

#[test]
fn agent_survives_until_last_member_closes() {
    let policy = WindowConnectionPolicy::new();
    policy.connect_window("w1", "w2");

    // Closing the root while a child remains keeps the agent alive.
    assert_eq!(policy.handle_close("w1"), CloseOutcome { should_dispose_agent: false });
    // The surviving child still resolves to the original root key.
    assert_eq!(policy.group_id("w2").as_deref(), Some("w1"));
    assert_eq!(policy.handle_close("w2"), CloseOutcome { should_dispose_agent: true });
}

#[test]
fn standalone_close_disposes() {
    let policy = WindowConnectionPolicy::new();
    assert_eq!(policy.handle_close("w9"), CloseOutcome { should_dispose_agent: true });
}

#[test]
fn clear_resets_membership() {
    let policy = WindowConnectionPolicy::new();
    policy.connect_window("w1", "w2");
    policy.clear();
    assert_eq!(policy.group_id("w1"), None);
    assert_eq!(policy.group_id("w2"), None);
}
