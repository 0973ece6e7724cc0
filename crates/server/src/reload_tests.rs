// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::Bounds;

fn window(id: &str, title: &str) -> WindowRecord {
    WindowRecord {
        id: id.to_owned(),
        title: title.to_owned(),
        bounds: Bounds::default(),
        content: String::new(),
        locked: false,
        app_protocol_ready: false,
        app_commands: vec![],
    }
}

fn create_action(id: &str, title: &str) -> OsAction {
    OsAction::WindowCreate {
        window_id: id.to_owned(),
        title: title.to_owned(),
        bounds: Bounds::default(),
        content: String::new(),
    }
}

#[test]
fn fingerprint_is_stable_under_normalization() {
    let windows = [window("w1", "Clock")];
    let a = build_fingerprint("  Open   the CLOCK ", "monitor-0", None, &windows);
    let b = build_fingerprint("open the clock", "monitor-0", None, &windows);
    assert_eq!(a, b);
}

#[test]
fn fingerprint_ignores_window_order() {
    let ab = [window("w1", "A"), window("w2", "B")];
    let ba = [window("w2", "B"), window("w1", "A")];
    assert_eq!(
        build_fingerprint("hi", "monitor-0", None, &ab),
        build_fingerprint("hi", "monitor-0", None, &ba)
    );
}

#[test]
fn fingerprint_varies_with_context() {
    let windows = [window("w1", "Clock")];
    let base = build_fingerprint("open", "monitor-0", None, &windows);
    assert_ne!(base, build_fingerprint("open", "monitor-1", None, &windows));
    assert_ne!(base, build_fingerprint("open", "monitor-0", Some("w1"), &windows));
    assert_ne!(base, build_fingerprint("open", "monitor-0", None, &[]));
}

#[test]
fn fingerprint_fields_cannot_bleed_together() {
    // Length prefixing keeps ("ab","") distinct from ("a","b").
    let a = build_fingerprint("ab", "", None, &[]);
    let b = build_fingerprint("a", "b", None, &[]);
    assert_ne!(a, b);
}

#[test]
fn record_and_find_round_trip() {
    let cache = ReloadCache::new(None);
    let fp = build_fingerprint("open clock", "monitor-0", None, &[]);
    let actions = vec![create_action("w1", "Clock")];
    let event_id = cache.maybe_record(fp.clone(), actions.clone(), None);
    assert!(event_id.is_some());

    let matches = cache.find_matches(&fp, 3);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].actions, actions);
}

#[test]
fn trivial_action_lists_are_not_recorded() {
    let cache = ReloadCache::new(None);
    let fp = build_fingerprint("noop", "monitor-0", None, &[]);
    assert!(cache.maybe_record(fp.clone(), vec![], None).is_none());
    // Only a move: nothing externally observable to replay.
    let only_move = vec![OsAction::WindowMove { window_id: "w1".into(), x: 1, y: 2 }];
    assert!(cache.maybe_record(fp.clone(), only_move, None).is_none());
    assert!(cache.is_empty());
}

#[test]
fn identical_recordings_deduplicate() {
    let cache = ReloadCache::new(None);
    let fp = build_fingerprint("open clock", "monitor-0", None, &[]);
    let actions = vec![create_action("w1", "Clock")];
    assert!(cache.maybe_record(fp.clone(), actions.clone(), None).is_some());
    assert!(cache.maybe_record(fp.clone(), actions, None).is_none());
    assert_eq!(cache.len(), 1);
}

#[test]
fn matches_order_valid_before_invalidated() -> anyhow::Result<()> {
    let cache = ReloadCache::new(None);
    let fp = build_fingerprint("open clock", "monitor-0", None, &[]);
    let first = cache
        .maybe_record(fp.clone(), vec![create_action("w1", "Clock")], None)
        .ok_or_else(|| anyhow::anyhow!("not recorded"))?;
    let _second = cache
        .maybe_record(fp.clone(), vec![create_action("w2", "Clock 2")], None)
        .ok_or_else(|| anyhow::anyhow!("not recorded"))?;

    cache.invalidate_for_window("w1");
    let matches = cache.find_matches(&fp, 3);
    assert_eq!(matches.len(), 2);
    assert!(!matches[0].is_invalidated());
    assert_eq!(matches[1].event_id, first);
    assert!(matches[1].is_invalidated());
    Ok(())
}

#[test]
fn mark_failed_escalates_to_invalidated() -> anyhow::Result<()> {
    let cache = ReloadCache::new(None);
    let fp = build_fingerprint("open clock", "monitor-0", None, &[]);
    let event_id = cache
        .maybe_record(fp.clone(), vec![create_action("w1", "Clock")], None)
        .ok_or_else(|| anyhow::anyhow!("not recorded"))?;

    cache.mark_failed(&event_id);
    let entry = cache.get(&event_id).ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(entry.fail_count, 1);
    assert!(!entry.is_invalidated());

    cache.mark_failed(&event_id);
    let entry = cache.get(&event_id).ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert!(entry.is_invalidated());
    Ok(())
}

#[test]
fn invalidate_matches_source_window() -> anyhow::Result<()> {
    let cache = ReloadCache::new(None);
    let fp = build_fingerprint("refresh", "monitor-0", Some("w7"), &[]);
    let event_id = cache
        .maybe_record(fp, vec![create_action("w9", "Child")], Some("w7".into()))
        .ok_or_else(|| anyhow::anyhow!("not recorded"))?;
    cache.invalidate_for_window("w7");
    let entry = cache.get(&event_id).ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert!(entry.is_invalidated());
    Ok(())
}

#[test]
fn format_reload_options_lists_event_ids() -> anyhow::Result<()> {
    let cache = ReloadCache::new(None);
    let fp = build_fingerprint("open clock", "monitor-0", None, &[]);
    let event_id = cache
        .maybe_record(fp.clone(), vec![create_action("w1", "Clock")], None)
        .ok_or_else(|| anyhow::anyhow!("not recorded"))?;

    let block = ReloadCache::format_reload_options(&cache.find_matches(&fp, 3));
    assert!(block.contains(&event_id));
    assert!(block.contains("window.create"));
    assert!(ReloadCache::format_reload_options(&[]).is_empty());
    Ok(())
}

#[test]
fn persistence_round_trips_across_instances() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let fp = build_fingerprint("open clock", "monitor-0", None, &[]);
    let event_id;
    {
        let cache = ReloadCache::new(Some(dir.path().to_path_buf()));
        event_id = cache
            .maybe_record(fp.clone(), vec![create_action("w1", "Clock")], None)
            .ok_or_else(|| anyhow::anyhow!("not recorded"))?;
        cache.mark_failed(&event_id);
    }
    let reopened = ReloadCache::new(Some(dir.path().to_path_buf()));
    let entry = reopened.get(&event_id).ok_or_else(|| anyhow::anyhow!("missing"))?;
    assert_eq!(entry.fail_count, 1);
    assert_eq!(reopened.find_matches(&fp, 3).len(), 1);
    Ok(())
}

#[test]
fn corrupt_cache_file_is_ignored() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("reload_cache.json"), b"{ not json")?;
    let cache = ReloadCache::new(Some(dir.path().to_path_buf()));
    assert!(cache.is_empty());
    Ok(())
}
