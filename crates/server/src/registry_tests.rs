// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

fn create(id: &str, title: &str) -> OsAction {
    OsAction::WindowCreate {
        window_id: id.to_owned(),
        title: title.to_owned(),
        bounds: Bounds { x: 0, y: 0, width: 640, height: 480 },
        content: String::new(),
    }
}

#[test]
fn create_then_move_then_resize() -> anyhow::Result<()> {
    let registry = WindowStateRegistry::new();
    registry.handle_action(&create("w1", "Notes"));
    registry.handle_action(&OsAction::WindowMove { window_id: "w1".into(), x: 10, y: 20 });
    registry.handle_action(&OsAction::WindowResize {
        window_id: "w1".into(),
        width: 800,
        height: 600,
    });

    let record = registry.get_window("w1").ok_or_else(|| anyhow::anyhow!("missing window"))?;
    assert_eq!(record.bounds, Bounds { x: 10, y: 20, width: 800, height: 600 });
    assert_eq!(record.title, "Notes");
    Ok(())
}

#[test]
fn close_is_idempotent() {
    let closes = Arc::new(AtomicUsize::new(0));
    let registry = WindowStateRegistry::new();
    let counter = Arc::clone(&closes);
    registry.set_on_window_close(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.handle_action(&create("w1", "Notes"));
    registry.handle_action(&OsAction::WindowClose { window_id: "w1".into() });
    registry.handle_action(&OsAction::WindowClose { window_id: "w1".into() });
    registry.handle_action(&OsAction::WindowClose { window_id: "never-existed".into() });

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(registry.window_count(), 0);
}

#[test]
fn restore_rebuilds_creation_order() {
    let registry = WindowStateRegistry::new();
    registry.restore_from_actions(&[
        create("w1", "First"),
        create("w2", "Second"),
        OsAction::WindowClose { window_id: "w1".into() },
        create("w3", "Third"),
    ]);
    let ids: Vec<String> = registry.list_windows().into_iter().map(|w| w.id).collect();
    assert_eq!(ids, vec!["w2".to_owned(), "w3".to_owned()]);
}

#[test]
fn app_protocol_reregistration_detected() {
    let registry = WindowStateRegistry::new();
    registry.handle_action(&create("w1", "App"));
    assert!(!registry.set_app_protocol("w1"));
    assert!(registry.set_app_protocol("w1"));
    // Unknown window never reports as re-registration.
    assert!(!registry.set_app_protocol("ghost"));
}

#[test]
fn app_command_history_is_bounded() {
    let registry = WindowStateRegistry::new();
    registry.handle_action(&create("w1", "App"));
    for n in 0..40 {
        registry.push_app_command(AppProtocolRequest {
            request_id: format!("r{n}"),
            window_id: "w1".into(),
            payload: serde_json::json!({ "n": n }),
        });
    }
    let commands = registry.get_app_commands("w1");
    assert_eq!(commands.len(), 32);
    assert_eq!(commands[0].request_id, "r8");
    assert_eq!(commands[31].request_id, "r39");
}

#[test]
fn lock_and_unlock_toggle_flag() {
    let registry = WindowStateRegistry::new();
    registry.handle_action(&create("w1", "Doc"));
    registry.handle_action(&OsAction::WindowLock { window_id: "w1".into() });
    assert!(registry.get_window("w1").map(|w| w.locked).unwrap_or(false));
    registry.handle_action(&OsAction::WindowUnlock { window_id: "w1".into() });
    assert!(!registry.get_window("w1").map(|w| w.locked).unwrap_or(true));
}
