// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn known_actions_round_trip() -> anyhow::Result<()> {
    let action = OsAction::WindowCreate {
        window_id: "w1".into(),
        title: "Notes".into(),
        bounds: Bounds { x: 1, y: 2, width: 3, height: 4 },
        content: "<app/>".into(),
    };
    let json = serde_json::to_value(&action)?;
    assert_eq!(json["type"], "window.create");
    let back: OsAction = serde_json::from_value(json)?;
    assert_eq!(action, back);
    Ok(())
}

#[test]
fn unknown_actions_pass_through_untouched() -> anyhow::Result<()> {
    let raw = serde_json::json!({
        "type": "desktop.set_wallpaper",
        "url": "https://example.test/cat.png",
        "nested": { "keep": [1, 2, 3] },
    });
    let action: OsAction = serde_json::from_value(raw.clone())?;
    assert!(matches!(action, OsAction::Other(_)));
    assert_eq!(action.kind_str(), "desktop.set_wallpaper");
    assert_eq!(serde_json::to_value(&action)?, raw);
    Ok(())
}

#[test]
fn other_actions_expose_window_ids() -> anyhow::Result<()> {
    let action: OsAction = serde_json::from_value(serde_json::json!({
        "type": "window.flash",
        "window_id": "w9",
    }))?;
    assert_eq!(action.window_id(), Some("w9"));
    Ok(())
}

#[test]
fn client_events_use_snake_case_tags() -> anyhow::Result<()> {
    let event: ClientEvent = serde_json::from_str(
        r#"{"event":"user_message","message_id":"m1","content":"hi"}"#,
    )?;
    assert!(matches!(event, ClientEvent::UserMessage { ref message_id, .. } if message_id == "m1"));

    let event: ClientEvent = serde_json::from_str(
        r#"{"event":"subscribe_monitor","monitor_id":"monitor-1"}"#,
    )?;
    assert!(matches!(event, ClientEvent::SubscribeMonitor { .. }));
    Ok(())
}

#[test]
fn unknown_client_events_fail_to_parse() {
    let result = serde_json::from_str::<ClientEvent>(r#"{"event":"made_up"}"#);
    assert!(result.is_err());
}

#[test]
fn envelope_flattens_event_fields() -> anyhow::Result<()> {
    let envelope = Envelope {
        seq: 7,
        event: ServerEvent::MessageAccepted { message_id: "m1".into(), agent_id: "main-m1".into() },
    };
    let json = serde_json::to_value(&envelope)?;
    assert_eq!(json["seq"], 7);
    assert_eq!(json["event"], "message_accepted");
    assert_eq!(json["agent_id"], "main-m1");
    Ok(())
}

#[test]
fn interaction_kinds_use_dotted_names() -> anyhow::Result<()> {
    let interaction: UserInteraction = serde_json::from_value(serde_json::json!({
        "kind": "window.close",
        "window_id": "w1",
    }))?;
    assert_eq!(interaction.kind, InteractionKind::WindowClose);
    assert_eq!(interaction.kind.as_str(), "window.close");
    Ok(())
}

#[test]
fn describe_prefers_titles() {
    let interaction = UserInteraction {
        kind: InteractionKind::IconClick,
        timestamp_ms: 0,
        window_id: Some("w1".into()),
        window_title: Some("Files".into()),
        details: Some("double click".into()),
        instruction: None,
        selected_text: None,
        region: None,
        bounds: None,
        image_data: None,
    };
    assert_eq!(interaction.describe(), "icon.click on \"Files\": double click");
}

#[test]
fn observable_actions_are_create_and_notify() {
    assert!(OsAction::WindowCreate {
        window_id: "w".into(),
        title: String::new(),
        bounds: Bounds::default(),
        content: String::new(),
    }
    .is_observable());
    assert!(!OsAction::WindowMove { window_id: "w".into(), x: 0, y: 0 }.is_observable());
}
