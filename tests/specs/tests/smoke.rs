// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests against the real binary.

use std::time::Duration;

use canopy_specs::CanopyBuilder;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

/// Read WS frames until the predicate matches or the timeout elapses.
async fn read_until<S>(
    ws: &mut S,
    timeout: Duration,
    done: impl Fn(&serde_json::Value) -> bool,
) -> anyhow::Result<Vec<serde_json::Value>>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut collected = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            anyhow::bail!("timed out after {} frames", collected.len());
        }
        let frame = tokio::time::timeout(remaining, ws.next()).await?;
        let Some(frame) = frame else {
            anyhow::bail!("connection closed after {} frames", collected.len());
        };
        if let Message::Text(text) = frame? {
            let value: serde_json::Value = serde_json::from_str(&text)?;
            let matched = done(&value);
            collected.push(value);
            if matched {
                return Ok(collected);
            }
        }
    }
}

#[tokio::test]
async fn health_endpoint_answers() -> anyhow::Result<()> {
    let server = CanopyBuilder::new().spawn()?;
    server.wait_ready().await?;

    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("{}/api/v1/health", server.base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn bearer_gate_rejects_unauthenticated_requests() -> anyhow::Result<()> {
    let server = CanopyBuilder::new().auth_token("spec-secret").spawn()?;
    server.wait_ready().await?;

    let client = reqwest::Client::new();
    // Health is exempt.
    let health = client.get(format!("{}/api/v1/health", server.base_url())).send().await?;
    assert!(health.status().is_success());

    // Status requires the token.
    let status = client.get(format!("{}/api/v1/status", server.base_url())).send().await?;
    assert_eq!(status.status().as_u16(), 401);
    let status = client
        .get(format!("{}/api/v1/status", server.base_url()))
        .bearer_auth("spec-secret")
        .send()
        .await?;
    assert!(status.status().is_success());

    // WS without the token is rejected before upgrade.
    let bad = tokio_tungstenite::connect_async(format!(
        "ws://127.0.0.1:{}/ws?session=spec",
        server.port
    ))
    .await;
    assert!(bad.is_err());

    // With it, the connection attaches.
    let (mut ws, _) = tokio_tungstenite::connect_async(server.ws_url("spec")).await?;
    let frames = read_until(&mut ws, Duration::from_secs(5), |v| {
        v["event"] == "connection_status"
    })
    .await?;
    assert_eq!(frames.last().map(|v| v["session_id"].clone()), Some("spec".into()));
    Ok(())
}

#[tokio::test]
async fn user_message_round_trip_is_sequenced() -> anyhow::Result<()> {
    let server = CanopyBuilder::new().spawn()?;
    server.wait_ready().await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(server.ws_url("spec")).await?;
    read_until(&mut ws, Duration::from_secs(5), |v| v["event"] == "connection_status").await?;

    ws.send(Message::Text(
        r#"{"event":"user_message","message_id":"m1","content":"hello"}"#.into(),
    ))
    .await?;

    let frames = read_until(&mut ws, Duration::from_secs(5), |v| {
        v["event"] == "agent_response" && v["is_complete"] == true
    })
    .await?;

    // Accepted on the main agent, then thinking, then the final response.
    assert!(frames
        .iter()
        .any(|v| v["event"] == "message_accepted" && v["agent_id"] == "main-m1"));
    assert!(frames.iter().any(|v| v["event"] == "agent_thinking"));

    // Sequence numbers are strictly increasing across everything we saw,
    // including the pre-message connection status (seq 1).
    let seqs: Vec<u64> = frames.iter().filter_map(|v| v["seq"].as_u64()).collect();
    assert_eq!(seqs.len(), frames.len());
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[tokio::test]
async fn second_connection_shares_the_session_stream() -> anyhow::Result<()> {
    let server = CanopyBuilder::new().spawn()?;
    server.wait_ready().await?;

    let (mut ws_a, _) = tokio_tungstenite::connect_async(server.ws_url("spec")).await?;
    read_until(&mut ws_a, Duration::from_secs(5), |v| v["event"] == "connection_status").await?;
    let (mut ws_b, _) = tokio_tungstenite::connect_async(server.ws_url("spec")).await?;
    read_until(&mut ws_b, Duration::from_secs(5), |v| v["event"] == "connection_status").await?;

    ws_a.send(Message::Text(
        r#"{"event":"user_message","message_id":"m1","content":"hello"}"#.into(),
    ))
    .await?;

    // Both connections observe the same turn.
    for ws in [&mut ws_a, &mut ws_b] {
        let frames = read_until(ws, Duration::from_secs(5), |v| {
            v["event"] == "agent_response" && v["is_complete"] == true
        })
        .await?;
        assert!(frames
            .iter()
            .any(|v| v["event"] == "message_accepted" && v["message_id"] == "m1"));
    }
    Ok(())
}

#[tokio::test]
async fn interrupt_still_clears_the_agent_indicator() -> anyhow::Result<()> {
    let server = CanopyBuilder::new().spawn()?;
    server.wait_ready().await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(server.ws_url("spec")).await?;
    read_until(&mut ws, Duration::from_secs(5), |v| v["event"] == "connection_status").await?;

    ws.send(Message::Text(
        r#"{"event":"user_message","message_id":"m1","content":"hello"}"#.into(),
    ))
    .await?;
    ws.send(Message::Text(r#"{"event":"interrupt"}"#.into())).await?;

    // Whatever the race with the null provider, the turn always ends with a
    // completing response.
    read_until(&mut ws, Duration::from_secs(5), |v| {
        v["event"] == "agent_response" && v["is_complete"] == true
    })
    .await?;
    Ok(())
}
