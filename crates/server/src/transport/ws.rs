// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoint: one connection, one session attachment.
//!
//! Inbound text frames are [`ClientEvent`] JSON; outbound frames are
//! sequence-stamped [`Envelope`]s. A connection that cannot be parsed is
//! logged and the frame dropped — a single client can never take the
//! process down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::{ClientEvent, Envelope};
use crate::session::LiveSession;
use crate::transport::{auth, ServerState};

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session to attach to; omitted means the default session.
    pub session: Option<String>,
    /// Bearer token (required in remote mode).
    pub token: Option<String>,
    /// Last sequence number the client saw; enables replay catch-up.
    pub last_seq: Option<u64>,
}

/// WebSocket upgrade handler. The token gate applies before the upgrade.
pub async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if auth::validate_ws_token(query.token.as_deref(), state.auth_token.as_deref()).is_err() {
        return axum::http::Response::builder()
            .status(401)
            .body(axum::body::Body::from("unauthorized"))
            .unwrap_or_default()
            .into_response();
    }

    let session = state.hub.get_or_create(query.session.as_deref());
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| {
        let conn_id = next_conn_id();
        handle_connection(socket, session, hub, conn_id, query.last_seq)
    })
    .into_response()
}

/// Per-connection loop: pump session events out, client events in.
async fn handle_connection(
    socket: WebSocket,
    session: Arc<LiveSession>,
    hub: Arc<crate::hub::SessionHub>,
    conn_id: String,
    last_seq: Option<u64>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Envelope>();
    session.handle_connect(&conn_id, event_tx, last_seq);
    debug!(conn = %conn_id, session = %session.id(), "connection attached");

    loop {
        tokio::select! {
            envelope = event_rx.recv() => {
                let Some(envelope) = envelope else {
                    break;
                };
                if send_json(&mut ws_tx, &envelope).await.is_err() {
                    break;
                }
            }
            frame = ws_rx.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(_)) | None => break,
                };
                match frame {
                    Message::Text(text) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => session.route_event(event, &conn_id).await,
                            Err(e) => {
                                warn!(conn = %conn_id, "ignoring unparseable client event: {e}");
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    session.handle_disconnect(&conn_id);
    let session_id = session.id().to_owned();
    drop(session);
    hub.remove_if_idle(&session_id).await;
    debug!(conn = %conn_id, "connection detached");
}

/// Serialize and send one envelope; transport failures end the connection.
async fn send_json<S>(tx: &mut S, envelope: &Envelope) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(envelope) {
        Ok(text) => text,
        Err(e) => {
            warn!("failed to serialize outbound event: {e}");
            return Ok(());
        }
    };
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

/// Process-unique connection id.
fn next_conn_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("ws-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
