// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and WebSocket hosting for the orchestration core.

pub mod auth;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::hub::SessionHub;

/// Shared transport state.
pub struct ServerState {
    pub hub: Arc<SessionHub>,
    /// Bearer token required on HTTP routes and WS upgrades when set.
    pub auth_token: Option<String>,
}

/// JSON error body for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions: usize,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    sessions: Vec<SessionStatus>,
}

#[derive(Debug, Serialize)]
struct SessionStatus {
    id: String,
    connections: usize,
    windows: usize,
    queued_main: usize,
    queued_window: usize,
    inflight: usize,
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", sessions: state.hub.len() })
}

async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    let sessions = state
        .hub
        .session_ids()
        .into_iter()
        .filter_map(|id| state.hub.get(&id))
        .map(|session| {
            let stats = session.get_stats();
            SessionStatus {
                id: session.id().to_owned(),
                connections: session.connection_count(),
                windows: stats.windows,
                queued_main: stats.queued_main,
                queued_window: stats.queued_window,
                inflight: stats.inflight,
            }
        })
        .collect();
    Json(StatusResponse { sessions })
}

/// Build the router: health (auth-exempt), status, and the WS endpoint.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
