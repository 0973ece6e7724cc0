// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process wiring: logging, shared state, the axum server, shutdown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::broadcast::BroadcastCenter;
use crate::bus::ActionBus;
use crate::config::Config;
use crate::hub::SessionHub;
use crate::provider::ProviderRegistry;
use crate::session::SessionShared;
use crate::transport::{router, ServerState};

/// Install the tracing subscriber per config.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Build the shared session machinery from config.
pub fn build_hub(config: &Config) -> Arc<SessionHub> {
    let providers = Arc::new(ProviderRegistry::new(config.provider_command.clone()));
    Arc::new(SessionHub::new(SessionShared {
        center: Arc::new(BroadcastCenter::new()),
        bus: Arc::new(ActionBus::new()),
        providers,
        limiter: Arc::new(tokio::sync::Semaphore::new(config.agent_limit)),
        state_dir: config.state_dir.clone(),
        ring_capacity: config.ring_capacity,
        main_queue_capacity: config.main_queue_capacity,
        default_provider: config.provider_kind(),
    }))
}

/// Resolve the bearer token for remote mode, minting one when needed.
pub fn resolve_auth_token(config: &Config) -> Option<String> {
    if let Some(ref token) = config.auth_token {
        return Some(token.clone());
    }
    if config.remote {
        let token = uuid::Uuid::new_v4().to_string();
        // The operator needs the token once, at startup.
        println!("canopy auth token: {token}");
        return Some(token);
    }
    None
}

/// Run the server until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let hub = build_hub(&config);
    let auth_token = resolve_auth_token(&config);
    let state = Arc::new(ServerState { hub: Arc::clone(&hub), auth_token });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, provider = %config.provider, "canopy listening");

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_shutdown.cancel();
        }
    });

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await?;

    // Dispose sessions, then providers.
    for id in hub.session_ids() {
        let _ = hub.remove(&id).await;
    }
    hub.shared().providers.shutdown();
    info!("canopy stopped");
    Ok(())
}
