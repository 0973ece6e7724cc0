// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

use crate::provider::ProviderKind;

/// Session orchestrator for the AI desktop.
#[derive(Debug, Clone, Parser)]
#[command(name = "canopy", version, about)]
pub struct Config {
    /// HTTP/WebSocket port to listen on.
    #[arg(long, env = "CANOPY_PORT", default_value = "7420")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "CANOPY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Remote mode: require a bearer token on every connection. A token is
    /// generated at startup unless --auth-token is given.
    #[arg(long, env = "CANOPY_REMOTE")]
    pub remote: bool,

    /// Explicit bearer token (implies the token gate).
    #[arg(long, env = "CANOPY_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Outbound event ring capacity per session.
    #[arg(long, env = "CANOPY_RING_CAPACITY", default_value = "5000")]
    pub ring_capacity: usize,

    /// Main-agent queue capacity per monitor.
    #[arg(long, env = "CANOPY_MAIN_QUEUE_CAPACITY", default_value = "10")]
    pub main_queue_capacity: usize,

    /// Process-wide cap on concurrently live ephemeral agents.
    #[arg(long, env = "CANOPY_AGENT_LIMIT", default_value = "8")]
    pub agent_limit: usize,

    /// Directory for per-session persisted state (reload caches).
    #[arg(long, env = "CANOPY_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Default AI provider (null, agentd).
    #[arg(long, env = "CANOPY_PROVIDER", default_value = "null")]
    pub provider: String,

    /// Log format (json or text).
    #[arg(long, env = "CANOPY_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CANOPY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Provider subprocess command (after --), e.g. `-- agentd --stdio`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub provider_command: Vec<String>,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ring_capacity == 0 {
            anyhow::bail!("--ring-capacity must be positive");
        }
        if self.main_queue_capacity == 0 {
            anyhow::bail!("--main-queue-capacity must be positive");
        }
        if self.agent_limit == 0 {
            anyhow::bail!("--agent-limit must be positive");
        }
        let Some(kind) = ProviderKind::from_name(&self.provider) else {
            anyhow::bail!("unknown provider: {}", self.provider);
        };
        if kind == ProviderKind::Agentd && self.provider_command.is_empty() {
            anyhow::bail!("--provider agentd requires a provider command after --");
        }
        if self.log_format != "json" && self.log_format != "text" {
            anyhow::bail!("--log-format must be json or text");
        }
        Ok(())
    }

    pub fn provider_kind(&self) -> ProviderKind {
        ProviderKind::from_name(&self.provider).unwrap_or(ProviderKind::Null)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
