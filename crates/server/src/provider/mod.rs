// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AI provider interface.
//!
//! A provider owns one external process (or none) and yields turns as lazy
//! streams of [`StreamMessage`]s. One provider instance is shared by every
//! session that selects its kind; the process-level turn lock lives inside
//! the implementation so callers only ever see a stream.

pub mod null;
pub mod process;
pub mod turn_gate;

pub use null::NullProvider;
pub use process::ProcessProvider;
pub use turn_gate::TurnGate;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Known provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// In-process stand-in that completes every turn immediately.
    Null,
    /// JSON-over-stdio subprocess speaking the agentd dialect.
    Agentd,
}

impl ProviderKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Self::Null),
            "agentd" => Some(Self::Agentd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Agentd => "agentd",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a turn's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Text { delta: String, thread_id: Option<String> },
    Thinking { delta: String, thread_id: Option<String> },
    ToolUse { tool_name: String, tool_input: serde_json::Value, thread_id: Option<String> },
    ToolResult { tool_name: String, content: String, thread_id: Option<String> },
    Complete { thread_id: Option<String> },
    Error { message: String },
}

impl StreamMessage {
    /// Provider thread id carried by this message, if any.
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Self::Text { thread_id, .. }
            | Self::Thinking { thread_id, .. }
            | Self::ToolUse { thread_id, .. }
            | Self::ToolResult { thread_id, .. }
            | Self::Complete { thread_id } => thread_id.as_deref(),
            Self::Error { .. } => None,
        }
    }
}

/// Everything a provider needs to run one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Continue (or resume) this provider thread.
    pub thread_id: Option<String>,
    /// Fork a fresh thread from this parent instead of continuing one.
    pub fork_from: Option<String>,
    pub allowed_tools: Option<Vec<String>>,
    /// Opaque image payloads (base64) attached to the prompt.
    pub attachments: Vec<String>,
    /// Cancelling this token asks the provider to abort the turn; the stream
    /// then ends (usually with an `Error`).
    pub cancel: CancellationToken,
}

/// A turn-oriented AI provider. Implementations spawn their own pump task and
/// hand back the receiving end immediately; backpressure is the channel's.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin a turn. The stream ends after `Complete` or `Error`.
    fn start_turn(&self, request: TurnRequest) -> mpsc::Receiver<StreamMessage>;

    /// Inject content into a running turn. Returns false when the provider
    /// has no mid-turn injection support.
    fn steer(&self, _thread_id: Option<&str>, _content: &str) -> bool {
        false
    }

    /// Drop warm per-thread state (reset). Default: nothing to drop.
    fn reset_warm_state(&self) {}

    /// Terminate any external process. Called on shutdown.
    fn shutdown(&self) {}
}

/// Process-wide provider registry: one shared instance per kind, created
/// lazily so unused provider processes are never spawned.
pub struct ProviderRegistry {
    agentd_command: Vec<String>,
    providers: RwLock<HashMap<ProviderKind, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new(agentd_command: Vec<String>) -> Self {
        Self { agentd_command, providers: RwLock::new(HashMap::new()) }
    }

    pub fn get(&self, kind: ProviderKind) -> Arc<dyn Provider> {
        if let Some(provider) = self.providers.read().get(&kind) {
            return Arc::clone(provider);
        }
        let mut providers = self.providers.write();
        Arc::clone(providers.entry(kind).or_insert_with(|| match kind {
            ProviderKind::Null => Arc::new(NullProvider::new()),
            ProviderKind::Agentd => Arc::new(ProcessProvider::new(self.agentd_command.clone())),
        }))
    }

    pub fn shutdown(&self) {
        for provider in self.providers.read().values() {
            provider.shutdown();
        }
    }
}
