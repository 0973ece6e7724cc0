// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One AI worker: a provider thread plus the machinery that serializes its
//! turns and maps the provider stream onto outbound events.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{next_instance_id, ActionBus, RenderingOutcome};
use crate::error::ErrorCode;
use crate::protocol::{OsAction, ServerEvent, UserInteraction};
use crate::provider::{Provider, StreamMessage, TurnRequest};
use crate::tape::{ContextTape, Source};

use super::{EventSink, ThreadStore};

/// Per-turn options for [`AgentSession::handle_message`].
#[derive(Clone)]
pub struct AgentOptions {
    /// Human-meaningful label (`main-<mid>`, `ephemeral-<mid>`,
    /// `window-<wid>`, `window-<wid>/<aid>`), surfaced as the event
    /// `agent_id`.
    pub role: String,
    pub source: Source,
    pub message_id: String,
    /// Stable name used for thread-id persistence across agent instances.
    pub canonical_agent: String,
    pub monitor_id: Option<String>,
    /// Adopt this provider thread; honored on the agent's first turn only.
    pub resume_thread_id: Option<String>,
    /// Fork a fresh provider thread from this parent instead of continuing.
    pub fork_parent_thread: Option<String>,
    pub interactions: Vec<UserInteraction>,
    pub allowed_tools: Option<Vec<String>>,
    pub system_prompt_override: Option<String>,
    /// When false (ephemeral overflow turns), the response is not appended
    /// to the tape as an assistant message.
    pub record_assistant: bool,
}

impl AgentOptions {
    pub fn new(
        role: impl Into<String>,
        message_id: impl Into<String>,
        source: Source,
        canonical_agent: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            source,
            message_id: message_id.into(),
            canonical_agent: canonical_agent.into(),
            monitor_id: None,
            resume_thread_id: None,
            fork_parent_thread: None,
            interactions: vec![],
            allowed_tools: None,
            system_prompt_override: None,
            record_assistant: true,
        }
    }
}

/// What a completed (or aborted) turn produced.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub response_text: String,
    pub recorded_actions: Vec<OsAction>,
    pub interrupted: bool,
    pub errored: bool,
}

/// One AI-provider worker.
///
/// An `AgentSession` owns at most one provider thread id and runs at most
/// one turn at a time; callers that need parallelism use separate instances.
/// Tool-emitted actions arrive over the action bus, filtered by this
/// instance's id, and are both recorded for the reload cache and republished
/// on the outbound stream.
pub struct AgentSession {
    instance_id: u64,
    provider: parking_lot::RwLock<Arc<dyn Provider>>,
    thread_id: parking_lot::Mutex<Option<String>>,
    role: parking_lot::Mutex<Option<String>>,
    running: AtomicBool,
    pending_turns: AtomicUsize,
    reserved: AtomicUsize,
    current_message_id: parking_lot::Mutex<Option<String>>,
    current_monitor: parking_lot::Mutex<Option<String>>,
    recorded: parking_lot::Mutex<Vec<OsAction>>,
    cancel: parking_lot::Mutex<CancellationToken>,
    turn_lock: tokio::sync::Mutex<()>,
    bus: Arc<ActionBus>,
    tape: Arc<ContextTape>,
    sink: EventSink,
    threads: Arc<ThreadStore>,
    bus_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AgentSession {
    /// Build an agent and subscribe it to the action bus.
    pub fn new(
        provider: Arc<dyn Provider>,
        bus: Arc<ActionBus>,
        tape: Arc<ContextTape>,
        sink: EventSink,
        threads: Arc<ThreadStore>,
    ) -> Arc<Self> {
        let agent = Arc::new(Self {
            instance_id: next_instance_id(),
            provider: parking_lot::RwLock::new(provider),
            thread_id: parking_lot::Mutex::new(None),
            role: parking_lot::Mutex::new(None),
            running: AtomicBool::new(false),
            pending_turns: AtomicUsize::new(0),
            reserved: AtomicUsize::new(0),
            current_message_id: parking_lot::Mutex::new(None),
            current_monitor: parking_lot::Mutex::new(None),
            recorded: parking_lot::Mutex::new(vec![]),
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
            turn_lock: tokio::sync::Mutex::new(()),
            bus: Arc::clone(&bus),
            tape,
            sink,
            threads,
            bus_task: parking_lot::Mutex::new(None),
        });

        let task = tokio::spawn(Self::pump_bus(Arc::downgrade(&agent), bus.subscribe()));
        *agent.bus_task.lock() = Some(task);
        agent
    }

    /// Bus pump: record and republish actions addressed to this instance.
    /// Holds only a weak reference so a disposed agent's task dies with it.
    async fn pump_bus(
        weak: std::sync::Weak<Self>,
        mut rx: tokio::sync::broadcast::Receiver<crate::bus::BusAction>,
    ) {
        loop {
            match rx.recv().await {
                Ok(bus_action) => {
                    let Some(agent) = weak.upgrade() else {
                        break;
                    };
                    if bus_action.instance_id != agent.instance_id {
                        continue;
                    }
                    agent.recorded.lock().push(bus_action.action.clone());
                    let agent_id = agent.role.lock().clone();
                    let monitor_id = agent.current_monitor.lock().clone();
                    (agent.sink)(ServerEvent::Actions {
                        actions: vec![bus_action.action],
                        agent_id,
                        monitor_id,
                    });
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "agent bus receiver lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn role(&self) -> Option<String> {
        self.role.lock().clone()
    }

    pub fn thread_id(&self) -> Option<String> {
        self.thread_id.lock().clone()
    }

    /// Whether a turn is in flight, waiting, or reserved on this agent.
    pub fn is_busy(&self) -> bool {
        self.pending_turns.load(Ordering::SeqCst) > 0
            || self.reserved.load(Ordering::SeqCst) > 0
    }

    /// Claim this agent for an upcoming turn before the turn task is
    /// scheduled, so dispatch decisions made in between see it as busy.
    pub fn reserve(&self) {
        self.reserved.fetch_add(1, Ordering::SeqCst);
    }

    /// Release a [`reserve`](Self::reserve) claim.
    pub fn unreserve(&self) {
        let _ = self.reserved.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
            Some(v.saturating_sub(1))
        });
    }

    /// Run one turn to completion, interruption, or error.
    ///
    /// Emits `AGENT_THINKING` before the provider is engaged and, on every
    /// exit path, a final `AGENT_RESPONSE { is_complete: true }` so clients
    /// always clear their agent indicator.
    pub async fn handle_message(&self, prompt: String, opts: AgentOptions) -> TurnOutcome {
        self.pending_turns.fetch_add(1, Ordering::SeqCst);
        let _turn = self.turn_lock.lock().await;
        self.running.store(true, Ordering::SeqCst);
        *self.role.lock() = Some(opts.role.clone());
        *self.current_message_id.lock() = Some(opts.message_id.clone());
        *self.current_monitor.lock() = opts.monitor_id.clone();
        self.recorded.lock().clear();
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        let agent_id = Some(opts.role.clone());
        (self.sink)(ServerEvent::AgentThinking {
            content: String::new(),
            agent_id: agent_id.clone(),
            message_id: Some(opts.message_id.clone()),
        });

        // A saved resume id is adopted once, on the agent's first turn.
        let thread_id = {
            let mut thread = self.thread_id.lock();
            if thread.is_none() {
                *thread = opts.resume_thread_id.clone();
            }
            thread.clone()
        };

        // Drawn-region images travel out-of-band as attachments.
        let attachments: Vec<String> =
            opts.interactions.iter().filter_map(|i| i.image_data.clone()).collect();
        let request = TurnRequest {
            prompt,
            system_prompt: opts.system_prompt_override.clone(),
            thread_id,
            fork_from: opts.fork_parent_thread.clone(),
            allowed_tools: opts.allowed_tools.clone(),
            attachments,
            cancel: cancel.clone(),
        };
        let provider = Arc::clone(&self.provider.read());
        let mut stream = provider.start_turn(request);

        let mut outcome = TurnOutcome::default();
        let mut thinking_text = String::new();

        loop {
            let message = tokio::select! {
                message = stream.recv() => message,
                _ = cancel.cancelled() => {
                    outcome.interrupted = true;
                    (self.sink)(ServerEvent::error(ErrorCode::Interrupted, "Turn was interrupted"));
                    break;
                }
            };
            let Some(message) = message else {
                // Stream closed without Complete: treat as a clean exit.
                break;
            };

            if let Some(new_thread) = message.thread_id() {
                self.adopt_thread(new_thread, &opts.canonical_agent);
            }

            match message {
                StreamMessage::Text { delta, .. } => {
                    outcome.response_text.push_str(&delta);
                    (self.sink)(ServerEvent::AgentResponse {
                        content: outcome.response_text.clone(),
                        is_complete: false,
                        message_id: opts.message_id.clone(),
                        agent_id: agent_id.clone(),
                    });
                }
                StreamMessage::Thinking { delta, .. } => {
                    thinking_text.push_str(&delta);
                    (self.sink)(ServerEvent::AgentThinking {
                        content: thinking_text.clone(),
                        agent_id: agent_id.clone(),
                        message_id: Some(opts.message_id.clone()),
                    });
                }
                StreamMessage::ToolUse { tool_name, .. } => {
                    (self.sink)(ServerEvent::ToolProgress {
                        tool: tool_name,
                        status: crate::protocol::ToolStatus::Running,
                        agent_id: agent_id.clone(),
                    });
                }
                StreamMessage::ToolResult { tool_name, .. } => {
                    (self.sink)(ServerEvent::ToolProgress {
                        tool: tool_name,
                        status: crate::protocol::ToolStatus::Complete,
                        agent_id: agent_id.clone(),
                    });
                }
                StreamMessage::Complete { .. } => {
                    if !outcome.response_text.is_empty() && opts.record_assistant {
                        self.tape.append_assistant(outcome.response_text.clone(), opts.source.clone());
                    }
                    break;
                }
                StreamMessage::Error { message } => {
                    debug!(role = %opts.role, "provider stream error: {message}");
                    outcome.errored = true;
                    (self.sink)(ServerEvent::error(ErrorCode::Internal, message));
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        (self.sink)(ServerEvent::AgentResponse {
            content: outcome.response_text.clone(),
            is_complete: true,
            message_id: opts.message_id.clone(),
            agent_id,
        });
        outcome.recorded_actions = std::mem::take(&mut *self.recorded.lock());
        self.pending_turns.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn adopt_thread(&self, thread_id: &str, canonical_agent: &str) {
        let mut thread = self.thread_id.lock();
        if thread.as_deref() != Some(thread_id) {
            *thread = Some(thread_id.to_owned());
        }
        self.threads.save(canonical_agent, thread_id);
    }

    /// Inject content into the running turn when the provider supports it.
    pub fn steer(&self, content: &str) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let provider = Arc::clone(&self.provider.read());
        provider.steer(self.thread_id.lock().as_deref(), content)
    }

    /// Stop the current turn. The message loop exits at its next yield and
    /// still emits the final `AGENT_RESPONSE`.
    pub fn interrupt(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.lock().cancel();
    }

    /// Swap providers; the thread id belongs to the old provider and is
    /// dropped with it.
    pub fn set_provider(&self, provider: Arc<dyn Provider>) {
        self.interrupt();
        *self.provider.write() = provider;
        *self.thread_id.lock() = None;
    }

    /// Resolve a pending rendering wait on behalf of tool code.
    pub fn handle_rendering_feedback(&self, request_id: &str, outcome: RenderingOutcome) -> bool {
        self.bus.resolve_rendering(request_id, outcome)
    }

    /// Interrupt and detach from the bus.
    pub fn cleanup(&self) {
        self.interrupt();
        if let Some(task) = self.bus_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        if let Some(task) = self.bus_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
