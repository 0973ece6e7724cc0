// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live session: the durable logical context shared by every connection with
//! the same session id.
//!
//! Owns the sequencer, the window registry, the conversation tape, the
//! dispatcher, and the session's agents; routes inbound client events and
//! stamps every outbound event before fanout. A session outlives its
//! connections and is only destroyed by explicit hub removal.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent::{EventSink, ThreadStore};
use crate::broadcast::BroadcastCenter;
use crate::bus::{ActionBus, DialogOutcome, RenderingOutcome};
use crate::context_pool::{ContextPool, ContextPoolConfig, PoolSnapshot, Task, TaskKind};
use crate::error::ErrorCode;
use crate::groups::WindowConnectionPolicy;
use crate::prompt;
use crate::protocol::{
    ClientEvent, Envelope, InteractionKind, OsAction, ServerEvent, UserInteraction,
};
use crate::provider::{ProviderKind, ProviderRegistry};
use crate::registry::WindowStateRegistry;
use crate::reload::ReloadCache;
use crate::sequencer::EventSequencer;
use crate::tape::ContextTape;
use crate::timeline::InteractionTimeline;

/// Shared construction inputs for sessions, owned by the hub.
#[derive(Clone)]
pub struct SessionShared {
    pub center: Arc<BroadcastCenter>,
    pub bus: Arc<ActionBus>,
    pub providers: Arc<ProviderRegistry>,
    pub limiter: Arc<tokio::sync::Semaphore>,
    pub state_dir: Option<PathBuf>,
    pub ring_capacity: usize,
    pub main_queue_capacity: usize,
    pub default_provider: ProviderKind,
}

/// One logical session.
pub struct LiveSession {
    id: String,
    shared: SessionShared,
    sequencer: Mutex<EventSequencer>,
    tape: Arc<ContextTape>,
    timeline: Arc<InteractionTimeline>,
    registry: Arc<WindowStateRegistry>,
    groups: Arc<WindowConnectionPolicy>,
    reload: Arc<ReloadCache>,
    context: Arc<ContextPool>,
    /// Actions emitted per monitor, for budget observability.
    monitor_budgets: Mutex<HashMap<String, u64>>,
}

impl LiveSession {
    pub fn new(id: impl Into<String>, shared: SessionShared) -> Arc<Self> {
        let id = id.into();
        let tape = Arc::new(ContextTape::new());
        let timeline = Arc::new(InteractionTimeline::default());
        let registry = Arc::new(WindowStateRegistry::new());
        let groups = Arc::new(WindowConnectionPolicy::new());
        let reload = Arc::new(ReloadCache::new(
            shared.state_dir.as_ref().map(|dir| dir.join(&id)),
        ));
        let threads = Arc::new(ThreadStore::new());

        let session = Arc::new_cyclic(|weak: &Weak<LiveSession>| {
            let sink: EventSink = {
                let weak = weak.clone();
                Arc::new(move |event| {
                    if let Some(session) = weak.upgrade() {
                        session.broadcast(event);
                    }
                })
            };
            let context = ContextPool::new(ContextPoolConfig {
                tape: Arc::clone(&tape),
                timeline: Arc::clone(&timeline),
                registry: Arc::clone(&registry),
                groups: Arc::clone(&groups),
                reload: Arc::clone(&reload),
                threads,
                bus: Arc::clone(&shared.bus),
                sink,
                provider: shared.providers.get(shared.default_provider),
                limiter: Arc::clone(&shared.limiter),
                main_queue_capacity: shared.main_queue_capacity,
            });
            LiveSession {
                sequencer: Mutex::new(EventSequencer::new(shared.ring_capacity)),
                shared,
                tape,
                timeline,
                registry: Arc::clone(&registry),
                groups,
                reload,
                context,
                monitor_budgets: Mutex::new(HashMap::new()),
                id,
            }
        });

        // Window closes observed by the registry drive the close chain:
        // group membership, agent disposal, tape pruning, reload invalidation.
        let weak = Arc::downgrade(&session);
        session.registry.set_on_window_close(move |window_id| {
            if let Some(session) = weak.upgrade() {
                session.context.handle_window_close(window_id);
            }
        });
        info!(session = %session.id, "session created");
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // -- Outbound -------------------------------------------------------------

    /// Stamp and fan out one event. Agent-emitted actions are also folded
    /// into the window registry so the server's view tracks what clients
    /// were told.
    pub fn broadcast(&self, event: ServerEvent) {
        if let ServerEvent::Actions { actions, agent_id: Some(_), monitor_id } = &event {
            for action in actions {
                self.registry.handle_action(action);
            }
            if let Some(monitor) = monitor_id {
                *self.monitor_budgets.lock().entry(monitor.clone()).or_insert(0) +=
                    actions.len() as u64;
            }
        }

        let envelope = self.sequencer.lock().stamp(event);
        match envelope.event.monitor_id() {
            Some(monitor) => {
                let monitor = monitor.to_owned();
                self.shared.center.publish_to_monitor(&self.id, &monitor, &envelope);
            }
            None => {
                self.shared.center.publish_to_session(&self.id, &envelope);
            }
        }
    }

    /// Actions emitted so far per monitor.
    pub fn monitor_budget(&self, monitor_id: &str) -> u64 {
        self.monitor_budgets.lock().get(monitor_id).copied().unwrap_or(0)
    }

    // -- Connections ----------------------------------------------------------

    /// Attach a connection. When the client reports a `last_seq` and the ring
    /// still covers it, missed events are replayed; otherwise the connection
    /// gets a fresh snapshot of live windows.
    pub fn handle_connect(
        &self,
        conn_id: &str,
        tx: mpsc::UnboundedSender<Envelope>,
        last_seq: Option<u64>,
    ) {
        self.shared.center.subscribe(conn_id, tx, &self.id);

        let status = self.sequencer.lock().stamp(ServerEvent::ConnectionStatus {
            status: "connected".to_owned(),
            session_id: self.id.clone(),
        });
        self.shared.center.publish_to_connection(&status, conn_id);

        if let Some(last_seq) = last_seq {
            let replay = self.sequencer.lock().replay_after(last_seq);
            if let Some(events) = replay {
                debug!(conn = conn_id, count = events.len(), "replaying missed events");
                for envelope in events {
                    self.shared.center.publish_to_connection(&envelope, conn_id);
                }
                return;
            }
            debug!(conn = conn_id, last_seq, "client too far behind, snapshotting");
        }

        for envelope in self.generate_snapshot() {
            self.shared.center.publish_to_connection(&envelope, conn_id);
        }
    }

    pub fn handle_disconnect(&self, conn_id: &str) {
        self.shared.center.unsubscribe(conn_id);
    }

    /// Synthetic `window.create` actions for every live window, stamped for
    /// delivery to a joining connection.
    pub fn generate_snapshot(&self) -> Vec<Envelope> {
        let windows = self.registry.list_windows();
        if windows.is_empty() {
            return vec![];
        }
        let actions: Vec<OsAction> = windows
            .into_iter()
            .map(|w| OsAction::WindowCreate {
                window_id: w.id,
                title: w.title,
                bounds: w.bounds,
                content: w.content,
            })
            .collect();
        vec![self.sequencer.lock().stamp(ServerEvent::Actions {
            actions,
            agent_id: None,
            monitor_id: None,
        })]
    }

    // -- Inbound --------------------------------------------------------------

    /// Dispatch one client event. Never fails upward; bad input is logged,
    /// and answered with an `ERROR` event where clients can act on it.
    pub async fn route_event(self: &Arc<Self>, event: ClientEvent, conn_id: &str) {
        match event {
            ClientEvent::UserMessage { message_id, content, monitor_id, interactions } => {
                let task = Task {
                    kind: TaskKind::Main,
                    message_id,
                    window_id: None,
                    content,
                    interactions,
                    action_id: None,
                    monitor_id,
                };
                self.context.submit(task);
            }

            ClientEvent::WindowMessage { message_id, window_id, content } => {
                self.context.submit(Task::window(message_id, window_id, content));
            }

            ClientEvent::ComponentAction {
                window_id,
                action,
                action_id,
                form_id: _,
                form_data,
                component_path,
                window_title,
            } => {
                let title = window_title
                    .or_else(|| self.registry.get_window(&window_id).map(|w| w.title))
                    .unwrap_or_else(|| window_id.clone());
                let content = prompt::component_action_content(
                    &action,
                    &title,
                    component_path.as_deref(),
                    form_data.as_ref(),
                );
                let message_id = action_id
                    .clone()
                    .unwrap_or_else(|| format!("component-{}", uuid::Uuid::new_v4()));
                let mut task = Task::window(message_id, window_id, content);
                task.action_id = action_id;
                self.context.submit(task);
            }

            ClientEvent::Interrupt {} => {
                self.context.agents().interrupt_all();
            }

            ClientEvent::InterruptAgent { agent_id } => {
                self.context.agents().interrupt_by_role(&agent_id);
            }

            ClientEvent::Reset {} => {
                self.context.reset().await;
            }

            ClientEvent::SetProvider { provider } => match ProviderKind::from_name(&provider) {
                Some(kind) => {
                    info!(session = %self.id, provider = %kind, "switching provider");
                    self.context.agents().set_provider(self.shared.providers.get(kind));
                }
                None => {
                    self.broadcast(ServerEvent::error(
                        ErrorCode::BadRequest,
                        format!("unknown provider: {provider}"),
                    ));
                }
            },

            ClientEvent::RenderingFeedback {
                request_id,
                window_id,
                renderer: _,
                success,
                error,
                url,
                locked,
                image_data,
            } => {
                let outcome = RenderingOutcome { success, error, url, locked, image_data };
                let resolved = match self.context.agents().main_agent("monitor-0") {
                    Some(agent) => agent.handle_rendering_feedback(&request_id, outcome),
                    None => self.shared.bus.resolve_rendering(&request_id, outcome),
                };
                if !resolved {
                    debug!(request = %request_id, window = %window_id, "no pending rendering wait");
                }
            }

            ClientEvent::DialogFeedback { dialog_id, confirmed, remember_choice } => {
                if !self
                    .shared
                    .bus
                    .resolve_dialog(&dialog_id, DialogOutcome { confirmed, remember_choice })
                {
                    debug!(dialog = %dialog_id, "no pending dialog wait");
                }
            }

            ClientEvent::ToastAction { toast_id, event_id } => {
                debug!(toast = %toast_id, event = %event_id, "replay reported as failed");
                self.reload.mark_failed(&event_id);
            }

            ClientEvent::UserInteraction { interactions } => {
                for interaction in interactions {
                    self.apply_user_interaction(interaction);
                }
            }

            ClientEvent::AppProtocolResponse { request_id, window_id: _, response } => {
                if !self.shared.bus.resolve_app_response(&request_id, response) {
                    debug!(request = %request_id, "no pending app-protocol wait");
                }
            }

            ClientEvent::AppProtocolReady { window_id } => {
                let was_ready = self.registry.set_app_protocol(&window_id);
                if was_ready {
                    // Re-registration: the app reloaded, replay its history.
                    let commands = self.registry.get_app_commands(&window_id);
                    debug!(window = %window_id, count = commands.len(), "replaying app commands");
                    for command in commands {
                        self.broadcast(ServerEvent::AppProtocolRequest {
                            request_id: command.request_id,
                            window_id: command.window_id,
                            payload: command.payload,
                        });
                    }
                }
            }

            ClientEvent::SubscribeMonitor { monitor_id } => {
                self.shared.center.subscribe_to_monitor(conn_id, monitor_id);
            }
        }
    }

    /// Fold one end-user interaction into server state: registry (so restore
    /// reflects user moves and closes) and the timeline.
    fn apply_user_interaction(&self, interaction: UserInteraction) {
        info!(
            session = %self.id,
            kind = interaction.kind.as_str(),
            window = interaction.window_id.as_deref().unwrap_or("-"),
            "user interaction"
        );

        if let Some(window_id) = interaction.window_id.clone() {
            let synthetic = match (interaction.kind, &interaction.bounds) {
                (InteractionKind::WindowClose, _) => {
                    Some(OsAction::WindowClose { window_id })
                }
                (InteractionKind::WindowMove, Some(bounds)) => {
                    Some(OsAction::WindowMove { window_id, x: bounds.x, y: bounds.y })
                }
                (InteractionKind::WindowResize, Some(bounds)) => Some(OsAction::WindowResize {
                    window_id,
                    width: bounds.width,
                    height: bounds.height,
                }),
                _ => None,
            };
            if let Some(action) = synthetic {
                self.registry.handle_action(&action);
            }
        }

        // Draw is skipped by the timeline itself (travels as an attachment).
        self.timeline.push_user(interaction);
    }

    // -- Introspection / lifecycle -------------------------------------------

    pub fn get_stats(&self) -> PoolSnapshot {
        self.context.get_stats()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.center.connection_count(&self.id)
    }

    pub fn registry(&self) -> &Arc<WindowStateRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &Arc<ContextPool> {
        &self.context
    }

    pub fn tape(&self) -> &Arc<ContextTape> {
        &self.tape
    }

    /// Dispose the session's agents and state. Called by the hub on removal.
    pub async fn cleanup(&self) {
        if self.context.is_resetting() {
            warn!(session = %self.id, "cleanup while reset in progress");
        }
        self.context.cleanup().await;
        self.groups.clear();
        info!(session = %self.id, "session cleaned up");
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
