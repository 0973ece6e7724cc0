// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task dispatcher.
//!
//! Routes each inbound task to an agent class — the monitor's main agent, a
//! limiter-gated ephemeral, or a window-group agent — assembles its prompt
//! (reload candidates, drained timeline, main-conversation excerpt), invokes
//! the agent, and performs the bookkeeping around the turn: tape appends,
//! reload recording, child-window grouping, queue draining.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::agent::pool::{AgentDeps, PoolStats};
use crate::agent::{AgentOptions, AgentPool, AgentSession, EventSink, ThreadStore};
use crate::bus::ActionBus;
use crate::error::ErrorCode;
use crate::groups::WindowConnectionPolicy;
use crate::prompt;
use crate::protocol::{OsAction, ServerEvent, UserInteraction};
use crate::provider::Provider;
use crate::queues::{MainQueue, WindowQueues};
use crate::registry::WindowStateRegistry;
use crate::reload::{build_fingerprint, ReloadCache};
use crate::tape::{ContextTape, Source};
use crate::timeline::InteractionTimeline;

pub const DEFAULT_MONITOR: &str = "monitor-0";

/// How many reload candidates are injected into a prompt.
const RELOAD_MATCH_LIMIT: usize = 3;

/// A unit of work routed through the pool. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct Task {
    pub kind: TaskKind,
    pub message_id: String,
    pub window_id: Option<String>,
    pub content: String,
    pub interactions: Vec<UserInteraction>,
    pub action_id: Option<String>,
    pub monitor_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Main,
    Window,
}

impl Task {
    pub fn main(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Main,
            message_id: message_id.into(),
            window_id: None,
            content: content.into(),
            interactions: vec![],
            action_id: None,
            monitor_id: None,
        }
    }

    pub fn window(
        message_id: impl Into<String>,
        window_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: TaskKind::Window,
            message_id: message_id.into(),
            window_id: Some(window_id.into()),
            content: content.into(),
            interactions: vec![],
            action_id: None,
            monitor_id: None,
        }
    }

    fn monitor(&self) -> String {
        self.monitor_id.clone().unwrap_or_else(|| DEFAULT_MONITOR.to_owned())
    }
}

/// Counter + wakeup for draining in-flight task functions on reset.
///
/// Backed by a watch channel so a waiter that subscribes after the last exit
/// still observes zero immediately.
struct Inflight {
    count: watch::Sender<usize>,
}

impl Default for Inflight {
    fn default() -> Self {
        Self { count: watch::channel(0).0 }
    }
}

impl Inflight {
    fn enter(&self) {
        self.count.send_modify(|count| *count += 1);
    }

    fn exit(&self) {
        self.count.send_modify(|count| *count = count.saturating_sub(1));
    }

    async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // Only fails when the sender is dropped, which cannot outlive us.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    fn active(&self) -> usize {
        *self.count.borrow()
    }
}

/// Aggregate counters for status reporting and tests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolSnapshot {
    pub queued_main: usize,
    pub queued_window: usize,
    pub inflight: usize,
    pub windows: usize,
    pub tape_messages: usize,
    pub timeline_entries: usize,
    pub agents: PoolStats,
}

/// The dispatcher owning a session's agents, queues, and bookkeeping.
pub struct ContextPool {
    agents: AgentPool,
    tape: Arc<ContextTape>,
    timeline: Arc<InteractionTimeline>,
    registry: Arc<WindowStateRegistry>,
    groups: Arc<WindowConnectionPolicy>,
    reload: Arc<ReloadCache>,
    threads: Arc<ThreadStore>,
    bus: Arc<ActionBus>,
    sink: EventSink,
    main_queues: Mutex<HashMap<String, Arc<MainQueue<Task>>>>,
    window_queues: WindowQueues<Task>,
    main_queue_capacity: usize,
    inflight: Inflight,
    resetting: AtomicBool,
}

/// Construction inputs shared with the owning session.
pub struct ContextPoolConfig {
    pub tape: Arc<ContextTape>,
    pub timeline: Arc<InteractionTimeline>,
    pub registry: Arc<WindowStateRegistry>,
    pub groups: Arc<WindowConnectionPolicy>,
    pub reload: Arc<ReloadCache>,
    pub threads: Arc<ThreadStore>,
    pub bus: Arc<ActionBus>,
    pub sink: EventSink,
    pub provider: Arc<dyn Provider>,
    pub limiter: Arc<tokio::sync::Semaphore>,
    pub main_queue_capacity: usize,
}

impl ContextPool {
    pub fn new(config: ContextPoolConfig) -> Arc<Self> {
        let deps = AgentDeps {
            bus: Arc::clone(&config.bus),
            tape: Arc::clone(&config.tape),
            sink: Arc::clone(&config.sink),
            threads: Arc::clone(&config.threads),
        };
        let agents = AgentPool::new(deps, config.provider, config.limiter);
        // The default main agent exists from birth.
        agents.create_main_agent();
        Arc::new(Self {
            agents,
            tape: config.tape,
            timeline: config.timeline,
            registry: config.registry,
            groups: config.groups,
            reload: config.reload,
            threads: config.threads,
            bus: config.bus,
            sink: config.sink,
            main_queues: Mutex::new(HashMap::new()),
            window_queues: WindowQueues::new(),
            main_queue_capacity: config.main_queue_capacity,
            inflight: Inflight::default(),
            resetting: AtomicBool::new(false),
        })
    }

    pub fn agents(&self) -> &AgentPool {
        &self.agents
    }

    fn emit(&self, event: ServerEvent) {
        (self.sink)(event);
    }

    fn main_queue(&self, monitor: &str) -> Arc<MainQueue<Task>> {
        Arc::clone(
            self.main_queues
                .lock()
                .entry(monitor.to_owned())
                .or_insert_with(|| Arc::new(MainQueue::new(self.main_queue_capacity))),
        )
    }

    /// Route a task. Tasks observed while a reset is in progress are
    /// rejected silently with a log entry.
    pub fn submit(self: &Arc<Self>, task: Task) {
        if self.resetting.load(Ordering::SeqCst) {
            debug!(message = %task.message_id, "dropping task during reset");
            return;
        }
        match task.kind {
            TaskKind::Main => self.submit_main(task),
            TaskKind::Window => self.submit_window(task),
        }
    }

    // -- Main path ------------------------------------------------------------

    fn submit_main(self: &Arc<Self>, task: Task) {
        let monitor = task.monitor();
        let Some(agent) = self.agents.create_monitor_agent(&monitor) else {
            self.emit(ServerEvent::error(
                ErrorCode::BadRequest,
                format!("monitor limit reached, cannot serve {monitor}"),
            ));
            return;
        };

        // Tape appends happen at enqueue time so user messages stay monotonic
        // even when overflow turns run in parallel.
        self.tape.append_user(task.content.clone(), Source::Main);

        if !agent.is_busy() {
            let role = format!("main-{}", task.message_id);
            self.emit(ServerEvent::MessageAccepted {
                message_id: task.message_id.clone(),
                agent_id: role,
            });
            agent.reserve();
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                pool.run_main_chain(agent, task, monitor).await;
            });
            return;
        }

        if let Some(ephemeral) = self.agents.create_ephemeral() {
            let role = format!("ephemeral-{}", task.message_id);
            self.emit(ServerEvent::MessageAccepted {
                message_id: task.message_id.clone(),
                agent_id: role,
            });
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                pool.run_ephemeral_task(ephemeral, task, monitor).await;
            });
            return;
        }

        let queue = self.main_queue(&monitor);
        match queue.enqueue(task.clone()) {
            Ok(position) => {
                self.emit(ServerEvent::MessageQueued {
                    message_id: task.message_id,
                    position,
                });
            }
            Err(_) => {
                warn!(message = %task.message_id, monitor = %monitor, "main queue overflow");
                self.emit(ServerEvent::error(
                    ErrorCode::QueueFull,
                    format!(
                        "The main agent queue is full ({} pending); message {} was dropped.",
                        self.main_queue_capacity, task.message_id
                    ),
                ));
            }
        }
    }

    /// One main turn plus a drain of the monitor's queue, all under a single
    /// reservation so dispatch never sees a gap between queued turns.
    async fn run_main_chain(self: Arc<Self>, agent: Arc<AgentSession>, task: Task, monitor: String) {
        self.run_main_turn(&agent, task, &monitor).await;

        let queue = self.main_queue(&monitor);
        if queue.begin_processing() {
            while let Some(next) = queue.dequeue() {
                if self.resetting.load(Ordering::SeqCst) {
                    break;
                }
                self.run_main_turn(&agent, next, &monitor).await;
            }
            queue.end_processing();
        }
        agent.unreserve();

        // A task enqueued between the final dequeue and the unreserve would
        // otherwise sit until the next main turn.
        self.kick_main_queue(&monitor);
    }

    fn kick_main_queue(self: &Arc<Self>, monitor: &str) {
        let queue = self.main_queue(monitor);
        if queue.is_empty() {
            return;
        }
        let Some(agent) = self.agents.main_agent(monitor) else {
            return;
        };
        if agent.is_busy() {
            return;
        }
        if let Some(task) = queue.dequeue() {
            agent.reserve();
            let pool = Arc::clone(self);
            let monitor = monitor.to_owned();
            tokio::spawn(async move {
                pool.run_main_chain(agent, task, monitor).await;
            });
        }
    }

    async fn run_main_turn(&self, agent: &Arc<AgentSession>, task: Task, monitor: &str) {
        self.inflight.enter();

        let snapshot = self.registry.list_windows();
        let fingerprint = build_fingerprint(&task.content, monitor, None, &snapshot);
        let matches = self.reload.find_matches(&fingerprint, RELOAD_MATCH_LIMIT);
        let reload_block = ReloadCache::format_reload_options(&matches);
        let timeline_block = prompt::interactions_block(&self.timeline.drain_for_main());
        let full_prompt = prompt::compose(&[reload_block, timeline_block], &task.content);

        let canonical = format!("default/{monitor}");
        let mut options = AgentOptions::new(
            format!("main-{}", task.message_id),
            task.message_id.clone(),
            Source::Main,
            canonical.clone(),
        );
        options.monitor_id = Some(monitor.to_owned());
        options.resume_thread_id = self.threads.take(&canonical);
        options.interactions = task.interactions.clone();

        let outcome = agent.handle_message(full_prompt, options).await;
        if !outcome.interrupted && !outcome.errored {
            self.reload.maybe_record(fingerprint, outcome.recorded_actions, None);
        }

        self.inflight.exit();
    }

    /// Ephemeral variant: no timeline drain, no assistant tape entry; the
    /// turn instead reports itself to the timeline so the persistent main
    /// agent learns about the side effect next turn.
    async fn run_ephemeral_task(self: Arc<Self>, agent: Arc<AgentSession>, task: Task, monitor: String) {
        self.inflight.enter();

        let snapshot = self.registry.list_windows();
        let fingerprint = build_fingerprint(&task.content, &monitor, None, &snapshot);
        let matches = self.reload.find_matches(&fingerprint, RELOAD_MATCH_LIMIT);
        let reload_block = ReloadCache::format_reload_options(&matches);
        let full_prompt = prompt::compose(&[reload_block], &task.content);

        let role = format!("ephemeral-{}", task.message_id);
        let mut options = AgentOptions::new(
            role.clone(),
            task.message_id.clone(),
            Source::Main,
            format!("ephemeral/{}", task.message_id),
        );
        options.monitor_id = Some(monitor.clone());
        options.interactions = task.interactions.clone();
        options.record_assistant = false;

        let outcome = agent.handle_message(full_prompt, options).await;
        if !outcome.interrupted && !outcome.errored {
            self.reload
                .maybe_record(fingerprint, outcome.recorded_actions.clone(), None);
        }
        let summary: String = task.content.chars().take(100).collect();
        self.timeline.push_ai(role, &summary, outcome.recorded_actions, None);

        self.agents.dispose_ephemeral(&agent);
        self.inflight.exit();
    }

    // -- Window path ----------------------------------------------------------

    fn submit_window(self: &Arc<Self>, task: Task) {
        let Some(window_id) = task.window_id.clone() else {
            warn!(message = %task.message_id, "window task without window id dropped");
            return;
        };
        let agent_key = self.groups.group_id(&window_id).unwrap_or_else(|| window_id.clone());

        let role = match &task.action_id {
            Some(action_id) => format!("window-{window_id}/{action_id}"),
            None => format!("window-{window_id}"),
        };

        // Parallel (action-id) tasks bypass the queue entirely.
        if task.action_id.is_none() {
            if self.window_queues.is_processing(&agent_key) {
                let position = self.window_queues.enqueue(&agent_key, task.clone());
                self.emit(ServerEvent::MessageQueued {
                    message_id: task.message_id,
                    position,
                });
                return;
            }
            self.window_queues.set_processing(&agent_key, true);
        }

        self.emit(ServerEvent::MessageAccepted {
            message_id: task.message_id.clone(),
            agent_id: role,
        });

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            pool.run_window_chain(task, agent_key).await;
        });
    }

    /// One window turn plus, for queue-ordered tasks, a drain of the group's
    /// queue. The processing flag stays set for the whole chain.
    async fn run_window_chain(self: Arc<Self>, task: Task, agent_key: String) {
        let parallel = task.action_id.is_some();
        self.run_window_turn(task, &agent_key).await;
        if parallel {
            return;
        }
        while let Some(next) = self.window_queues.finish_or_next(&agent_key) {
            if self.resetting.load(Ordering::SeqCst) {
                self.window_queues.set_processing(&agent_key, false);
                break;
            }
            self.emit(ServerEvent::MessageAccepted {
                message_id: next.message_id.clone(),
                agent_id: format!("window-{}", next.window_id.as_deref().unwrap_or(&agent_key)),
            });
            self.run_window_turn(next, &agent_key).await;
        }
    }

    async fn run_window_turn(&self, task: Task, agent_key: &str) {
        self.inflight.enter();

        let Some(window_id) = task.window_id.clone() else {
            self.inflight.exit();
            return;
        };
        let monitor = task.monitor();
        let parallel = task.action_id.is_some();
        let role = match &task.action_id {
            Some(action_id) => format!("window-{window_id}/{action_id}"),
            None => format!("window-{window_id}"),
        };
        let canonical = format!("window-{agent_key}");

        // Parallel tasks run on a transient agent forked off the group's
        // thread, so they never mutate the persistent thread's state.
        let (agent, fork_parent) = if parallel {
            let parent = self.agents.window_agent(agent_key).and_then(|a| a.thread_id());
            (self.agents.create_transient(), parent)
        } else {
            (self.agents.get_or_create_window_agent(agent_key), None)
        };

        self.emit(ServerEvent::WindowAgentStatus {
            window_id: window_id.clone(),
            agent_id: role.clone(),
            status: crate::protocol::AgentPhase::Assigned,
        });
        self.emit(ServerEvent::WindowAgentStatus {
            window_id: window_id.clone(),
            agent_id: role.clone(),
            status: crate::protocol::AgentPhase::Active,
        });

        let snapshot = self.registry.list_windows();
        let fingerprint = build_fingerprint(&task.content, &monitor, Some(&window_id), &snapshot);
        let matches = self.reload.find_matches(&fingerprint, RELOAD_MATCH_LIMIT);
        let reload_block = ReloadCache::format_reload_options(&matches);

        self.tape.append_user(task.content.clone(), Source::window(&window_id));

        // First turn of a fresh group agent with no saved thread: bootstrap
        // it with the recent main conversation it would otherwise lack.
        let resume_thread_id =
            if parallel { None } else { self.threads.take(&canonical) };
        let needs_bootstrap = !parallel
            && agent.thread_id().is_none()
            && resume_thread_id.is_none();
        let excerpt_block = if needs_bootstrap {
            prompt::main_excerpt(&self.tape.snapshot())
        } else {
            String::new()
        };
        let full_prompt = prompt::compose(&[excerpt_block, reload_block], &task.content);

        let mut options = AgentOptions::new(
            role.clone(),
            task.message_id.clone(),
            Source::window(&window_id),
            if parallel { format!("{canonical}/{}", task.action_id.clone().unwrap_or_default()) } else { canonical },
        );
        options.monitor_id = Some(monitor);
        options.resume_thread_id = resume_thread_id;
        options.fork_parent_thread = fork_parent;
        options.interactions = task.interactions.clone();

        let outcome = agent.handle_message(full_prompt, options).await;

        if !outcome.interrupted && !outcome.errored {
            self.reload.maybe_record(
                fingerprint,
                outcome.recorded_actions.clone(),
                Some(window_id.clone()),
            );
        }
        // Children created during this turn join the creator's group.
        for action in &outcome.recorded_actions {
            if let OsAction::WindowCreate { window_id: child, .. } = action {
                self.groups.connect_window(&window_id, child);
            }
        }
        let summary: String = task.content.chars().take(100).collect();
        self.timeline.push_ai(
            role.clone(),
            &summary,
            outcome.recorded_actions,
            Some(window_id.clone()),
        );

        self.emit(ServerEvent::WindowAgentStatus {
            window_id,
            agent_id: role,
            status: crate::protocol::AgentPhase::Released,
        });

        if parallel {
            agent.cleanup();
        }
        self.inflight.exit();
    }

    // -- Window close ---------------------------------------------------------

    /// React to a window close (AI action or user interaction): dispose the
    /// group's agent when the last member is gone, prune the tape, and
    /// invalidate reload entries touching the window.
    pub fn handle_window_close(&self, window_id: &str) {
        // Resolve the group before membership mutates.
        let agent_key = self.groups.group_id(window_id).unwrap_or_else(|| window_id.to_owned());

        self.timeline.push_ai(
            format!("window-{window_id}"),
            &format!("window {window_id} closed"),
            vec![OsAction::WindowClose { window_id: window_id.to_owned() }],
            Some(window_id.to_owned()),
        );

        let outcome = self.groups.handle_close(window_id);
        if outcome.should_dispose_agent {
            self.agents.dispose_window_agent(&agent_key);
        }
        let pruned = self.tape.prune_window(window_id);
        if pruned > 0 {
            debug!(window = window_id, pruned, "pruned window messages");
        }
        self.reload.invalidate_for_window(window_id);
    }

    // -- Reset / cleanup ------------------------------------------------------

    /// Tear down all in-flight work and state, then recreate the default
    /// main agent.
    pub async fn reset(&self) {
        self.teardown().await;
        self.agents.create_main_agent();
        self.resetting.store(false, Ordering::SeqCst);
        info!("context pool reset complete");
    }

    /// Tear down without recreating anything (session disposal).
    pub async fn cleanup(&self) {
        self.teardown().await;
        self.resetting.store(false, Ordering::SeqCst);
    }

    async fn teardown(&self) {
        self.resetting.store(true, Ordering::SeqCst);

        for queue in self.main_queues.lock().values() {
            queue.clear();
        }
        self.window_queues.clear();
        self.bus.fail_pending();
        self.agents.interrupt_all();
        self.inflight.wait().await;

        self.agents.provider().reset_warm_state();

        // Tell clients every window is gone before the map is wiped.
        let closes: Vec<OsAction> = self
            .registry
            .list_windows()
            .into_iter()
            .map(|w| OsAction::WindowClose { window_id: w.id })
            .collect();
        if !closes.is_empty() {
            self.emit(ServerEvent::Actions { actions: closes, agent_id: None, monitor_id: None });
        }

        self.agents.cleanup();
        self.tape.clear();
        self.timeline.clear();
        self.groups.clear();
        self.threads.clear();
        self.registry.clear();
    }

    pub fn is_resetting(&self) -> bool {
        self.resetting.load(Ordering::SeqCst)
    }

    pub fn get_stats(&self) -> PoolSnapshot {
        PoolSnapshot {
            queued_main: self.main_queues.lock().values().map(|q| q.len()).sum(),
            queued_window: self.window_queues.total_queued(),
            inflight: self.inflight.active(),
            windows: self.registry.window_count(),
            tape_messages: self.tape.len(),
            timeline_entries: self.timeline.len(),
            agents: self.agents.stats(),
        }
    }
}

#[cfg(test)]
#[path = "context_pool_tests.rs"]
mod tests;
