// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ownership of a session's agent instances.
//!
//! One main agent per monitor (up to four), one persistent agent per window
//! group, and a pool of single-task ephemeral agents whose construction is
//! gated by a process-wide limiter so overflow work cannot swamp the
//! provider.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::bus::ActionBus;
use crate::provider::Provider;
use crate::tape::ContextTape;

use super::{AgentSession, EventSink, ThreadStore};

/// Upper bound on monitors (and thus main agents) per session.
pub const MAX_MONITORS: usize = 4;

/// Everything an [`AgentSession`] is constructed from.
#[derive(Clone)]
pub struct AgentDeps {
    pub bus: Arc<ActionBus>,
    pub tape: Arc<ContextTape>,
    pub sink: EventSink,
    pub threads: Arc<ThreadStore>,
}

/// Counters reported through session stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub main_agents: usize,
    pub window_agents: usize,
    pub ephemeral_agents: usize,
}

struct EphemeralEntry {
    agent: Arc<AgentSession>,
    _permit: OwnedSemaphorePermit,
}

/// Owns the set of agents for one session.
pub struct AgentPool {
    deps: AgentDeps,
    provider: parking_lot::RwLock<Arc<dyn Provider>>,
    main_agents: Mutex<HashMap<String, Arc<AgentSession>>>,
    window_agents: Mutex<HashMap<String, Arc<AgentSession>>>,
    ephemerals: Mutex<HashMap<u64, EphemeralEntry>>,
    limiter: Arc<Semaphore>,
}

impl AgentPool {
    pub fn new(deps: AgentDeps, provider: Arc<dyn Provider>, limiter: Arc<Semaphore>) -> Self {
        Self {
            deps,
            provider: parking_lot::RwLock::new(provider),
            main_agents: Mutex::new(HashMap::new()),
            window_agents: Mutex::new(HashMap::new()),
            ephemerals: Mutex::new(HashMap::new()),
            limiter,
        }
    }

    fn build_agent(&self) -> Arc<AgentSession> {
        AgentSession::new(
            Arc::clone(&self.provider.read()),
            Arc::clone(&self.deps.bus),
            Arc::clone(&self.deps.tape),
            Arc::clone(&self.deps.sink),
            Arc::clone(&self.deps.threads),
        )
    }

    /// Create (or return) the default main agent for `monitor-0`.
    pub fn create_main_agent(&self) -> Arc<AgentSession> {
        let mut agents = self.main_agents.lock();
        if let Some(agent) = agents.get("monitor-0") {
            return Arc::clone(agent);
        }
        let agent = self.build_agent();
        agents.insert("monitor-0".to_owned(), Arc::clone(&agent));
        agent
    }

    /// Create (or return) a monitor's main agent; `None` past the monitor cap.
    pub fn create_monitor_agent(&self, monitor_id: &str) -> Option<Arc<AgentSession>> {
        let mut agents = self.main_agents.lock();
        if let Some(agent) = agents.get(monitor_id) {
            return Some(Arc::clone(agent));
        }
        if agents.len() >= MAX_MONITORS {
            debug!(monitor = monitor_id, "monitor cap reached");
            return None;
        }
        let agent = self.build_agent();
        agents.insert(monitor_id.to_owned(), Arc::clone(&agent));
        Some(agent)
    }

    pub fn main_agent(&self, monitor_id: &str) -> Option<Arc<AgentSession>> {
        self.main_agents.lock().get(monitor_id).cloned()
    }

    pub fn has_main_agent(&self, monitor_id: &str) -> bool {
        self.main_agents.lock().contains_key(monitor_id)
    }

    pub fn is_main_agent_busy(&self, monitor_id: &str) -> bool {
        self.main_agents.lock().get(monitor_id).is_some_and(|a| a.is_busy())
    }

    /// Lazily create the persistent agent for a window group.
    pub fn get_or_create_window_agent(&self, agent_key: &str) -> Arc<AgentSession> {
        let mut agents = self.window_agents.lock();
        if let Some(agent) = agents.get(agent_key) {
            return Arc::clone(agent);
        }
        debug!(key = agent_key, "creating window agent");
        let agent = self.build_agent();
        agents.insert(agent_key.to_owned(), Arc::clone(&agent));
        agent
    }

    pub fn window_agent(&self, agent_key: &str) -> Option<Arc<AgentSession>> {
        self.window_agents.lock().get(agent_key).cloned()
    }

    /// Construct an overflow agent, gated by the global limiter. `None` when
    /// the limiter is exhausted.
    pub fn create_ephemeral(&self) -> Option<Arc<AgentSession>> {
        let permit = Arc::clone(&self.limiter).try_acquire_owned().ok()?;
        let agent = self.build_agent();
        self.ephemerals
            .lock()
            .insert(agent.instance_id(), EphemeralEntry { agent: Arc::clone(&agent), _permit: permit });
        Some(agent)
    }

    /// Release an ephemeral agent and its limiter permit.
    pub fn dispose_ephemeral(&self, agent: &Arc<AgentSession>) {
        if let Some(entry) = self.ephemerals.lock().remove(&agent.instance_id()) {
            entry.agent.cleanup();
        }
    }

    /// Short-lived agent for a parallel (`action_id`) task. Not limiter-gated
    /// and never registered: the caller owns its whole lifecycle.
    pub fn create_transient(&self) -> Arc<AgentSession> {
        self.build_agent()
    }

    pub fn dispose_window_agent(&self, agent_key: &str) {
        if let Some(agent) = self.window_agents.lock().remove(agent_key) {
            debug!(key = agent_key, "disposing window agent");
            agent.cleanup();
        }
    }

    /// Whether any live agent's role starts with the prefix.
    pub fn has_role_prefix(&self, prefix: &str) -> bool {
        let matches = |agent: &Arc<AgentSession>| {
            agent.role().is_some_and(|role| role.starts_with(prefix))
        };
        self.main_agents.lock().values().any(&matches)
            || self.window_agents.lock().values().any(&matches)
            || self.ephemerals.lock().values().any(|e| matches(&e.agent))
    }

    pub fn interrupt_all(&self) {
        for agent in self.all_agents() {
            agent.interrupt();
        }
    }

    /// Interrupt agents whose current role equals `role`.
    pub fn interrupt_by_role(&self, role: &str) {
        for agent in self.all_agents() {
            if agent.role().as_deref() == Some(role) {
                agent.interrupt();
            }
        }
    }

    /// Swap the provider used for new agents and for every main agent.
    pub fn set_provider(&self, provider: Arc<dyn Provider>) {
        *self.provider.write() = Arc::clone(&provider);
        for agent in self.main_agents.lock().values() {
            agent.set_provider(Arc::clone(&provider));
        }
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.provider.read())
    }

    fn all_agents(&self) -> Vec<Arc<AgentSession>> {
        let mut agents: Vec<Arc<AgentSession>> =
            self.main_agents.lock().values().cloned().collect();
        agents.extend(self.window_agents.lock().values().cloned());
        agents.extend(self.ephemerals.lock().values().map(|e| Arc::clone(&e.agent)));
        agents
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            main_agents: self.main_agents.lock().len(),
            window_agents: self.window_agents.lock().len(),
            ephemeral_agents: self.ephemerals.lock().len(),
        }
    }

    /// Interrupt and dispose everything.
    pub fn cleanup(&self) {
        for agent in self.all_agents() {
            agent.cleanup();
        }
        self.main_agents.lock().clear();
        self.window_agents.lock().clear();
        self.ephemerals.lock().clear();
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
