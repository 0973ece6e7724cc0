// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit and integration tests: a scripted provider and an
//! event-collecting sink.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::agent::EventSink;
use crate::protocol::ServerEvent;
use crate::provider::{Provider, StreamMessage, TurnRequest};

/// Provider that replays pre-scripted turns.
///
/// Each call to `start_turn` pops the next script; when the queue is empty a
/// bare `Complete` is produced. With `hold_turns`, every turn waits for a
/// [`release`](Self::release) before emitting, letting tests hold an agent
/// busy deterministically.
pub struct ScriptProvider {
    turns: Mutex<VecDeque<Vec<StreamMessage>>>,
    requests: Mutex<Vec<TurnRequest>>,
    gate: Arc<tokio::sync::Semaphore>,
    hold_turns: bool,
}

impl Default for ScriptProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptProvider {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(vec![]),
            gate: Arc::new(tokio::sync::Semaphore::new(0)),
            hold_turns: false,
        }
    }

    /// Every turn blocks until released.
    pub fn holding() -> Self {
        Self { hold_turns: true, ..Self::new() }
    }

    pub fn push_turn(&self, messages: Vec<StreamMessage>) {
        self.turns.lock().push_back(messages);
    }

    /// Allow `count` held turns to proceed.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Turn requests observed so far.
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().clone()
    }

    /// A turn that emits one text chunk and completes on `thread_id`.
    pub fn text_turn(text: &str, thread_id: &str) -> Vec<StreamMessage> {
        vec![
            StreamMessage::Text {
                delta: text.to_owned(),
                thread_id: Some(thread_id.to_owned()),
            },
            StreamMessage::Complete { thread_id: Some(thread_id.to_owned()) },
        ]
    }
}

impl Provider for ScriptProvider {
    fn name(&self) -> &'static str {
        "script"
    }

    fn start_turn(&self, request: TurnRequest) -> mpsc::Receiver<StreamMessage> {
        self.requests.lock().push(request.clone());
        let script = self
            .turns
            .lock()
            .pop_front()
            .unwrap_or_else(|| vec![StreamMessage::Complete { thread_id: None }]);
        let gate = Arc::clone(&self.gate);
        let hold = self.hold_turns;
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            if hold {
                tokio::select! {
                    permit = gate.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                    }
                    _ = request.cancel.cancelled() => {
                        let _ = tx
                            .send(StreamMessage::Error { message: "Turn was interrupted".into() })
                            .await;
                        return;
                    }
                }
            }
            for message in script {
                if request.cancel.is_cancelled() {
                    let _ = tx
                        .send(StreamMessage::Error { message: "Turn was interrupted".into() })
                        .await;
                    return;
                }
                if tx.send(message).await.is_err() {
                    return;
                }
            }
        });
        rx
    }
}

/// Sink that records every emitted event for later assertions.
#[derive(Default)]
pub struct EventCollector {
    events: Mutex<Vec<ServerEvent>>,
}

impl EventCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sink(self: &Arc<Self>) -> EventSink {
        let collector = Arc::clone(self);
        Arc::new(move |event| collector.events.lock().push(event))
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count_matching(&self, predicate: impl Fn(&ServerEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Poll until an event matches or the timeout elapses.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&ServerEvent) -> bool,
        timeout: Duration,
    ) -> Option<ServerEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(event) = self.events.lock().iter().find(|e| predicate(e)).cloned() {
                return Some(event);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
