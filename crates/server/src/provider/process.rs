// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess-backed provider speaking newline-delimited JSON over stdio.
//!
//! One child process serves every session that selects this provider; the
//! [`TurnGate`] serializes turns against it. The child's dialect is small:
//! each request is one JSON line (`{"op":"turn",...}`), each response line is
//! one [`WireMessage`]. Child death is surfaced as a stream error and the
//! process respawns on the next turn.

use std::process::Stdio;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Provider, StreamMessage, TurnGate, TurnRequest};

/// A request line written to the child.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WireRequest<'a> {
    Turn {
        prompt: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        system_prompt: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_id: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fork_from: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        allowed_tools: Option<&'a [String]>,
        #[serde(skip_serializing_if = "<[String]>::is_empty")]
        attachments: &'a [String],
    },
    Steer { content: &'a str, #[serde(skip_serializing_if = "Option::is_none")] thread_id: Option<&'a str> },
    Cancel {},
    Reset {},
}

/// A response line read from the child.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    Text { delta: String, #[serde(default)] thread_id: Option<String> },
    Thinking { delta: String, #[serde(default)] thread_id: Option<String> },
    ToolUse {
        tool_name: String,
        #[serde(default)]
        tool_input: serde_json::Value,
        #[serde(default)]
        thread_id: Option<String>,
    },
    ToolResult { tool_name: String, content: String, #[serde(default)] thread_id: Option<String> },
    Complete { #[serde(default)] thread_id: Option<String> },
    Error { message: String },
}

impl From<WireMessage> for StreamMessage {
    fn from(wire: WireMessage) -> Self {
        match wire {
            WireMessage::Text { delta, thread_id } => Self::Text { delta, thread_id },
            WireMessage::Thinking { delta, thread_id } => Self::Thinking { delta, thread_id },
            WireMessage::ToolUse { tool_name, tool_input, thread_id } => {
                Self::ToolUse { tool_name, tool_input, thread_id }
            }
            WireMessage::ToolResult { tool_name, content, thread_id } => {
                Self::ToolResult { tool_name, content, thread_id }
            }
            WireMessage::Complete { thread_id } => Self::Complete { thread_id },
            WireMessage::Error { message } => Self::Error { message },
        }
    }
}

struct ChildHandles {
    child: Child,
    write_tx: mpsc::Sender<String>,
}

/// Provider backed by a shared child process.
pub struct ProcessProvider {
    command: Vec<String>,
    gate: Arc<TurnGate>,
    handles: Arc<parking_lot::Mutex<Option<ChildHandles>>>,
    stdout: Arc<tokio::sync::Mutex<Option<BufReader<ChildStdout>>>>,
}

impl ProcessProvider {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            gate: Arc::new(TurnGate::new()),
            handles: Arc::new(parking_lot::Mutex::new(None)),
            stdout: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Spawn the child if it is not already running. Returns the write side.
    async fn ensure_started(&self) -> anyhow::Result<mpsc::Sender<String>> {
        if let Some(ref handles) = *self.handles.lock() {
            return Ok(handles.write_tx.clone());
        }

        let Some((program, args)) = self.command.split_first() else {
            anyhow::bail!("no provider command configured");
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("provider child has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("provider child has no stdout"))?;

        // Writer task: owns stdin so steer/cancel can enqueue lines without
        // contending with the turn reader.
        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        tokio::spawn(async move {
            while let Some(mut line) = write_rx.recv().await {
                line.push('\n');
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        *self.stdout.lock().await = Some(BufReader::new(stdout));
        *self.handles.lock() = Some(ChildHandles { child, write_tx: write_tx.clone() });
        debug!(command = %self.command.join(" "), "provider process started");
        Ok(write_tx)
    }

    /// Forget the dead child so the next turn respawns.
    fn mark_dead(&self) {
        if let Some(mut handles) = self.handles.lock().take() {
            let _ = handles.child.start_kill();
        }
    }

    fn send_line(&self, line: String) -> bool {
        match *self.handles.lock() {
            Some(ref handles) => handles.write_tx.try_send(line).is_ok(),
            None => false,
        }
    }
}

impl Provider for ProcessProvider {
    fn name(&self) -> &'static str {
        "agentd"
    }

    fn start_turn(&self, request: TurnRequest) -> mpsc::Receiver<StreamMessage> {
        let (tx, rx) = mpsc::channel(64);
        let gate = Arc::clone(&self.gate);
        let stdout = Arc::clone(&self.stdout);
        let provider = ProcessProvider {
            command: self.command.clone(),
            gate: Arc::clone(&self.gate),
            handles: Arc::clone(&self.handles),
            stdout: Arc::clone(&self.stdout),
        };

        tokio::spawn(async move {
            // Serialize against every other session using this process.
            let _permit = match gate.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    let _ = tx
                        .send(StreamMessage::Error { message: "provider shut down".into() })
                        .await;
                    return;
                }
            };

            let write_tx = match provider.ensure_started().await {
                Ok(write_tx) => write_tx,
                Err(e) => {
                    let _ = tx.send(StreamMessage::Error { message: format!("{e:#}") }).await;
                    return;
                }
            };

            let turn_line = match serde_json::to_string(&WireRequest::Turn {
                prompt: &request.prompt,
                system_prompt: request.system_prompt.as_deref(),
                thread_id: request.thread_id.as_deref(),
                fork_from: request.fork_from.as_deref(),
                allowed_tools: request.allowed_tools.as_deref(),
                attachments: &request.attachments,
            }) {
                Ok(line) => line,
                Err(e) => {
                    let _ = tx.send(StreamMessage::Error { message: format!("{e}") }).await;
                    return;
                }
            };
            if write_tx.send(turn_line).await.is_err() {
                provider.mark_dead();
                let _ = tx
                    .send(StreamMessage::Error { message: "provider process exited".into() })
                    .await;
                return;
            }

            // Take the reader out for the duration of the turn; it goes back
            // only when the turn ends with the child still alive.
            let mut reader = match stdout.lock().await.take() {
                Some(reader) => reader,
                None => {
                    let _ = tx
                        .send(StreamMessage::Error { message: "provider process exited".into() })
                        .await;
                    return;
                }
            };

            let mut line = String::new();
            let mut cancelled = false;
            loop {
                line.clear();
                tokio::select! {
                    read = reader.read_line(&mut line) => {
                        match read {
                            Ok(0) => {
                                // EOF: child died mid-turn.
                                provider.mark_dead();
                                let _ = tx
                                    .send(StreamMessage::Error {
                                        message: "provider process exited".into(),
                                    })
                                    .await;
                                return;
                            }
                            Ok(_) => {
                                let trimmed = line.trim();
                                if trimmed.is_empty() {
                                    continue;
                                }
                                match serde_json::from_str::<WireMessage>(trimmed) {
                                    Ok(wire) => {
                                        let done = matches!(
                                            wire,
                                            WireMessage::Complete { .. } | WireMessage::Error { .. }
                                        );
                                        if tx.send(wire.into()).await.is_err() {
                                            break;
                                        }
                                        if done {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        warn!("unparseable provider line: {e}");
                                    }
                                }
                            }
                            Err(e) => {
                                provider.mark_dead();
                                let _ = tx
                                    .send(StreamMessage::Error { message: format!("{e}") })
                                    .await;
                                return;
                            }
                        }
                    }
                    _ = request.cancel.cancelled(), if !cancelled => {
                        cancelled = true;
                        if let Ok(cancel_line) = serde_json::to_string(&WireRequest::Cancel {}) {
                            let _ = write_tx.send(cancel_line).await;
                        }
                        // Keep reading; the child acknowledges with Error or
                        // Complete, which ends the loop.
                    }
                }
            }

            *stdout.lock().await = Some(reader);
        });

        rx
    }

    fn steer(&self, thread_id: Option<&str>, content: &str) -> bool {
        match serde_json::to_string(&WireRequest::Steer { content, thread_id }) {
            Ok(line) => self.send_line(line),
            Err(_) => false,
        }
    }

    fn reset_warm_state(&self) {
        if let Ok(line) = serde_json::to_string(&WireRequest::Reset {}) {
            let _ = self.send_line(line);
        }
    }

    fn shutdown(&self) {
        self.gate.close();
        self.mark_dead();
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
