// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::mpsc;
use tracing::debug;

use super::{Provider, StreamMessage, TurnRequest};

/// Provider stand-in with no external process.
///
/// Every turn acknowledges the prompt with one text chunk and completes,
/// minting a thread id when the request has none so thread-continuity
/// plumbing stays exercised. Used when the binary runs without a configured
/// provider, and by the end-to-end smoke tests.
#[derive(Default)]
pub struct NullProvider;

impl NullProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for NullProvider {
    fn name(&self) -> &'static str {
        "null"
    }

    fn start_turn(&self, request: TurnRequest) -> mpsc::Receiver<StreamMessage> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let thread_id = request
                .thread_id
                .clone()
                .unwrap_or_else(|| format!("null-{}", uuid::Uuid::new_v4()));

            if request.cancel.is_cancelled() {
                let _ = tx.send(StreamMessage::Error { message: "Turn was interrupted".into() }).await;
                return;
            }

            let preview: String = request.prompt.chars().take(48).collect();
            debug!(thread = %thread_id, "null provider turn: {preview}");
            let _ = tx
                .send(StreamMessage::Text {
                    delta: "No provider is configured; this request was not processed.".into(),
                    thread_id: Some(thread_id.clone()),
                })
                .await;
            let _ = tx.send(StreamMessage::Complete { thread_id: Some(thread_id) }).await;
        });
        rx
    }
}
