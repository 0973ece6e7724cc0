// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly: the injected blocks that precede a task's content.

use crate::tape::{ContextMessage, Role, Source};
use crate::timeline::TimelineEntry;

/// Messages of main-conversation excerpt used to bootstrap a window agent.
pub const EXCERPT_MESSAGES: usize = 6;

/// Characters each excerpt message is truncated to.
const EXCERPT_MESSAGE_CHARS: usize = 400;

/// Render drained timeline entries as a compact block, empty for no entries.
pub fn interactions_block(entries: &[TimelineEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let mut block = String::from("<recent_interactions>\n");
    for entry in entries {
        block.push_str(&entry.describe());
        block.push('\n');
    }
    block.push_str("</recent_interactions>\n");
    block
}

/// Render the recent main conversation for a window agent's first turn.
///
/// Only `main`-sourced messages qualify; window chatter belongs to other
/// agents' threads and would mislead the new one.
pub fn main_excerpt(messages: &[ContextMessage]) -> String {
    let main_messages: Vec<&ContextMessage> = messages
        .iter()
        .filter(|m| m.source == Source::Main)
        .collect();
    if main_messages.is_empty() {
        return String::new();
    }
    let start = main_messages.len().saturating_sub(EXCERPT_MESSAGES);
    let mut block = String::from("<desktop_context>\nRecent conversation on this desktop:\n");
    for message in &main_messages[start..] {
        let who = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let text: String = message.content.chars().take(EXCERPT_MESSAGE_CHARS).collect();
        block.push_str(&format!("{who}: {text}\n"));
    }
    block.push_str("</desktop_context>\n");
    block
}

/// Join prefix blocks and the task content, skipping empty blocks.
pub fn compose(blocks: &[String], content: &str) -> String {
    let mut prompt = String::new();
    for block in blocks {
        if block.is_empty() {
            continue;
        }
        prompt.push_str(block);
        prompt.push('\n');
    }
    prompt.push_str(content);
    prompt
}

/// Synthesize the content of a component-click task.
pub fn component_action_content(
    action: &str,
    window_title: &str,
    component_path: Option<&str>,
    form_data: Option<&serde_json::Value>,
) -> String {
    let mut content = format!(
        "<user_interaction:click>button \"{action}\" in window \"{window_title}\"</user_interaction:click>"
    );
    if let Some(path) = component_path {
        content.push_str(&format!("\ncomponent path: {path}"));
    }
    if let Some(data) = form_data {
        content.push_str(&format!("\nform data: {data}"));
    }
    content
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
