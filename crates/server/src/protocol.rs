// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol: inbound client events, outbound server events, and the
//! action/interaction vocabulary shared by both directions.
//!
//! Both directions use internally-tagged JSON enums (`{"event": "user_message",
//! ...}`). Unknown inbound tags fail deserialization and are logged and
//! dropped at the transport edge; unknown *action* tags are preserved verbatim
//! so the core can pass them through to clients untouched.

use serde::{Deserialize, Serialize};

/// Window geometry in virtual-desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// An action the AI instructs the UI to perform.
///
/// The core understands the window-management cases; anything else is opaque
/// pass-through carried in `Other` with its original JSON intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OsAction {
    #[serde(rename = "window.create")]
    WindowCreate {
        window_id: String,
        title: String,
        #[serde(default)]
        bounds: Bounds,
        #[serde(default)]
        content: String,
    },
    #[serde(rename = "window.close")]
    WindowClose { window_id: String },
    #[serde(rename = "window.move")]
    WindowMove { window_id: String, x: i32, y: i32 },
    #[serde(rename = "window.resize")]
    WindowResize { window_id: String, width: u32, height: u32 },
    #[serde(rename = "window.lock")]
    WindowLock { window_id: String },
    #[serde(rename = "window.unlock")]
    WindowUnlock { window_id: String },
    #[serde(rename = "window.show_notification")]
    ShowNotification {
        notification_id: String,
        title: String,
        #[serde(default)]
        message: String,
    },
    #[serde(rename = "window.dismiss_notification")]
    DismissNotification { notification_id: String },
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl OsAction {
    /// The window this action targets, if it targets one.
    pub fn window_id(&self) -> Option<&str> {
        match self {
            Self::WindowCreate { window_id, .. }
            | Self::WindowClose { window_id }
            | Self::WindowMove { window_id, .. }
            | Self::WindowResize { window_id, .. }
            | Self::WindowLock { window_id }
            | Self::WindowUnlock { window_id } => Some(window_id),
            Self::ShowNotification { .. } | Self::DismissNotification { .. } => None,
            Self::Other(value) => value.get("window_id").and_then(|v| v.as_str()),
        }
    }

    /// Short tag for logs and timeline summaries (e.g. `"window.create"`).
    pub fn kind_str(&self) -> &str {
        match self {
            Self::WindowCreate { .. } => "window.create",
            Self::WindowClose { .. } => "window.close",
            Self::WindowMove { .. } => "window.move",
            Self::WindowResize { .. } => "window.resize",
            Self::WindowLock { .. } => "window.lock",
            Self::WindowUnlock { .. } => "window.unlock",
            Self::ShowNotification { .. } => "window.show_notification",
            Self::DismissNotification { .. } => "window.dismiss_notification",
            Self::Other(value) => {
                value.get("type").and_then(|v| v.as_str()).unwrap_or("unknown")
            }
        }
    }

    /// Whether replaying this action has a client-visible effect worth caching.
    pub fn is_observable(&self) -> bool {
        matches!(self, Self::WindowCreate { .. } | Self::ShowNotification { .. })
    }
}

/// End-user UI event reported by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInteraction {
    pub kind: InteractionKind,
    #[serde(default)]
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    /// Base64 image payload for `draw` / `region.select`; opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionKind {
    #[serde(rename = "window.close")]
    WindowClose,
    #[serde(rename = "window.focus")]
    WindowFocus,
    #[serde(rename = "window.move")]
    WindowMove,
    #[serde(rename = "window.resize")]
    WindowResize,
    #[serde(rename = "window.minimize")]
    WindowMinimize,
    #[serde(rename = "window.maximize")]
    WindowMaximize,
    #[serde(rename = "toast.dismiss")]
    ToastDismiss,
    #[serde(rename = "notification.dismiss")]
    NotificationDismiss,
    #[serde(rename = "icon.click")]
    IconClick,
    #[serde(rename = "icon.drag")]
    IconDrag,
    #[serde(rename = "selection.action")]
    SelectionAction,
    #[serde(rename = "region.select")]
    RegionSelect,
    #[serde(rename = "draw")]
    Draw,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WindowClose => "window.close",
            Self::WindowFocus => "window.focus",
            Self::WindowMove => "window.move",
            Self::WindowResize => "window.resize",
            Self::WindowMinimize => "window.minimize",
            Self::WindowMaximize => "window.maximize",
            Self::ToastDismiss => "toast.dismiss",
            Self::NotificationDismiss => "notification.dismiss",
            Self::IconClick => "icon.click",
            Self::IconDrag => "icon.drag",
            Self::SelectionAction => "selection.action",
            Self::RegionSelect => "region.select",
            Self::Draw => "draw",
        }
    }
}

impl UserInteraction {
    /// One-line rendering for the recent-interactions prompt block.
    pub fn describe(&self) -> String {
        let target = self
            .window_title
            .as_deref()
            .or(self.window_id.as_deref())
            .unwrap_or("desktop");
        match &self.details {
            Some(details) => format!("{} on \"{target}\": {details}", self.kind.as_str()),
            None => format!("{} on \"{target}\"", self.kind.as_str()),
        }
    }
}

/// App-to-host RPC request issued through the app protocol, replayed to a
/// window on re-registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppProtocolRequest {
    pub request_id: String,
    pub window_id: String,
    pub payload: serde_json::Value,
}

// -- Inbound ------------------------------------------------------------------

/// Client-to-server events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    UserMessage {
        message_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        monitor_id: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        interactions: Vec<UserInteraction>,
    },
    WindowMessage {
        message_id: String,
        window_id: String,
        content: String,
    },
    ComponentAction {
        window_id: String,
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        form_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        form_data: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_title: Option<String>,
    },
    Interrupt {},
    InterruptAgent {
        agent_id: String,
    },
    Reset {},
    SetProvider {
        provider: String,
    },
    RenderingFeedback {
        request_id: String,
        window_id: String,
        renderer: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        locked: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_data: Option<String>,
    },
    DialogFeedback {
        dialog_id: String,
        confirmed: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remember_choice: Option<bool>,
    },
    ToastAction {
        toast_id: String,
        event_id: String,
    },
    UserInteraction {
        interactions: Vec<UserInteraction>,
    },
    AppProtocolResponse {
        request_id: String,
        window_id: String,
        response: serde_json::Value,
    },
    AppProtocolReady {
        window_id: String,
    },
    SubscribeMonitor {
        monitor_id: String,
    },
}

// -- Outbound -----------------------------------------------------------------

/// Tool execution progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Complete,
}

/// Phase of a window agent's claim on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Assigned,
    Active,
    Released,
}

/// Server-to-client events. The sequencer wraps each in an [`Envelope`]
/// before fanout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Actions {
        actions: Vec<OsAction>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        monitor_id: Option<String>,
    },
    AgentThinking {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    AgentResponse {
        content: String,
        is_complete: bool,
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    ConnectionStatus {
        status: String,
        session_id: String,
    },
    ToolProgress {
        tool: String,
        status: ToolStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    Error {
        code: String,
        message: String,
    },
    WindowAgentStatus {
        window_id: String,
        agent_id: String,
        status: AgentPhase,
    },
    MessageAccepted {
        message_id: String,
        agent_id: String,
    },
    MessageQueued {
        message_id: String,
        position: usize,
    },
    ApprovalRequest {
        dialog_id: String,
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    AppProtocolRequest {
        request_id: String,
        window_id: String,
        payload: serde_json::Value,
    },
}

impl ServerEvent {
    /// The monitor this event is scoped to, when it carries one.
    pub fn monitor_id(&self) -> Option<&str> {
        match self {
            Self::Actions { monitor_id, .. } => monitor_id.as_deref(),
            _ => None,
        }
    }

    /// Convenience constructor for `Error` events.
    pub fn error(code: crate::error::ErrorCode, message: impl Into<String>) -> Self {
        Self::Error { code: code.as_str().to_owned(), message: message.into() }
    }
}

/// A sequenced outbound event as delivered to connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    #[serde(flatten)]
    pub event: ServerEvent,
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
