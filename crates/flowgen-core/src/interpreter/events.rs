//! Stream event types consumed by the session driver.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event from the reasoning process, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    AssistantText {
        text: String,
    },
    /// A tool call issued (and fulfilled) by the reasoning process's runtime.
    ToolInvocation {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Correlated to a `ToolInvocation` by `id`; not necessarily adjacent.
    ToolResult {
        id: String,
        #[serde(default)]
        output: Value,
        #[serde(default)]
        is_error: bool,
    },
    /// Full task-list snapshot.
    TaskListUpdate {
        tasks: Vec<TaskItem>,
    },
    PermissionRequest(PermissionRequest),
    /// Terminal. Carries the literal candidate artifact text.
    FinalResult {
        text: String,
    },
    /// Terminal.
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::FinalResult { .. } | StreamEvent::Error { .. })
    }

    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::AssistantText { .. } => "assistant_text",
            StreamEvent::ToolInvocation { .. } => "tool_invocation",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::TaskListUpdate { .. } => "task_list_update",
            StreamEvent::PermissionRequest(_) => "permission_request",
            StreamEvent::FinalResult { .. } => "final_result",
            StreamEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

/// One entry of the self-tracked task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub content: String,
    pub status: TaskStatus,
    /// Present-tense label shown while the task runs.
    #[serde(default, rename = "activeForm", alias = "label")]
    pub label: String,
}

impl TaskItem {
    pub fn new(content: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            content: content.into(),
            status,
            label: String::new(),
        }
    }
}

/// A blocking question for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub question: String,
    /// Values the caller must supply when approving.
    #[serde(default)]
    pub required_fields: Vec<String>,
}
