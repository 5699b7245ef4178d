//! Trace record types for generation sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bridge::Capability;
use crate::interpreter::StreamEvent;

/// Current trace schema version.
pub const TRACE_VERSION: &str = "0.1.0";

/// Longest text kept in a conversation preview.
const PREVIEW_CHARS: usize = 500;

/// A single trace record capturing one session event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub version: String,

    pub id: String,

    pub timestamp: DateTime<Utc>,

    /// Driver session this record belongs to
    pub session_id: String,

    /// The reasoning process that produced the event
    pub contributor: Contributor,

    pub event_type: TraceEventType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<TraceTool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<TraceConversation>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    /// Request payload sent to the reasoning process
    UserMessage,
    AgentMessage,
    ToolCall,
    ToolResult,
    TaskList,
    PermissionRequest,
    FinalResult,
    SessionStart,
    SessionEnd,
}

/// The model/provider that produced the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    /// Provider name (e.g., "claude")
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Normalized model ID in format "provider/model"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_id: Option<String>,
}

impl Contributor {
    pub fn new(provider: impl Into<String>, model: Option<String>) -> Self {
        let provider = provider.into();
        let normalized_id = model.as_ref().map(|m| format!("{}/{}", provider, m));
        Self {
            provider,
            model,
            normalized_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceTool {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// "running", "completed" or "failed"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceConversation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<u32>,

    /// user, assistant or tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Message content, truncated for storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
}

impl TraceConversation {
    pub fn preview(role: &str, content: &str) -> Self {
        Self {
            turn: None,
            role: Some(role.to_string()),
            content_preview: Some(content.chars().take(PREVIEW_CHARS).collect()),
        }
    }
}

// ─── Builder Pattern ────────────────────────────────────────────────────

impl TraceRecord {
    pub fn new(
        session_id: impl Into<String>,
        event_type: TraceEventType,
        contributor: Contributor,
    ) -> Self {
        Self {
            version: TRACE_VERSION.to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            contributor,
            event_type,
            tool: None,
            conversation: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Build the record for a stream event.
    pub fn from_event(
        session_id: impl Into<String>,
        contributor: Contributor,
        event: &StreamEvent,
    ) -> Self {
        match event {
            StreamEvent::AssistantText { text } => {
                Self::new(session_id, TraceEventType::AgentMessage, contributor)
                    .with_conversation(TraceConversation::preview("assistant", text))
            }
            StreamEvent::ToolInvocation { id, name, input } => {
                let record = Self::new(session_id, TraceEventType::ToolCall, contributor)
                    .with_tool(TraceTool {
                        name: name.clone(),
                        tool_call_id: Some(id.clone()),
                        status: Some("running".to_string()),
                        input: Some(input.clone()),
                        output: None,
                    });
                match Capability::from_tool_name(name) {
                    Some(cap) => record.with_metadata(
                        "capability",
                        serde_json::Value::String(cap.as_str().to_string()),
                    ),
                    None => record,
                }
            }
            StreamEvent::ToolResult { id, output, is_error } => {
                let status = if *is_error { "failed" } else { "completed" };
                Self::new(session_id, TraceEventType::ToolResult, contributor).with_tool(TraceTool {
                    name: String::new(),
                    tool_call_id: Some(id.clone()),
                    status: Some(status.to_string()),
                    input: None,
                    output: Some(output.clone()),
                })
            }
            StreamEvent::TaskListUpdate { tasks } => {
                Self::new(session_id, TraceEventType::TaskList, contributor).with_metadata(
                    "tasks",
                    serde_json::to_value(tasks).unwrap_or(serde_json::Value::Null),
                )
            }
            StreamEvent::PermissionRequest(request) => {
                Self::new(session_id, TraceEventType::PermissionRequest, contributor)
                    .with_conversation(TraceConversation::preview("assistant", &request.question))
                    .with_metadata("requestId", serde_json::Value::String(request.id.clone()))
            }
            StreamEvent::FinalResult { text } => {
                Self::new(session_id, TraceEventType::FinalResult, contributor)
                    .with_conversation(TraceConversation::preview("assistant", text))
            }
            StreamEvent::Error { message } => {
                Self::new(session_id, TraceEventType::SessionEnd, contributor)
                    .with_metadata("error", serde_json::Value::String(message.clone()))
            }
        }
    }

    pub fn with_tool(mut self, tool: TraceTool) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn with_conversation(mut self, conversation: TraceConversation) -> Self {
        self.conversation = Some(conversation);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
