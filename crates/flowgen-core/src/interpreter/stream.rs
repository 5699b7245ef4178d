//! Claude Code stream-json decoding.
//!
//! The reasoning process writes NDJSON on stdout with these message types:
//!   - `system`: `init` carries the process's session id
//!   - `assistant`: text and `tool_use` content blocks
//!   - `user`: `tool_result` blocks echoed back by the runtime
//!   - `result`: terminal, success carries the final text
//!   - `control_request`: `can_use_tool` asks the host for permission
//!
//! Lines that are not JSON, or message types we don't know, are logged
//! and skipped; they never stop the stream.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::events::{PermissionRequest, StreamEvent};

// ─── Claude Protocol Types ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
    tool_use_id: Option<String>,
    content: Option<Value>,
    is_error: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ClaudeMessageContent {
    Text(String),
    Blocks(Vec<ClaudeContent>),
}

#[derive(Debug, Clone, Deserialize)]
struct ClaudeMessage {
    #[allow(dead_code)]
    role: Option<String>,
    content: ClaudeMessageContent,
}

#[derive(Debug, Clone, Deserialize)]
struct ClaudeControlRequest {
    subtype: String,
    tool_name: Option<String>,
    input: Option<Value>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClaudeOutputMessage {
    #[serde(rename = "type")]
    msg_type: String,
    subtype: Option<String>,
    session_id: Option<String>,
    message: Option<ClaudeMessage>,
    result: Option<String>,
    is_error: Option<bool>,
    request_id: Option<String>,
    request: Option<ClaudeControlRequest>,
}

// ─── Decoder ────────────────────────────────────────────────────────────

/// Turns stdout lines into [`StreamEvent`]s.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    session_id: Option<String>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session id announced by the process, once seen.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Decode one stdout line. Returns zero or more events.
    pub fn decode_line(&mut self, raw: &str) -> Vec<StreamEvent> {
        let line = clear_ansi(raw.trim());
        if line.is_empty() || !line.starts_with('{') {
            if !line.is_empty() {
                tracing::debug!("[Stream] non-JSON line: {}", truncate(&line, 100));
            }
            return Vec::new();
        }

        match serde_json::from_str::<ClaudeOutputMessage>(&line) {
            Ok(msg) => self.decode_message(msg),
            Err(e) => {
                tracing::debug!("[Stream] Failed to parse: {} - {}", e, truncate(&line, 100));
                Vec::new()
            }
        }
    }

    fn decode_message(&mut self, msg: ClaudeOutputMessage) -> Vec<StreamEvent> {
        match msg.msg_type.as_str() {
            "system" => {
                if msg.subtype.as_deref() == Some("init") {
                    if let Some(id) = msg.session_id {
                        tracing::debug!("[Stream] reasoning session {}", id);
                        self.session_id = Some(id);
                    }
                }
                Vec::new()
            }

            "assistant" => {
                let Some(message) = msg.message else {
                    return Vec::new();
                };
                match message.content {
                    ClaudeMessageContent::Text(text) => vec![StreamEvent::AssistantText { text }],
                    ClaudeMessageContent::Blocks(blocks) => {
                        blocks.into_iter().filter_map(assistant_block).collect()
                    }
                }
            }

            "user" => {
                let Some(message) = msg.message else {
                    return Vec::new();
                };
                match message.content {
                    ClaudeMessageContent::Text(_) => Vec::new(),
                    ClaudeMessageContent::Blocks(blocks) => blocks
                        .into_iter()
                        .filter(|c| c.content_type == "tool_result")
                        .map(|c| StreamEvent::ToolResult {
                            id: c.tool_use_id.clone().unwrap_or_default(),
                            output: extract_tool_result(&c),
                            is_error: c.is_error.unwrap_or(false),
                        })
                        .collect(),
                }
            }

            "result" => {
                let subtype = msg.subtype.unwrap_or_else(|| "success".to_string());
                let failed = msg.is_error.unwrap_or(false) || subtype.starts_with("error");
                if failed {
                    let message = msg
                        .result
                        .filter(|r| !r.trim().is_empty())
                        .unwrap_or(subtype);
                    vec![StreamEvent::Error { message }]
                } else {
                    vec![StreamEvent::FinalResult {
                        text: msg.result.unwrap_or_default(),
                    }]
                }
            }

            "control_request" => match msg.request {
                Some(req) if req.subtype == "can_use_tool" => {
                    vec![StreamEvent::PermissionRequest(permission_request(
                        msg.request_id.unwrap_or_default(),
                        req,
                    ))]
                }
                Some(req) => {
                    tracing::debug!("[Stream] ignoring control request {}", req.subtype);
                    Vec::new()
                }
                None => Vec::new(),
            },

            "stream_event" => Vec::new(),

            other => {
                tracing::debug!("[Stream] unknown message type '{}' ignored", other);
                Vec::new()
            }
        }
    }
}

fn assistant_block(c: ClaudeContent) -> Option<StreamEvent> {
    match c.content_type.as_str() {
        "text" => c.text.map(|text| StreamEvent::AssistantText { text }),
        "tool_use" => Some(StreamEvent::ToolInvocation {
            id: c.id.unwrap_or_default(),
            name: c.name.unwrap_or_else(|| "unknown".to_string()),
            input: c.input.unwrap_or_else(|| serde_json::json!({})),
        }),
        _ => None,
    }
}

fn permission_request(id: String, req: ClaudeControlRequest) -> PermissionRequest {
    let input = req.input.unwrap_or(Value::Null);
    let required_fields = input
        .get("required_fields")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|f| f.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let question = input
        .get("question")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or(req.description)
        .unwrap_or_else(|| match req.tool_name.as_deref() {
            Some(tool) => format!("Allow {}?", tool),
            None => "Allow the requested action?".to_string(),
        });

    PermissionRequest {
        id,
        tool_name: req.tool_name,
        question,
        required_fields,
    }
}

/// Tool results arrive as a string or a list of `{type: text}` blocks.
fn extract_tool_result(content: &ClaudeContent) -> Value {
    match &content.content {
        Some(Value::Array(blocks)) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect();
            if texts.len() == blocks.len() {
                Value::String(texts.join("\n"))
            } else {
                Value::Array(blocks.clone())
            }
        }
        Some(v) => v.clone(),
        None => Value::Null,
    }
}

fn clear_ansi(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ansi regex"));
    re.replace_all(text, "").to_string()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
