//! JSON-RPC 2.0 wire types for the bridge.
//!
//! Request: `{"jsonrpc":"2.0","method":"tools/call","params":{"name":…,"arguments":{…}},"id":1}`
//! Response (last non-empty output line):
//! `{"result":{"content":[{"text":…}]}}` or `{"error":{"message":…}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

pub const TOOLS_CALL: &str = "tools/call";

/// Every bridge process serves exactly one request, so the id is fixed.
pub const REQUEST_ID: u64 = 1;

/// JSON-RPC 2.0 request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Value,
}

impl JsonRpcRequest {
    /// Build a `tools/call` request for one capability.
    pub fn tools_call(name: &str, arguments: Value) -> Self {
        let arguments = if arguments.is_null() {
            Value::Object(Default::default())
        } else {
            arguments
        };
        Self {
            jsonrpc: "2.0".into(),
            method: TOOLS_CALL.into(),
            params: Some(serde_json::json!({ "name": name, "arguments": arguments })),
            id: Value::from(REQUEST_ID),
        }
    }
}

/// JSON-RPC 2.0 response as emitted by the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<ToolCallResult>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// `result` of a `tools/call`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<Value>,
}

/// Decode the full stdout of a bridge process into the call's value.
///
/// Only the last non-empty line counts; anything before it is log noise.
pub fn decode_output(stdout: &str) -> Result<Value, BridgeError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| BridgeError::ProtocolViolation("bridge produced no output".to_string()))?;

    let response: JsonRpcResponse = serde_json::from_str(line).map_err(|e| {
        BridgeError::ProtocolViolation(format!(
            "unparsable response line ({}): {}",
            e,
            preview(line, 200)
        ))
    })?;

    if let Some(error) = response.error {
        return Err(BridgeError::ToolError(error.message));
    }

    let result = response.result.ok_or_else(|| {
        BridgeError::ProtocolViolation("response has neither result nor error".to_string())
    })?;

    let payload = result
        .content
        .into_iter()
        .find_map(|block| block.text)
        .map(decode_text_payload)
        .unwrap_or(Value::Null);

    if result.is_error {
        let message = match payload {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Err(BridgeError::ToolError(message));
    }

    Ok(payload)
}

/// At most `max` characters of `line`, cut on a char boundary.
fn preview(line: &str, max: usize) -> &str {
    match line.char_indices().nth(max) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// The nested text is JSON when possible, otherwise the literal string.
fn decode_text_payload(text: Value) -> Value {
    match text {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}
