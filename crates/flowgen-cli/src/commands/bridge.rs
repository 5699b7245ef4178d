//! `flowgen invoke` and `flowgen capabilities`: direct bridge access.

use flowgen_core::bridge::describe_registry;
use flowgen_core::{CapabilityBridge, FlowgenConfig};
use serde_json::{json, Value};

use super::print_json;

/// The capability registry as JSON.
pub fn capabilities_json(server_name: &str) -> Value {
    let entries: Vec<Value> = describe_registry()
        .into_iter()
        .map(|info| {
            json!({
                "name": info.name,
                "tool": format!("mcp__{}__{}", server_name, info.name),
                "description": info.description,
                "arguments": info.arguments,
            })
        })
        .collect();
    Value::Array(entries)
}

pub fn capabilities(config: &FlowgenConfig) -> Result<(), String> {
    print_json(&capabilities_json(&config.bridge.server_name));
    Ok(())
}

/// Run one bridge call and return its decoded result.
pub async fn call(config: &FlowgenConfig, name: &str, args_str: &str) -> Result<Value, String> {
    let args: Value =
        serde_json::from_str(args_str).map_err(|e| format!("Invalid JSON args: {}", e))?;
    let bridge = CapabilityBridge::new(config.bridge.clone());
    bridge.invoke(name, args).await.map_err(|e| e.to_string())
}

pub async fn invoke(config: &FlowgenConfig, name: &str, args_str: &str) -> Result<(), String> {
    let result = call(config, name, args_str).await?;
    print_json(&result);
    Ok(())
}
