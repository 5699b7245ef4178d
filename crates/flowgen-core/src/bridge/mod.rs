//! Capability Bridge: per-call subprocess JSON-RPC client.
//!
//! Every `invoke` spawns a fresh bridge process, writes one `tools/call`
//! request to its stdin, closes stdin and reads stdout to EOF. No state is
//! shared between calls, so independent calls may run concurrently and a
//! hung or misbehaving process only affects its own call.
//!
//! The bridge never retries; the caller decides what a failure means.

pub mod protocol;
pub mod registry;

pub use protocol::{JsonRpcRequest, JsonRpcResponse};
pub use registry::{describe_registry, Capability, CapabilityInfo};

use std::process::Stdio;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Client for the capability registry process.
#[derive(Debug, Clone)]
pub struct CapabilityBridge {
    config: BridgeConfig,
}

impl CapabilityBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Invoke a registry operation by name.
    ///
    /// Names outside the registry are rejected without spawning anything.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, BridgeError> {
        let capability: Capability = name.parse()?;
        self.call(capability, args).await
    }

    /// Invoke a registry operation.
    pub async fn call(&self, capability: Capability, args: Value) -> Result<Value, BridgeError> {
        let request = JsonRpcRequest::tools_call(capability.as_str(), args);
        let mut payload = serde_json::to_string(&request)
            .map_err(|e| BridgeError::Io(format!("Failed to encode request: {}", e)))?;
        payload.push('\n');

        tracing::debug!(
            "[Bridge] {} → {} {}",
            capability,
            self.config.command,
            self.config.args.join(" ")
        );

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = self.config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::Spawn(format!(
                "'{}': {}. Is it installed and in PATH?",
                self.config.command, e
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Io("No stdin on bridge process".to_string()))?;

        // Write concurrently with draining stdout so a chatty process can't
        // block on a full pipe while we're still writing.
        let write = async move {
            let result = stdin.write_all(payload.as_bytes()).await;
            let _ = stdin.shutdown().await;
            result
        };
        let (write_result, output) = tokio::join!(write, child.wait_with_output());

        let output = output.map_err(|e| BridgeError::Io(format!("Failed to read bridge output: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exit code {}", output.status.code().unwrap_or(-1))
            } else {
                stderr
            };
            tracing::warn!("[Bridge] {} failed: {}", capability, message);
            return Err(BridgeError::ProcessFailed(message));
        }

        // A process that exits 0 without reading stdin still produced an answer.
        if let Err(e) = write_result {
            tracing::debug!("[Bridge] {} did not read its request: {}", capability, e);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = protocol::decode_output(&stdout)?;
        tracing::debug!("[Bridge] {} ok", capability);
        Ok(value)
    }
}
