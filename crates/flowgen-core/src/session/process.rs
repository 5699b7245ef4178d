//! Reasoning process adapter.
//!
//! Spawns a Claude Code compatible CLI in stream-json mode, writes the
//! instruction payload as a single user message and closes stdin. A
//! background task decodes stdout into [`StreamEvent`]s.

use std::process::Stdio;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::SessionConfig;
use crate::config::{BridgeConfig, ReasoningConfig};
use crate::error::SessionError;
use crate::interpreter::{StreamDecoder, StreamEvent};

/// Events buffered between the stdout reader and the driver.
const EVENT_BUFFER: usize = 256;

const DISPLAY_NAME: &str = "flowgen";

/// MCP config declaring the bridge as the only server.
pub fn build_mcp_config(bridge: &BridgeConfig) -> Value {
    let mut server = json!({
        "type": "stdio",
        "command": bridge.command,
        "args": bridge.args,
    });
    if !bridge.env.is_empty() {
        server["env"] = json!(bridge.env);
    }
    json!({ "mcpServers": { bridge.server_name.clone(): server } })
}

/// Command-line arguments for the reasoning CLI.
pub fn build_args(config: &SessionConfig, mcp_config: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-p".into(),
        "--output-format".into(),
        "stream-json".into(),
        "--input-format".into(),
        "stream-json".into(),
        "--verbose".into(),
    ];

    if let Some(model) = config.model.as_deref().filter(|m| !m.is_empty()) {
        args.push("--model".into());
        args.push(model.to_string());
    }

    if config.bypasses_permissions() {
        args.push("--dangerously-skip-permissions".into());
    } else {
        args.push("--permission-mode".into());
        args.push(config.permission_mode.clone());
        // Route permission prompts through stdout as control requests.
        args.push("--permission-prompt-tool".into());
        args.push("stdio".into());
    }

    args.push("--disallowed-tools".into());
    args.push("AskUserQuestion".into());

    args.push("--mcp-config".into());
    args.push(mcp_config.to_string());
    args.push("--strict-mcp-config".into());

    args.push("--allowedTools".into());
    args.push(config.allowed_tools.join(","));

    args
}

/// The payload as one stream-json user message, newline terminated.
pub fn user_message_line(payload: &str) -> String {
    let message = json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{ "type": "text", "text": payload }]
        }
    });
    format!("{}\n", message)
}

/// Handle on a running reasoning process.
pub struct ReasoningProcess {
    child: Child,
}

impl ReasoningProcess {
    /// Start the process and hand back its event stream.
    pub async fn spawn(
        reasoning: &ReasoningConfig,
        bridge: &BridgeConfig,
        session: &SessionConfig,
        payload: &str,
    ) -> Result<EventStream, SessionError> {
        let mcp_config = build_mcp_config(bridge).to_string();
        let args = build_args(session, &mcp_config);

        let mut cmd = Command::new(&reasoning.command);
        cmd.args(&args);
        cmd.envs(&reasoning.env);
        cmd.current_dir(&reasoning.cwd);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::info!(
            "[ClaudeCode:{}] Spawning: {} -p --output-format stream-json ... (cwd: {})",
            DISPLAY_NAME,
            reasoning.command,
            reasoning.cwd
        );

        let mut child = cmd.spawn().map_err(|e| {
            SessionError::Transport(format!(
                "Failed to spawn reasoning process - is '{}' installed? Error: {}",
                reasoning.command, e
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Transport("Failed to get stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Transport("Failed to get stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::Transport("Failed to get stderr".into()))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            // Raw lines: a stray non-UTF-8 byte is noise, not end of stream.
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            let mut decoder = StreamDecoder::new();
            'read: loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        for event in decoder.decode_line(&line) {
                            if tx.send(event).await.is_err() {
                                break 'read;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("[ClaudeCode:{}] stdout read failed: {}", DISPLAY_NAME, e);
                        break;
                    }
                }
            }
            tracing::info!("[ClaudeCode:{}] stdout reader exited", DISPLAY_NAME);
        });

        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Ok(n) = reader.read_until(b'\n', &mut buf).await {
                if n == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf);
                if !line.trim().is_empty() {
                    tracing::warn!("[ClaudeCode:{} stderr] {}", DISPLAY_NAME, line.trim_end());
                }
                buf.clear();
            }
        });

        let message = user_message_line(payload);
        let written = async {
            stdin.write_all(message.as_bytes()).await?;
            stdin.flush().await?;
            stdin.shutdown().await
        }
        .await;
        drop(stdin);

        let mut process = ReasoningProcess { child };
        if let Err(e) = written {
            process.terminate().await;
            return Err(SessionError::Transport(format!(
                "Failed to write to stdin: {}",
                e
            )));
        }

        tracing::info!("[ClaudeCode:{}] Process started", DISPLAY_NAME);
        Ok(EventStream {
            events: rx,
            process: Some(process),
        })
    }

    /// Kill the process unless it already exited, then reap it.
    pub async fn terminate(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!("[ClaudeCode:{}] exited with {}", DISPLAY_NAME, status);
            }
            _ => {
                if let Err(e) = self.child.start_kill() {
                    tracing::debug!("[ClaudeCode:{}] kill failed: {}", DISPLAY_NAME, e);
                }
                let _ = self.child.wait().await;
                tracing::info!("[ClaudeCode:{}] Process terminated", DISPLAY_NAME);
            }
        }
    }
}

/// Ordered event source for one session.
pub struct EventStream {
    events: mpsc::Receiver<StreamEvent>,
    process: Option<ReasoningProcess>,
}

impl EventStream {
    /// A stream fed by hand, with no process behind it.
    pub fn channel(buffer: usize) -> (mpsc::Sender<StreamEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            Self {
                events: rx,
                process: None,
            },
        )
    }

    /// Next event; `None` once the source is closed.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }

    /// Stop reading and terminate the process, if any. Idempotent.
    pub async fn terminate(&mut self) {
        self.events.close();
        if let Some(mut process) = self.process.take() {
            process.terminate().await;
        }
    }
}
