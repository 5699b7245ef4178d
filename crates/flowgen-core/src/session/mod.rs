//! Agent session: one request driven through one reasoning process.
//!
//! ```text
//! NotStarted ──start──▶ Streaming ──FinalResult──▶ Finalizing ──▶ Completed
//!                           │                           │
//!                           └──Error / transport loss───┴──────▶ Failed
//! ```
//!
//! Failed is terminal. A session stopped for a permission decision is
//! continued by a fresh session built from its [`ResumeState`].

mod driver;
mod process;
mod prompt;
mod resume;

pub use driver::{SessionDriver, SessionOutcome, StepOutcome};
pub use process::{build_args, build_mcp_config, user_message_line, EventStream, ReasoningProcess};
pub use prompt::{build_payload, render_transcript, STRUCTURAL_CONTRACT};
pub use resume::{PermissionDecision, ResumeState};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bridge::Capability;
use crate::config::FlowgenConfig;
use crate::interpreter::TASK_LIST_TOOL;

/// Host primitives the reasoning process may use besides the bridge.
pub const HOST_PRIMITIVES: [&str; 3] = ["Read", "Write", TASK_LIST_TOOL];

/// Permission mode that skips every prompt.
pub const BYPASS_PERMISSIONS: &str = "bypassPermissions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Streaming,
    Finalizing,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not_started",
            SessionState::Streaming => "streaming",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One prior conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-session settings handed to the reasoning process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub model: Option<String>,
    /// Declared tool surface, in the reasoning process's naming.
    pub allowed_tools: Vec<String>,
    pub permission_mode: String,
    /// Name the bridge is registered under on the reasoning side.
    pub server_name: String,
}

impl SessionConfig {
    pub fn new(server_name: impl Into<String>) -> Self {
        let server_name = server_name.into();
        Self {
            model: None,
            allowed_tools: declared_tools(&server_name),
            permission_mode: BYPASS_PERMISSIONS.to_string(),
            server_name,
        }
    }

    pub fn from_config(config: &FlowgenConfig) -> Self {
        Self {
            model: config.reasoning.model.clone(),
            permission_mode: config.reasoning.permission_mode.clone(),
            ..Self::new(config.bridge.server_name.clone())
        }
    }

    pub fn bypasses_permissions(&self) -> bool {
        self.permission_mode == BYPASS_PERMISSIONS
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(crate::config::BridgeConfig::default().server_name)
    }
}

/// The bridge registry plus host primitives. Nothing else.
pub fn declared_tools(server_name: &str) -> Vec<String> {
    Capability::ALL
        .iter()
        .map(|c| c.tool_name(server_name))
        .chain(HOST_PRIMITIVES.iter().map(|t| t.to_string()))
        .collect()
}

/// Identity and inputs of one session. Mutated only by its driver.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub request: String,
    pub prior_turns: Vec<Turn>,
    pub config: SessionConfig,
    pub state: SessionState,
}

impl Session {
    pub fn new(request: impl Into<String>, prior_turns: Vec<Turn>, config: SessionConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request: request.into(),
            prior_turns,
            config,
            state: SessionState::NotStarted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_tools_are_registry_plus_primitives() {
        let tools = declared_tools("flow");
        assert_eq!(tools.len(), Capability::ALL.len() + HOST_PRIMITIVES.len());
        assert!(tools.contains(&"mcp__flow__list_capabilities".to_string()));
        assert!(tools.contains(&"mcp__flow__validate_parameters".to_string()));
        assert!(tools.contains(&"TodoWrite".to_string()));
        assert!(!tools.iter().any(|t| t == "Bash"));
    }

    #[test]
    fn test_config_from_flowgen_config() {
        let mut config = FlowgenConfig::default();
        config.reasoning.model = Some("claude-opus".into());
        config.bridge.server_name = "flows".into();
        let session = SessionConfig::from_config(&config);
        assert_eq!(session.model.as_deref(), Some("claude-opus"));
        assert_eq!(session.server_name, "flows");
        assert!(session.bypasses_permissions());
        assert!(session
            .allowed_tools
            .contains(&"mcp__flows__describe_operation".to_string()));
    }

    #[test]
    fn test_new_session_not_started() {
        let session = Session::new("simple API", vec![], SessionConfig::default());
        assert_eq!(session.state, SessionState::NotStarted);
        assert!(!session.state.is_terminal());
        assert_eq!(SessionState::Failed.to_string(), "failed");
    }
}
