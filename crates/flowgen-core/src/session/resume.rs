//! Resumable sessions.
//!
//! A session that stops for a permission decision is not continued in
//! place. Its request and conversation are saved, and the caller's decision
//! becomes the next user turn of a fresh session.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Turn;
use crate::error::SessionError;
use crate::interpreter::PermissionRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeState {
    /// Request of the session that stopped.
    pub request: String,
    /// Conversation up to and including that session.
    pub prior_turns: Vec<Turn>,
    pub pending_permission: PermissionRequest,
}

/// The caller's answer to a permission request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub approved: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PermissionDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            ..Self::default()
        }
    }

    pub fn reject() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl ResumeState {
    /// Snapshot a stopped session. The assistant's transcript so far is
    /// kept as one assistant turn.
    pub fn capture(
        request: &str,
        prior_turns: &[Turn],
        transcript: &[String],
        pending_permission: PermissionRequest,
    ) -> Self {
        let mut turns = prior_turns.to_vec();
        turns.push(Turn::user(request));
        let said = transcript.join("\n");
        if !said.trim().is_empty() {
            turns.push(Turn::assistant(said));
        }
        Self {
            request: request.to_string(),
            prior_turns: turns,
            pending_permission,
        }
    }

    /// Required fields the decision leaves empty. Only approvals need them.
    pub fn missing_fields(&self, decision: &PermissionDecision) -> Vec<String> {
        if !decision.approved {
            return Vec::new();
        }
        self.pending_permission
            .required_fields
            .iter()
            .filter(|f| {
                decision
                    .fields
                    .get(f.as_str())
                    .map_or(true, |v| v.trim().is_empty())
            })
            .cloned()
            .collect()
    }

    /// Turn the decision into the next session's request and prior turns.
    pub fn into_next_turn(
        self,
        decision: &PermissionDecision,
    ) -> Result<(String, Vec<Turn>), SessionError> {
        let missing = self.missing_fields(decision);
        if !missing.is_empty() {
            return Err(SessionError::MissingFields(missing));
        }

        let request = &self.pending_permission;
        let mut text = String::new();
        if decision.approved {
            text.push_str(&format!("Approved: \"{}\"", request.question));
        } else {
            text.push_str(&format!("Rejected: \"{}\"", request.question));
        }
        if let Some(tool) = &request.tool_name {
            text.push_str(&format!(" ({})", tool));
        }
        text.push('\n');

        if decision.approved && !decision.fields.is_empty() {
            text.push_str("Provided values:\n");
            for (name, value) in &decision.fields {
                text.push_str(&format!("- {}: {}\n", name, value));
            }
        }
        if let Some(note) = decision.note.as_deref().filter(|n| !n.trim().is_empty()) {
            text.push_str(note.trim());
            text.push('\n');
        }
        if decision.approved {
            text.push_str("Continue generating the workflow.");
        } else {
            text.push_str("Continue generating the workflow without it.");
        }

        Ok((text, self.prior_turns))
    }

    pub async fn save(&self, path: &Path) -> Result<(), SessionError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SessionError::Resume(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::Resume(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| SessionError::Resume(format!("{}: {}", path.display(), e)))
    }

    pub async fn load(path: &Path) -> Result<Self, SessionError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SessionError::Resume(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&json).map_err(|e| SessionError::Resume(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn state() -> ResumeState {
        ResumeState::capture(
            "post new GitHub issues to Slack",
            &[Turn::user("hi"), Turn::assistant("hello")],
            &["Checking auth".to_string(), "Slack is not connected".to_string()],
            PermissionRequest {
                id: "req_1".into(),
                tool_name: Some("mcp__flow__get_auth_status".into()),
                question: "Connect Slack?".into(),
                required_fields: vec!["bot_token".into()],
            },
        )
    }

    #[test]
    fn test_capture_appends_request_and_transcript() {
        let state = state();
        assert_eq!(state.prior_turns.len(), 4);
        assert_eq!(state.prior_turns[2], Turn::user("post new GitHub issues to Slack"));
        assert_eq!(state.prior_turns[3].role, Role::Assistant);
        assert_eq!(state.prior_turns[3].content, "Checking auth\nSlack is not connected");
    }

    #[test]
    fn test_approval_requires_fields() {
        let err = state()
            .into_next_turn(&PermissionDecision::approve())
            .unwrap_err();
        match err {
            SessionError::MissingFields(fields) => assert_eq!(fields, vec!["bot_token"]),
            other => panic!("unexpected {:?}", other),
        }

        let blank = PermissionDecision::approve().with_field("bot_token", "  ");
        assert_eq!(state().missing_fields(&blank), vec!["bot_token"]);
    }

    #[test]
    fn test_approval_becomes_next_user_turn() {
        let decision = PermissionDecision::approve().with_field("bot_token", "xoxb-1");
        let (request, turns) = state().into_next_turn(&decision).unwrap();
        assert!(request.starts_with("Approved: \"Connect Slack?\""));
        assert!(request.contains("- bot_token: xoxb-1"));
        assert_eq!(turns.len(), 4);
    }

    #[test]
    fn test_rejection_needs_no_fields() {
        let decision = PermissionDecision::reject().with_note("use email instead");
        let (request, _) = state().into_next_turn(&decision).unwrap();
        assert!(request.starts_with("Rejected:"));
        assert!(request.contains("use email instead"));
        assert!(request.ends_with("without it."));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("resume.json");
        let original = state();
        original.save(&path).await.unwrap();
        let loaded = ResumeState::load(&path).await.unwrap();
        assert_eq!(loaded, original);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["pendingPermission"]["requiredFields"][0], "bot_token");
    }
}
