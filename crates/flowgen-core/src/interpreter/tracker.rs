//! Event tracker: per-session state derived from the event stream.
//!
//! Owned by exactly one driver and mutated sequentially; nothing here is
//! shared or locked.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use super::events::{PermissionRequest, StreamEvent, TaskItem};
use crate::bridge::Capability;
use super::tasks::{TaskList, TaskListViolation};

/// Tool the reasoning process uses to publish its task list.
pub const TASK_LIST_TOOL: &str = "TodoWrite";

/// What the driver should do after an event was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Continue,
    /// The session now waits for a caller decision.
    AwaitingInput(PermissionRequest),
    /// Literal candidate artifact text.
    Final(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultRecord {
    pub id: String,
    pub output: Value,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    /// Set when the call went to the capability bridge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    pub input: Value,
    pub result: Option<ToolResultRecord>,
}

#[derive(Debug, Default)]
pub struct EventTracker {
    transcript: Vec<String>,
    tool_calls: Vec<ToolCallRecord>,
    by_id: HashMap<String, usize>,
    orphaned_results: Vec<ToolResultRecord>,
    task_list: TaskList,
    task_violations: Vec<TaskListViolation>,
    pending_permission: Option<PermissionRequest>,
}

impl EventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event.
    pub fn apply(&mut self, event: StreamEvent) -> Disposition {
        match event {
            StreamEvent::AssistantText { text } => {
                self.transcript.push(text);
                Disposition::Continue
            }

            StreamEvent::ToolInvocation { id, name, input } => {
                if name == TASK_LIST_TOOL {
                    match parse_task_snapshot(&input) {
                        Some(tasks) => self.replace_tasks(tasks),
                        None => tracing::warn!(
                            "[Tracker] {} invocation {} without a readable task list",
                            TASK_LIST_TOOL,
                            id
                        ),
                    }
                }
                self.record_invocation(id, name, input);
                Disposition::Continue
            }

            StreamEvent::ToolResult { id, output, is_error } => {
                if is_error {
                    tracing::debug!("[Tracker] tool {} reported an error", id);
                }
                let record = ToolResultRecord { id, output, is_error };
                match self.by_id.get(&record.id) {
                    Some(&idx) => {
                        let call = &mut self.tool_calls[idx];
                        if call.result.is_some() {
                            tracing::warn!("[Tracker] second result for tool call {}", record.id);
                        }
                        call.result = Some(record);
                    }
                    None => {
                        tracing::info!("[Tracker] orphaned tool result {}", record.id);
                        self.orphaned_results.push(record);
                    }
                }
                Disposition::Continue
            }

            StreamEvent::TaskListUpdate { tasks } => {
                self.replace_tasks(tasks);
                Disposition::Continue
            }

            StreamEvent::PermissionRequest(request) => {
                self.pending_permission = Some(request.clone());
                Disposition::AwaitingInput(request)
            }

            StreamEvent::FinalResult { text } => Disposition::Final(text),

            StreamEvent::Error { message } => Disposition::Failed(message),
        }
    }

    fn record_invocation(&mut self, id: String, name: String, input: Value) {
        let capability = Capability::from_tool_name(&name);
        if let Some(&idx) = self.by_id.get(&id) {
            tracing::debug!("[Tracker] tool call {} re-announced", id);
            let call = &mut self.tool_calls[idx];
            call.name = name;
            call.capability = capability;
            call.input = input;
            return;
        }
        if let Some(cap) = capability {
            tracing::debug!("[Tracker] bridge call {} -> {}", id, cap);
        }
        self.by_id.insert(id.clone(), self.tool_calls.len());
        self.tool_calls.push(ToolCallRecord {
            id,
            name,
            capability,
            input,
            result: None,
        });
    }

    fn replace_tasks(&mut self, tasks: Vec<TaskItem>) {
        let violations = self.task_list.replace(tasks);
        self.task_violations.extend(violations);
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCallRecord> {
        self.by_id.get(id).map(|&idx| &self.tool_calls[idx])
    }

    /// Invocations that went to the capability bridge.
    pub fn bridge_calls(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.tool_calls.iter().filter(|c| c.capability.is_some())
    }

    /// Invocations still waiting for their result.
    pub fn unpaired(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.tool_calls.iter().filter(|c| c.result.is_none())
    }

    /// Results that arrived with no matching invocation. Kept for audit.
    pub fn orphaned_results(&self) -> &[ToolResultRecord] {
        &self.orphaned_results
    }

    pub fn task_list(&self) -> &TaskList {
        &self.task_list
    }

    pub fn task_violations(&self) -> &[TaskListViolation] {
        &self.task_violations
    }

    pub fn pending_permission(&self) -> Option<&PermissionRequest> {
        self.pending_permission.as_ref()
    }
}

fn parse_task_snapshot(input: &Value) -> Option<Vec<TaskItem>> {
    let todos = input.get("todos").cloned()?;
    serde_json::from_value(todos).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::events::TaskStatus;
    use serde_json::json;

    #[test]
    fn test_result_attaches_to_invocation_out_of_order() {
        let mut tracker = EventTracker::new();
        tracker.apply(StreamEvent::ToolInvocation {
            id: "a".into(),
            name: "mcp__flow__list_capabilities".into(),
            input: json!({}),
        });
        tracker.apply(StreamEvent::ToolInvocation {
            id: "b".into(),
            name: "Read".into(),
            input: json!({"file_path": "x"}),
        });
        tracker.apply(StreamEvent::AssistantText { text: "checking".into() });
        tracker.apply(StreamEvent::ToolResult {
            id: "b".into(),
            output: json!("file body"),
            is_error: false,
        });
        assert_eq!(tracker.unpaired().count(), 1);

        tracker.apply(StreamEvent::ToolResult {
            id: "a".into(),
            output: json!(["py", "aci"]),
            is_error: false,
        });
        assert_eq!(tracker.unpaired().count(), 0);
        assert_eq!(
            tracker.tool_call("a").unwrap().result.as_ref().unwrap().output,
            json!(["py", "aci"])
        );
        assert_eq!(tracker.transcript(), &["checking".to_string()]);
    }

    #[test]
    fn test_bridge_calls_are_tagged() {
        let mut tracker = EventTracker::new();
        tracker.apply(StreamEvent::ToolInvocation {
            id: "a".into(),
            name: "mcp__flow__describe_operation".into(),
            input: json!({"capability": "slack", "operation": "post"}),
        });
        tracker.apply(StreamEvent::ToolInvocation {
            id: "b".into(),
            name: "Write".into(),
            input: json!({}),
        });

        assert_eq!(
            tracker.tool_call("a").unwrap().capability,
            Some(Capability::DescribeOperation)
        );
        assert_eq!(tracker.tool_call("b").unwrap().capability, None);
        let bridge: Vec<&str> = tracker.bridge_calls().map(|c| c.id.as_str()).collect();
        assert_eq!(bridge, vec!["a"]);

        let value = serde_json::to_value(tracker.tool_call("a").unwrap()).unwrap();
        assert_eq!(value["capability"], "describe_operation");
        assert!(serde_json::to_value(tracker.tool_call("b").unwrap())
            .unwrap()
            .get("capability")
            .is_none());
    }

    #[test]
    fn test_orphaned_result_retained_unlinked() {
        let mut tracker = EventTracker::new();
        let d = tracker.apply(StreamEvent::ToolResult {
            id: "ghost".into(),
            output: json!("late"),
            is_error: false,
        });
        assert_eq!(d, Disposition::Continue);
        assert!(tracker.tool_calls().is_empty());
        assert_eq!(tracker.orphaned_results().len(), 1);
        assert_eq!(tracker.orphaned_results()[0].id, "ghost");
    }

    #[test]
    fn test_tool_error_is_not_escalated() {
        let mut tracker = EventTracker::new();
        tracker.apply(StreamEvent::ToolInvocation {
            id: "a".into(),
            name: "mcp__flow__describe_operation".into(),
            input: json!({}),
        });
        let d = tracker.apply(StreamEvent::ToolResult {
            id: "a".into(),
            output: json!("unknown operation"),
            is_error: true,
        });
        assert_eq!(d, Disposition::Continue);
        assert!(tracker.tool_call("a").unwrap().result.as_ref().unwrap().is_error);
    }

    #[test]
    fn test_task_tool_replaces_list() {
        let mut tracker = EventTracker::new();
        tracker.apply(StreamEvent::ToolInvocation {
            id: "t1".into(),
            name: TASK_LIST_TOOL.into(),
            input: json!({"todos": [
                {"content": "Inspect capabilities", "status": "in_progress", "activeForm": "Inspecting capabilities"},
                {"content": "Write flow", "status": "pending", "activeForm": "Writing flow"}
            ]}),
        });
        let items = tracker.task_list().items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "Inspecting capabilities");
        assert_eq!(items[1].status, TaskStatus::Pending);
        assert_eq!(tracker.tool_calls().len(), 1);
    }

    #[test]
    fn test_unreadable_task_input_leaves_list() {
        let mut tracker = EventTracker::new();
        tracker.apply(StreamEvent::TaskListUpdate {
            tasks: vec![TaskItem::new("A", TaskStatus::InProgress)],
        });
        tracker.apply(StreamEvent::ToolInvocation {
            id: "t".into(),
            name: TASK_LIST_TOOL.into(),
            input: json!({"todos": "not a list"}),
        });
        assert_eq!(tracker.task_list().items().len(), 1);
    }

    #[test]
    fn test_permission_request_sets_pending() {
        let mut tracker = EventTracker::new();
        let request = PermissionRequest {
            id: "p1".into(),
            tool_name: Some("Write".into()),
            question: "Allow writing credentials?".into(),
            required_fields: vec!["api_key".into()],
        };
        let d = tracker.apply(StreamEvent::PermissionRequest(request.clone()));
        assert_eq!(d, Disposition::AwaitingInput(request.clone()));
        assert_eq!(tracker.pending_permission(), Some(&request));
    }

    #[test]
    fn test_terminal_dispositions() {
        let mut tracker = EventTracker::new();
        assert_eq!(
            tracker.apply(StreamEvent::FinalResult { text: "[workflow]".into() }),
            Disposition::Final("[workflow]".into())
        );
        assert_eq!(
            tracker.apply(StreamEvent::Error { message: "boom".into() }),
            Disposition::Failed("boom".into())
        );
    }
}
