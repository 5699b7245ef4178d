//! Self-tracked task list.
//!
//! Upstream sends full snapshots, so every update replaces the list.
//! Invariant checks only log: the list is the reasoning process's own
//! bookkeeping and a bad snapshot must not stop generation.

use std::collections::HashSet;

use super::events::{TaskItem, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskListViolation {
    /// More than one entry is `in_progress`.
    MultipleInProgress(usize),
    /// An entry completed earlier in the session is no longer completed.
    Reopened(String),
}

#[derive(Debug, Clone, Default)]
pub struct TaskList {
    items: Vec<TaskItem>,
    completed: HashSet<String>,
}

impl TaskList {
    pub fn items(&self) -> &[TaskItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn in_progress(&self) -> Option<&TaskItem> {
        self.items.iter().find(|t| t.status == TaskStatus::InProgress)
    }

    pub fn completed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// Replace the list with a new snapshot. Returns what the snapshot
    /// violated; the snapshot is applied regardless.
    pub fn replace(&mut self, snapshot: Vec<TaskItem>) -> Vec<TaskListViolation> {
        let mut violations = Vec::new();

        let in_progress = snapshot
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .count();
        if in_progress > 1 {
            tracing::warn!("[Tasks] {} entries in progress at once", in_progress);
            violations.push(TaskListViolation::MultipleInProgress(in_progress));
        }

        for item in &snapshot {
            if item.status != TaskStatus::Completed && self.completed.contains(&item.content) {
                tracing::warn!("[Tasks] completed entry reopened: {}", item.content);
                violations.push(TaskListViolation::Reopened(item.content.clone()));
            }
        }

        self.completed.extend(
            snapshot
                .iter()
                .filter(|t| t.status == TaskStatus::Completed)
                .map(|t| t.content.clone()),
        );
        self.items = snapshot;
        violations
    }
}
