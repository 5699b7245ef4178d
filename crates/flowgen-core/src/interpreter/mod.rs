//! Event interpreter: turns reasoning-process output into typed events and
//! tracks the per-session state they imply.

mod events;
mod stream;
mod tasks;
mod tracker;

pub use events::{PermissionRequest, StreamEvent, TaskItem, TaskStatus};
pub use stream::StreamDecoder;
pub use tasks::{TaskList, TaskListViolation};
pub use tracker::{Disposition, EventTracker, ToolCallRecord, ToolResultRecord, TASK_LIST_TOOL};
