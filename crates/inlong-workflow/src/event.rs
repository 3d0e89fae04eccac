//! Workflow events, actions and the listener contract

use async_trait::async_trait;
use inlong_core::TaskStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

use crate::context::WorkflowContext;
use crate::Result;

/// Common surface of process and task events
pub trait WorkflowEvent:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Event family recorded in the event log
    const EVENT_TYPE: &'static str;

    fn as_str(&self) -> &'static str;
}

/// Lifecycle events of a process instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessEvent {
    Create,
    Complete,
    Fail,
    Cancel,
    Reject,
    Terminate,
}

impl WorkflowEvent for ProcessEvent {
    const EVENT_TYPE: &'static str = "ProcessEvent";

    fn as_str(&self) -> &'static str {
        match self {
            ProcessEvent::Create => "CREATE",
            ProcessEvent::Complete => "COMPLETE",
            ProcessEvent::Fail => "FAIL",
            ProcessEvent::Cancel => "CANCEL",
            ProcessEvent::Reject => "REJECT",
            ProcessEvent::Terminate => "TERMINATE",
        }
    }
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events of a task instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEvent {
    Create,
    Approve,
    Reject,
    Transfer,
    Cancel,
    Complete,
    Fail,
    Terminate,
}

impl WorkflowEvent for TaskEvent {
    const EVENT_TYPE: &'static str = "TaskEvent";

    fn as_str(&self) -> &'static str {
        match self {
            TaskEvent::Create => "CREATE",
            TaskEvent::Approve => "APPROVE",
            TaskEvent::Reject => "REJECT",
            TaskEvent::Transfer => "TRANSFER",
            TaskEvent::Cancel => "CANCEL",
            TaskEvent::Complete => "COMPLETE",
            TaskEvent::Fail => "FAIL",
            TaskEvent::Terminate => "TERMINATE",
        }
    }
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator actions on a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAction {
    Start,
    Approve,
    Reject,
    Cancel,
    Transfer,
    Terminate,
    Complete,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::Start => "START",
            WorkflowAction::Approve => "APPROVE",
            WorkflowAction::Reject => "REJECT",
            WorkflowAction::Cancel => "CANCEL",
            WorkflowAction::Transfer => "TRANSFER",
            WorkflowAction::Terminate => "TERMINATE",
            WorkflowAction::Complete => "COMPLETE",
        }
    }

    /// Status a task row takes when the action completes it
    pub fn task_status(&self) -> Option<TaskStatus> {
        match self {
            WorkflowAction::Approve => Some(TaskStatus::Approved),
            WorkflowAction::Reject => Some(TaskStatus::Rejected),
            WorkflowAction::Cancel => Some(TaskStatus::Canceled),
            WorkflowAction::Transfer => Some(TaskStatus::Transferred),
            WorkflowAction::Terminate => Some(TaskStatus::Terminated),
            WorkflowAction::Complete => Some(TaskStatus::Completed),
            WorkflowAction::Start => None,
        }
    }

    /// Task event fired after the action completes a task
    pub fn task_event(&self) -> Option<TaskEvent> {
        match self {
            WorkflowAction::Approve => Some(TaskEvent::Approve),
            WorkflowAction::Reject => Some(TaskEvent::Reject),
            WorkflowAction::Cancel => Some(TaskEvent::Cancel),
            WorkflowAction::Transfer => Some(TaskEvent::Transfer),
            WorkflowAction::Terminate => Some(TaskEvent::Terminate),
            WorkflowAction::Complete => Some(TaskEvent::Complete),
            WorkflowAction::Start => None,
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by a listener that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerResult {
    Success,
    /// Business-level refusal; the message reaches the operator verbatim
    Fail(String),
}

impl ListenerResult {
    pub fn success() -> Self {
        ListenerResult::Success
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ListenerResult::Fail(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ListenerResult::Success)
    }
}

/// A named reaction to one workflow event.
///
/// Listeners receive a read-only view of the context. Asynchronous listeners
/// get a snapshot taken at notification time and must not rely on seeing
/// later changes.
#[async_trait]
pub trait EventListener<E: WorkflowEvent>: Send + Sync {
    /// Unique within one registry
    fn name(&self) -> &str;

    /// The event this listener reacts to
    fn event(&self) -> E;

    /// Run on the worker pool instead of inline
    fn is_async(&self) -> bool {
        false
    }

    async fn listen(&self, context: &WorkflowContext) -> Result<ListenerResult>;
}

pub type ProcessEventListener = dyn EventListener<ProcessEvent>;
pub type TaskEventListener = dyn EventListener<TaskEvent>;
