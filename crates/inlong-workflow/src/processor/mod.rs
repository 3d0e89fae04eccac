//! Task processors
//!
//! A processor owns the row-level lifecycle of one task kind: it creates the
//! task rows when the engine enters a task, completes them when an action (or
//! the automation itself) finishes the task, and names the successors.

mod service_task;
mod user_task;

pub use service_task::ServiceTaskProcessor;
pub use user_task::UserTaskProcessor;

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::WorkflowContext;
use crate::definition::WorkflowTask;
use crate::Result;

#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Persist the task rows for `task` and fire `TaskEvent::Create`
    async fn create(&self, task: &Arc<WorkflowTask>, context: &mut WorkflowContext) -> Result<()>;

    /// Whether the task waits for an operator action before completing
    fn pending_for_action(&self, context: &WorkflowContext) -> bool;

    /// Complete the current task row; returns whether the task finished
    async fn complete(&self, context: &mut WorkflowContext) -> Result<bool>;

    /// Successor task names, empty while the task is still waiting
    async fn next(&self, task: &WorkflowTask, context: &WorkflowContext) -> Result<Vec<String>>;
}
