//! Workflow execution context

use inlong_core::{WorkflowProcessEntity, WorkflowTaskEntity};
use std::fmt;
use std::sync::Arc;

use crate::definition::{WorkflowProcess, WorkflowTask};
use crate::event::WorkflowAction;
use crate::form::{ProcessForm, TaskForm};
use crate::{Result, WorkflowError};

/// The operator action being applied to one task row
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub action: WorkflowAction,
    pub operator: String,
    pub remark: Option<String>,
    pub form: Option<TaskForm>,
    pub transfer_to_users: Vec<String>,
    /// Copy of the row the action applies to; the repository holds the truth
    pub task_entity: WorkflowTaskEntity,
}

impl ActionContext {
    pub fn new(action: WorkflowAction, operator: impl Into<String>, task_entity: WorkflowTaskEntity) -> Self {
        Self {
            action,
            operator: operator.into(),
            remark: None,
            form: None,
            transfer_to_users: Vec::new(),
            task_entity,
        }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn with_form(mut self, form: TaskForm) -> Self {
        self.form = Some(form);
        self
    }

    pub fn with_transfer_to<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transfer_to_users = users.into_iter().map(Into::into).collect();
        self
    }
}

/// State threaded through one workflow step.
///
/// Notifiers hand listeners a snapshot; writes a listener could make never
/// reach the caller's copy.
#[derive(Clone)]
pub struct WorkflowContext {
    pub applicant: String,
    pub process: Arc<WorkflowProcess>,
    pub process_form: Option<ProcessForm>,
    pub process_entity: WorkflowProcessEntity,
    pub current_element: Option<Arc<WorkflowTask>>,
    pub action_context: Option<ActionContext>,
    pub new_tasks: Vec<WorkflowTaskEntity>,
}

impl WorkflowContext {
    pub fn new(process: Arc<WorkflowProcess>, process_entity: WorkflowProcessEntity) -> Self {
        Self {
            applicant: process_entity.applicant.clone(),
            process,
            process_form: None,
            process_entity,
            current_element: None,
            action_context: None,
            new_tasks: Vec::new(),
        }
    }

    pub fn with_form(mut self, form: ProcessForm) -> Self {
        self.process_form = Some(form);
        self
    }

    pub fn with_current_element(mut self, task: Arc<WorkflowTask>) -> Self {
        self.current_element = Some(task);
        self
    }

    pub fn with_action(mut self, action: ActionContext) -> Self {
        self.action_context = Some(action);
        self
    }

    pub fn current_task(&self) -> Result<&Arc<WorkflowTask>> {
        self.current_element.as_ref().ok_or_else(|| {
            WorkflowError::Configuration(format!(
                "no current element in process {}",
                self.process.name()
            ))
        })
    }

    pub fn action(&self) -> Result<&ActionContext> {
        self.action_context.as_ref().ok_or_else(|| {
            WorkflowError::Configuration(format!(
                "no action context in process {}",
                self.process.name()
            ))
        })
    }

    pub fn action_mut(&mut self) -> Result<&mut ActionContext> {
        let process = self.process.name().to_string();
        self.action_context.as_mut().ok_or_else(|| {
            WorkflowError::Configuration(format!("no action context in process {process}"))
        })
    }

    /// Group the process works on, from the form first, then the entity
    pub fn inlong_group_id(&self) -> Option<&str> {
        self.process_form
            .as_ref()
            .and_then(ProcessForm::inlong_group_id)
            .or(self.process_entity.inlong_group_id.as_deref())
    }
}

impl fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("process", &self.process.name())
            .field("process_id", &self.process_entity.id)
            .field("applicant", &self.applicant)
            .field(
                "current_element",
                &self.current_element.as_ref().map(|task| task.name()),
            )
            .field("action", &self.action_context.as_ref().map(|a| a.action))
            .field("new_tasks", &self.new_tasks.len())
            .finish()
    }
}
