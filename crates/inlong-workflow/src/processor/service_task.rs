//! Automated task processor
//!
//! Service tasks complete as soon as their listeners have run. The listeners
//! do the work (create topics, push sort config, start sources); the row only
//! records whether they succeeded.

use async_trait::async_trait;
use chrono::Utc;
use inlong_core::{TaskEntityRepository, TaskStatus, WorkflowTaskEntity};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::TaskProcessor;
use crate::context::{ActionContext, WorkflowContext};
use crate::definition::WorkflowTask;
use crate::event::{TaskEvent, WorkflowAction};
use crate::notifier::TaskEventNotifier;
use crate::{Result, WorkflowError};

pub struct ServiceTaskProcessor {
    task_repo: Arc<dyn TaskEntityRepository>,
    notifier: Arc<TaskEventNotifier>,
    system_operator: String,
}

impl ServiceTaskProcessor {
    pub fn new(
        task_repo: Arc<dyn TaskEntityRepository>,
        notifier: Arc<TaskEventNotifier>,
        system_operator: impl Into<String>,
    ) -> Self {
        Self {
            task_repo,
            notifier,
            system_operator: system_operator.into(),
        }
    }

    /// Attach an action context for the current service task row when the
    /// caller has not supplied one
    fn ensure_action(&self, task: &WorkflowTask, context: &mut WorkflowContext) -> Result<()> {
        if context.action_context.is_some() {
            return Ok(());
        }
        let entity = context
            .new_tasks
            .iter()
            .rev()
            .find(|row| row.name == task.name())
            .cloned()
            .ok_or_else(|| {
                WorkflowError::InvalidState(format!("no task row created for {}", task.name()))
            })?;
        context.action_context = Some(ActionContext::new(
            WorkflowAction::Complete,
            self.system_operator.clone(),
            entity,
        ));
        Ok(())
    }

    async fn finish(
        &self,
        context: &mut WorkflowContext,
        status: TaskStatus,
        remark: Option<String>,
    ) -> Result<WorkflowTaskEntity> {
        let action = context.action_mut()?;
        let mut entity = action.task_entity.clone();
        entity.status = status;
        entity.operator = Some(self.system_operator.clone());
        entity.remark = remark;
        entity.end_time = Some(Utc::now());

        let stored = self.task_repo.update(&entity).await?;
        action.task_entity = stored.clone();
        Ok(stored)
    }
}

#[async_trait]
impl TaskProcessor for ServiceTaskProcessor {
    async fn create(&self, task: &Arc<WorkflowTask>, context: &mut WorkflowContext) -> Result<()> {
        if task.as_service().is_none() {
            return Err(WorkflowError::Configuration(format!(
                "task {} is not a service task",
                task.name()
            )));
        }
        context.current_element = Some(Arc::clone(task));

        let entity = WorkflowTaskEntity::pending(
            WorkflowTask::SERVICE_TASK,
            &context.process_entity,
            task.name(),
            task.display_name(),
            self.system_operator.clone(),
        );
        let saved = self.task_repo.insert(entity).await?;
        info!(task_id = saved.id, task = %task.name(), "Service task row created");
        context.new_tasks.push(saved);

        self.notifier.notify(TaskEvent::Create, context).await
    }

    fn pending_for_action(&self, _context: &WorkflowContext) -> bool {
        false
    }

    async fn complete(&self, context: &mut WorkflowContext) -> Result<bool> {
        let task = Arc::clone(context.current_task()?);
        if task.as_service().is_none() {
            return Err(WorkflowError::Configuration(format!(
                "task {} is not a service task",
                task.name()
            )));
        }
        self.ensure_action(&task, context)?;

        let row = &context.action()?.task_entity;
        if row.status != TaskStatus::Pending {
            return Err(WorkflowError::InvalidState(format!(
                "task {} is {}, expected {}",
                row.id,
                row.status,
                TaskStatus::Pending
            )));
        }
        if row.name != task.name() {
            return Err(WorkflowError::Configuration(format!(
                "task row {} belongs to {}, not {}",
                row.id,
                row.name,
                task.name()
            )));
        }

        match self.notifier.notify(TaskEvent::Complete, context).await {
            Ok(()) => {
                let stored = self.finish(context, TaskStatus::Completed, None).await?;
                info!(task_id = stored.id, task = %task.name(), "Service task completed");
                Ok(true)
            }
            Err(e) => {
                error!(task = %task.name(), error = %e, "Service task failed");
                if let Err(update_error) = self.finish(context, TaskStatus::Failed, Some(e.to_string())).await {
                    warn!(
                        task = %task.name(),
                        error = %update_error,
                        "Failed to mark service task as failed"
                    );
                }
                if let Err(fail_error) = self.notifier.notify(TaskEvent::Fail, context).await {
                    warn!(
                        task = %task.name(),
                        error = %fail_error,
                        "Service task fail listeners failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn next(&self, task: &WorkflowTask, _context: &WorkflowContext) -> Result<Vec<String>> {
        Ok(task.next().to_vec())
    }
}
