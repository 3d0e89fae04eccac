//! Approval task processor

use async_trait::async_trait;
use chrono::Utc;
use inlong_core::{TaskEntityRepository, TaskStatus, WorkflowTaskEntity};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::TaskProcessor;
use crate::context::{ActionContext, WorkflowContext};
use crate::definition::{UserTaskSpec, WorkflowTask};
use crate::event::{TaskEvent, WorkflowAction};
use crate::notifier::TaskEventNotifier;
use crate::{Result, WorkflowError};

const SUPPORTED_ACTIONS: [WorkflowAction; 5] = [
    WorkflowAction::Approve,
    WorkflowAction::Reject,
    WorkflowAction::Transfer,
    WorkflowAction::Cancel,
    WorkflowAction::Terminate,
];

/// Actions only an assigned approver may take
const OPERATOR_CHECKED_ACTIONS: [WorkflowAction; 3] = [
    WorkflowAction::Approve,
    WorkflowAction::Reject,
    WorkflowAction::Transfer,
];

pub struct UserTaskProcessor {
    task_repo: Arc<dyn TaskEntityRepository>,
    notifier: Arc<TaskEventNotifier>,
}

impl UserTaskProcessor {
    pub fn new(task_repo: Arc<dyn TaskEntityRepository>, notifier: Arc<TaskEventNotifier>) -> Self {
        Self { task_repo, notifier }
    }

    fn user_spec(task: &WorkflowTask) -> Result<&UserTaskSpec> {
        task.as_user().ok_or_else(|| {
            WorkflowError::Configuration(format!("task {} is not a user task", task.name()))
        })
    }

    fn check_operator(action: &ActionContext) -> Result<()> {
        if !OPERATOR_CHECKED_ACTIONS.contains(&action.action) {
            return Ok(());
        }
        if action.task_entity.is_approver(&action.operator) {
            return Ok(());
        }
        Err(WorkflowError::Unauthorized {
            operator: action.operator.clone(),
            approvers: action.task_entity.approvers.clone(),
        })
    }

    fn need_form(spec: &UserTaskSpec, action: WorkflowAction) -> bool {
        spec.form_kind.is_some()
            && matches!(action, WorkflowAction::Approve | WorkflowAction::Complete)
    }

    /// The row as it should be stored once the action completes it
    fn completed_entity(spec: &UserTaskSpec, action: &ActionContext) -> Result<WorkflowTaskEntity> {
        let status = action.action.task_status().ok_or_else(|| {
            WorkflowError::InvalidAction(format!("{} does not complete a task", action.action))
        })?;

        let mut entity = action.task_entity.clone();
        entity.status = status;
        entity.operator = Some(action.operator.clone());
        entity.remark = action.remark.clone();

        match (spec.form_kind, Self::need_form(spec, action.action)) {
            (Some(expected), true) => {
                let form = action
                    .form
                    .as_ref()
                    .ok_or_else(|| WorkflowError::InvalidAction("form cannot be null".to_string()))?;
                if form.kind() != expected {
                    return Err(WorkflowError::FormTypeMismatch {
                        expected: expected.to_string(),
                        actual: form.kind().to_string(),
                    });
                }
                form.validate()?;
                entity.form_data = Some(serde_json::to_string(form)?);
            }
            _ => {
                if action.form.is_some() {
                    return Err(WorkflowError::InvalidAction(format!(
                        "no form required for {}",
                        action.action
                    )));
                }
            }
        }

        entity.end_time = Some(Utc::now());
        entity.ext_params = Some(Self::merge_ext_params(action, entity.ext_params.as_deref())?);
        Ok(entity)
    }

    /// Existing extension params with the transfer targets added
    fn merge_ext_params(action: &ActionContext, existing: Option<&str>) -> Result<String> {
        let mut ext: Map<String, Value> = match existing {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)?,
            _ => Map::new(),
        };

        if action.action == WorkflowAction::Transfer {
            ext.insert(
                WorkflowTaskEntity::EXT_TRANSFER_USER_KEY.to_string(),
                Value::from(action.transfer_to_users.clone()),
            );
        }
        Ok(serde_json::to_string(&ext)?)
    }
}

#[async_trait]
impl TaskProcessor for UserTaskProcessor {
    async fn create(&self, task: &Arc<WorkflowTask>, context: &mut WorkflowContext) -> Result<()> {
        let spec = Self::user_spec(task)?;
        context.current_element = Some(Arc::clone(task));

        let assigned: Vec<String> = spec
            .approver_assign
            .assign(context)
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        info!(
            task = %task.name(),
            process_id = context.process_entity.id,
            approvers = ?assigned,
            need_all_approve = spec.need_all_approve,
            "Creating user task"
        );
        if assigned.is_empty() {
            return Err(WorkflowError::EmptyApprovers(task.display_name().to_string()));
        }

        let rows = if spec.need_all_approve {
            assigned
        } else {
            vec![assigned.join(WorkflowTaskEntity::APPROVERS_DELIMITER)]
        };

        for approvers in rows {
            let entity = WorkflowTaskEntity::pending(
                WorkflowTask::USER_TASK,
                &context.process_entity,
                task.name(),
                task.display_name(),
                approvers,
            );
            let saved = self.task_repo.insert(entity).await?;
            info!(task_id = saved.id, approvers = %saved.approvers, "User task row created");
            context.new_tasks.push(saved);
        }

        self.notifier.notify(TaskEvent::Create, context).await
    }

    fn pending_for_action(&self, _context: &WorkflowContext) -> bool {
        true
    }

    async fn complete(&self, context: &mut WorkflowContext) -> Result<bool> {
        let task = Arc::clone(context.current_task()?);
        let spec = Self::user_spec(&task)?;
        let action = context.action()?;

        if !SUPPORTED_ACTIONS.contains(&action.action) {
            return Err(WorkflowError::InvalidAction(format!(
                "user task does not support action {}",
                action.action
            )));
        }
        if action.task_entity.status != TaskStatus::Pending {
            return Err(WorkflowError::InvalidState(format!(
                "task {} is {}, expected {}",
                action.task_entity.id,
                action.task_entity.status,
                TaskStatus::Pending
            )));
        }
        if action.task_entity.name != task.name() {
            return Err(WorkflowError::Configuration(format!(
                "task row {} belongs to {}, not {}",
                action.task_entity.id,
                action.task_entity.name,
                task.name()
            )));
        }
        Self::check_operator(action)?;

        let event = action.action.task_event().ok_or_else(|| {
            WorkflowError::InvalidAction(format!("{} fires no task event", action.action))
        })?;
        let entity = Self::completed_entity(spec, action)?;
        let stored = self.task_repo.update(&entity).await?;

        info!(
            task_id = stored.id,
            task = %task.name(),
            operator = ?stored.operator,
            status = %stored.status,
            "User task completed"
        );
        context.action_mut()?.task_entity = stored;

        self.notifier.notify(event, context).await?;
        Ok(true)
    }

    async fn next(&self, task: &WorkflowTask, context: &WorkflowContext) -> Result<Vec<String>> {
        let spec = Self::user_spec(task)?;
        if spec.need_all_approve {
            let process_id = context.process_entity.id;
            let pending = self
                .task_repo
                .count_by_status(process_id, task.name(), TaskStatus::Pending)
                .await?;
            if pending > 0 {
                warn!(
                    process_id,
                    task = %task.name(),
                    pending,
                    "Task still has pending approvers"
                );
                return Ok(Vec::new());
            }
        }
        Ok(task.next().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{FixedApprovers, WorkflowProcess, END_EVENT};
    use crate::registry::TaskEventListenerManager;
    use inlong_core::{AppError, WorkflowProcessEntity};
    use inlong_infra::{MemoryEventLogRepository, WorkerPool};
    use mockall::mock;

    mock! {
        pub TaskRepo {}

        #[async_trait]
        impl TaskEntityRepository for TaskRepo {
            async fn insert(&self, entity: WorkflowTaskEntity) -> inlong_core::Result<WorkflowTaskEntity>;
            async fn update(&self, entity: &WorkflowTaskEntity) -> inlong_core::Result<WorkflowTaskEntity>;
            async fn get(&self, id: i64) -> inlong_core::Result<Option<WorkflowTaskEntity>>;
            async fn count_by_status(&self, process_id: i64, name: &str, status: TaskStatus) -> inlong_core::Result<usize>;
            async fn list_by_process(&self, process_id: i64) -> inlong_core::Result<Vec<WorkflowTaskEntity>>;
        }
    }

    fn notifier() -> Arc<TaskEventNotifier> {
        Arc::new(TaskEventNotifier::new(
            Arc::new(TaskEventListenerManager::new()),
            Arc::new(MemoryEventLogRepository::new()),
            Arc::new(WorkerPool::with_workers("task", 2)),
        ))
    }

    fn unanimous_task() -> Arc<WorkflowTask> {
        Arc::new(
            WorkflowTask::user("ut_admin", "Admin", FixedApprovers::new(["alice", "bob"]))
                .need_all_approve(true)
                .with_next(END_EVENT),
        )
    }

    fn context() -> WorkflowContext {
        WorkflowContext::new(
            Arc::new(WorkflowProcess::new("NEW_GROUP", "New Group")),
            WorkflowProcessEntity::new(11, "NEW_GROUP", "carol"),
        )
    }

    #[tokio::test]
    async fn test_next_waits_for_pending_rows() {
        let mut repo = MockTaskRepo::new();
        repo.expect_count_by_status()
            .withf(|process_id, name, status| {
                *process_id == 11 && name == "ut_admin" && *status == TaskStatus::Pending
            })
            .times(1)
            .returning(|_, _, _| Ok(1));

        let processor = UserTaskProcessor::new(Arc::new(repo), notifier());
        let next = processor.next(&unanimous_task(), &context()).await.unwrap();
        assert!(next.is_empty());
    }

    #[tokio::test]
    async fn test_next_returns_successors_when_all_approved() {
        let mut repo = MockTaskRepo::new();
        repo.expect_count_by_status().times(1).returning(|_, _, _| Ok(0));

        let processor = UserTaskProcessor::new(Arc::new(repo), notifier());
        let next = processor.next(&unanimous_task(), &context()).await.unwrap();
        assert_eq!(next, vec![END_EVENT.to_string()]);
    }

    #[tokio::test]
    async fn test_insert_failure_stops_create() {
        let mut repo = MockTaskRepo::new();
        repo.expect_insert()
            .times(1)
            .returning(|_| Err(AppError::Storage("database unavailable".to_string())));

        let processor = UserTaskProcessor::new(Arc::new(repo), notifier());
        let mut ctx = context();
        let err = processor.create(&unanimous_task(), &mut ctx).await.unwrap_err();

        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert!(ctx.new_tasks.is_empty());
    }

    #[test]
    fn test_merge_ext_params_keeps_existing_keys() {
        let process = WorkflowProcessEntity::new(1, "NEW_GROUP", "carol");
        let entity = WorkflowTaskEntity::pending("UserTask", &process, "ut", "ut", "alice");
        let action = ActionContext::new(WorkflowAction::Transfer, "alice", entity)
            .with_transfer_to(["dave", "erin"]);

        let merged = UserTaskProcessor::merge_ext_params(&action, Some(r#"{"origin":"portal"}"#)).unwrap();
        let value: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["origin"], "portal");
        assert_eq!(value["transferToUsers"], serde_json::json!(["dave", "erin"]));
    }

    #[test]
    fn test_merge_ext_params_without_transfer() {
        let process = WorkflowProcessEntity::new(1, "NEW_GROUP", "carol");
        let entity = WorkflowTaskEntity::pending("UserTask", &process, "ut", "ut", "alice");
        let action = ActionContext::new(WorkflowAction::Approve, "alice", entity);

        assert_eq!(UserTaskProcessor::merge_ext_params(&action, None).unwrap(), "{}");
    }
}
