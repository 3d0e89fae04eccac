mod common;

use common::{context, journal, process_entity, Harness, Journal, RecordingListener};
use inlong_core::{TaskEntityRepository, TaskStatus, WorkflowTaskEntity};
use inlong_workflow::form::{
    GroupApproveInfo, MqType, NewConsumptionApproveForm, NewGroupApproveForm,
    StreamApproveInfo,
};
use inlong_workflow::{
    ActionContext, FixedApprovers, TaskEvent, TaskEventListenerManager, TaskForm, TaskFormKind,
    TaskProcessor, WorkflowAction, WorkflowContext, WorkflowError, WorkflowProcess, WorkflowTask,
    END_EVENT,
};
use std::sync::Arc;
use tokio_test::assert_ok;

struct Scenario {
    harness: Harness,
    process: Arc<WorkflowProcess>,
    task: Arc<WorkflowTask>,
}

impl Scenario {
    fn new(task: WorkflowTask, manager: TaskEventListenerManager) -> Self {
        let mut process = WorkflowProcess::new("NEW_GROUP_PROCESS", "New Group").with_start(task.name());
        let task = process.add_task(task).unwrap();
        Self {
            harness: Harness::with_task_manager(manager),
            process: Arc::new(process),
            task,
        }
    }

    fn base_context(&self) -> WorkflowContext {
        context(&self.process, process_entity(42, "NEW_GROUP_PROCESS", "carol"))
    }

    /// Enter the task and return the created rows
    async fn create(&self) -> Vec<WorkflowTaskEntity> {
        let mut ctx = self.base_context();
        assert_ok!(self.harness.user_processor().create(&self.task, &mut ctx).await);
        ctx.new_tasks
    }

    fn action_context(&self, action: ActionContext) -> WorkflowContext {
        self.base_context()
            .with_current_element(Arc::clone(&self.task))
            .with_action(action)
    }

    async fn act(&self, action: ActionContext) -> inlong_workflow::Result<WorkflowContext> {
        let mut ctx = self.action_context(action);
        self.harness.user_processor().complete(&mut ctx).await?;
        Ok(ctx)
    }

    async fn stored(&self, id: i64) -> WorkflowTaskEntity {
        self.harness.task_repo.get(id).await.unwrap().unwrap()
    }
}

fn admin_task(approvers: &[&str]) -> WorkflowTask {
    WorkflowTask::user("ut_admin", "System Admin", FixedApprovers::new(approvers.iter().copied()))
        .with_next(END_EVENT)
}

fn manager_with(listeners: &[Arc<RecordingListener<TaskEvent>>]) -> TaskEventListenerManager {
    let mut manager = TaskEventListenerManager::new();
    for listener in listeners {
        manager.register(listener.clone()).unwrap();
    }
    manager
}

fn listener(name: &str, event: TaskEvent, journal: &Journal) -> Arc<RecordingListener<TaskEvent>> {
    RecordingListener::new(name, event, journal).shared()
}

fn group_approve_form(group_id: &str) -> TaskForm {
    TaskForm::NewGroupApprove(NewGroupApproveForm {
        group_approve_info: Some(GroupApproveInfo {
            inlong_group_id: group_id.to_string(),
            mq_type: MqType::Pulsar,
            topic_partition_num: Some(3),
        }),
        stream_approve_infos: vec![StreamApproveInfo {
            inlong_group_id: group_id.to_string(),
            inlong_stream_id: "stream_1".to_string(),
        }],
    })
}

#[tokio::test]
async fn test_create_joins_approvers_into_one_row() {
    let journal = journal();
    let on_create = listener("notify_approvers", TaskEvent::Create, &journal);
    let scenario = Scenario::new(admin_task(&["alice", "bob"]), manager_with(&[on_create.clone()]));

    let rows = scenario.create().await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].approvers, "alice,bob");
    assert_eq!(rows[0].status, TaskStatus::Pending);
    assert_eq!(rows[0].task_type, "UserTask");
    assert_eq!(rows[0].process_id, 42);
    assert_eq!(rows[0].applicant, "carol");
    assert_eq!(scenario.harness.task_repo.len().await, 1);
    assert_eq!(on_create.calls(), 1);
}

#[tokio::test]
async fn test_create_one_row_per_approver_when_all_must_approve() {
    let scenario = Scenario::new(
        admin_task(&["alice", "bob", "dave"]).need_all_approve(true),
        TaskEventListenerManager::new(),
    );

    let rows = scenario.create().await;

    let approvers: Vec<&str> = rows.iter().map(|row| row.approvers.as_str()).collect();
    assert_eq!(approvers, vec!["alice", "bob", "dave"]);
    assert!(rows.iter().all(|row| row.status == TaskStatus::Pending));
}

#[tokio::test]
async fn test_empty_approver_set_is_fatal() {
    let journal = journal();
    let on_create = listener("notify_approvers", TaskEvent::Create, &journal);
    let task = WorkflowTask::user("ut_admin", "System Admin", |_: &WorkflowContext| Vec::<String>::new());
    let scenario = Scenario::new(task, manager_with(&[on_create.clone()]));

    let mut ctx = scenario.base_context();
    let err = scenario
        .harness
        .user_processor()
        .create(&scenario.task, &mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::EmptyApprovers(ref task) if task == "System Admin"));
    assert!(err.is_fatal());
    assert!(scenario.harness.task_repo.is_empty().await);
    assert_eq!(on_create.calls(), 0);
}

#[tokio::test]
async fn test_blank_approver_names_are_dropped() {
    let journal = journal();
    let on_create = listener("notify_approvers", TaskEvent::Create, &journal);
    let blank = WorkflowTask::user("ut_admin", "System Admin", FixedApprovers::new(["", "  "]));
    let scenario = Scenario::new(blank, manager_with(&[on_create.clone()]));

    let mut ctx = scenario.base_context();
    let err = scenario
        .harness
        .user_processor()
        .create(&scenario.task, &mut ctx)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "EMPTY_APPROVERS");
    assert!(scenario.harness.task_repo.is_empty().await);
    assert_eq!(on_create.calls(), 0);

    let mixed = WorkflowTask::user("ut_admin", "System Admin", FixedApprovers::new(["alice", "", " bob "]));
    let scenario = Scenario::new(mixed, TaskEventListenerManager::new());
    let rows = scenario.create().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].approvers, "alice,bob");
    assert!(!rows[0].is_approver(""));
}

#[tokio::test]
async fn test_all_approvers_must_approve_before_moving_on() {
    let journal = journal();
    let on_approve = listener("record_approval", TaskEvent::Approve, &journal);
    let scenario = Scenario::new(
        admin_task(&["alice", "bob"]).need_all_approve(true),
        manager_with(&[on_approve.clone()]),
    );
    let processor = scenario.harness.user_processor();
    let rows = scenario.create().await;

    let alice_row = rows.iter().find(|row| row.approvers == "alice").unwrap().clone();
    let bob_row = rows.iter().find(|row| row.approvers == "bob").unwrap().clone();

    let ctx = scenario
        .act(ActionContext::new(WorkflowAction::Approve, "alice", alice_row.clone()))
        .await
        .unwrap();
    assert!(processor.next(&scenario.task, &ctx).await.unwrap().is_empty());

    let ctx = scenario
        .act(ActionContext::new(WorkflowAction::Approve, "bob", bob_row.clone()).with_remark("looks good"))
        .await
        .unwrap();
    assert_eq!(processor.next(&scenario.task, &ctx).await.unwrap(), vec![END_EVENT.to_string()]);

    let alice_stored = scenario.stored(alice_row.id).await;
    let bob_stored = scenario.stored(bob_row.id).await;
    assert_eq!(alice_stored.status, TaskStatus::Approved);
    assert_eq!(alice_stored.operator.as_deref(), Some("alice"));
    assert!(alice_stored.end_time.is_some());
    assert_eq!(bob_stored.status, TaskStatus::Approved);
    assert_eq!(bob_stored.remark.as_deref(), Some("looks good"));
    assert_eq!(on_approve.calls(), 2);
}

#[tokio::test]
async fn test_completed_row_is_written_back_to_context() {
    let scenario = Scenario::new(admin_task(&["alice"]), TaskEventListenerManager::new());
    let row = scenario.create().await.remove(0);

    let ctx = scenario
        .act(ActionContext::new(WorkflowAction::Reject, "alice", row))
        .await
        .unwrap();
    let entity = &ctx.action_context.as_ref().unwrap().task_entity;

    assert_eq!(entity.status, TaskStatus::Rejected);
    assert_eq!(entity.version, 1);
}

#[tokio::test]
async fn test_non_approver_cannot_act() {
    let journal = journal();
    let listeners = [
        listener("on_approve", TaskEvent::Approve, &journal),
        listener("on_reject", TaskEvent::Reject, &journal),
        listener("on_transfer", TaskEvent::Transfer, &journal),
    ];
    let scenario = Scenario::new(admin_task(&["alice", "bob"]), manager_with(&listeners));
    let row = scenario.create().await.remove(0);

    for action in [WorkflowAction::Approve, WorkflowAction::Reject, WorkflowAction::Transfer] {
        let err = scenario
            .act(ActionContext::new(action, "mallory", row.clone()))
            .await
            .unwrap_err();
        assert!(err.is_authorization(), "{action} should need an approver");
        assert_eq!(err.to_string(), "current operator mallory not in approvers list: alice,bob");
    }

    assert_eq!(scenario.stored(row.id).await.status, TaskStatus::Pending);
    assert!(journal.lock().is_empty());
}

#[tokio::test]
async fn test_applicant_may_cancel() {
    let journal = journal();
    let on_cancel = listener("on_cancel", TaskEvent::Cancel, &journal);
    let scenario = Scenario::new(admin_task(&["alice"]), manager_with(&[on_cancel.clone()]));
    let row = scenario.create().await.remove(0);

    assert_ok!(
        scenario
            .act(ActionContext::new(WorkflowAction::Cancel, "carol", row.clone()))
            .await
    );
    assert_eq!(scenario.stored(row.id).await.status, TaskStatus::Canceled);
    assert_eq!(on_cancel.calls(), 1);
}

#[tokio::test]
async fn test_transfer_records_targets_in_ext_params() {
    let scenario = Scenario::new(admin_task(&["alice"]), TaskEventListenerManager::new());
    let mut row = scenario.create().await.remove(0);

    // Pre-existing extension content survives the merge
    row.ext_params = Some(r#"{"source":"dashboard"}"#.to_string());
    let row = scenario.harness.task_repo.update(&row).await.unwrap();

    scenario
        .act(ActionContext::new(WorkflowAction::Transfer, "alice", row.clone()).with_transfer_to(["dave"]))
        .await
        .unwrap();

    let stored = scenario.stored(row.id).await;
    assert_eq!(stored.status, TaskStatus::Transferred);
    let ext: serde_json::Value = serde_json::from_str(stored.ext_params.as_deref().unwrap()).unwrap();
    assert_eq!(ext["source"], "dashboard");
    assert_eq!(ext["transferToUsers"], serde_json::json!(["dave"]));
}

#[tokio::test]
async fn test_finished_row_cannot_be_completed_again() {
    let scenario = Scenario::new(admin_task(&["alice"]), TaskEventListenerManager::new());
    let row = scenario.create().await.remove(0);

    let ctx = scenario
        .act(ActionContext::new(WorkflowAction::Approve, "alice", row))
        .await
        .unwrap();
    let approved = ctx.action_context.unwrap().task_entity;

    let err = scenario
        .act(ActionContext::new(WorkflowAction::Approve, "alice", approved))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState(_)));
}

#[tokio::test]
async fn test_unsupported_actions_rejected() {
    let scenario = Scenario::new(admin_task(&["alice"]), TaskEventListenerManager::new());
    let row = scenario.create().await.remove(0);

    for action in [WorkflowAction::Start, WorkflowAction::Complete] {
        let err = scenario
            .act(ActionContext::new(action, "alice", row.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ACTION");
    }
    assert_eq!(scenario.stored(row.id).await.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_racing_approvers_one_wins() {
    let journal = journal();
    let on_approve = listener("on_approve", TaskEvent::Approve, &journal);
    let scenario = Scenario::new(admin_task(&["alice", "bob"]), manager_with(&[on_approve.clone()]));
    let row = scenario.create().await.remove(0);

    // Both approvers loaded the same version of the row
    assert_ok!(
        scenario
            .act(ActionContext::new(WorkflowAction::Approve, "alice", row.clone()))
            .await
    );
    let err = scenario
        .act(ActionContext::new(WorkflowAction::Reject, "bob", row.clone()))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(scenario.stored(row.id).await.status, TaskStatus::Approved);
    assert_eq!(on_approve.calls(), 1);
}

#[tokio::test]
async fn test_approve_requires_declared_form() {
    let scenario = Scenario::new(
        admin_task(&["alice"]).with_form_kind(TaskFormKind::NewGroupApprove),
        TaskEventListenerManager::new(),
    );
    let row = scenario.create().await.remove(0);

    let missing = scenario
        .act(ActionContext::new(WorkflowAction::Approve, "alice", row.clone()))
        .await
        .unwrap_err();
    assert!(matches!(missing, WorkflowError::InvalidAction(ref m) if m == "form cannot be null"));

    let wrong_kind = scenario
        .act(
            ActionContext::new(WorkflowAction::Approve, "alice", row.clone())
                .with_form(TaskForm::NewConsumptionApprove(NewConsumptionApproveForm::default())),
        )
        .await
        .unwrap_err();
    assert!(matches!(wrong_kind, WorkflowError::FormTypeMismatch { .. }));
    assert!(wrong_kind.is_fatal());

    let invalid = scenario
        .act(
            ActionContext::new(WorkflowAction::Approve, "alice", row.clone())
                .with_form(TaskForm::NewGroupApprove(NewGroupApproveForm::default())),
        )
        .await
        .unwrap_err();
    assert!(matches!(invalid, WorkflowError::FormValidation(_)));

    assert_ok!(
        scenario
            .act(ActionContext::new(WorkflowAction::Approve, "alice", row.clone()).with_form(group_approve_form("test_group")))
            .await
    );
    let stored = scenario.stored(row.id).await;
    let form_data = stored.form_data.unwrap();
    assert!(form_data.contains("\"formName\":\"NewGroupApproveForm\""));
    assert!(form_data.contains("stream_1"));
}

#[tokio::test]
async fn test_form_not_accepted_when_not_required() {
    let scenario = Scenario::new(
        admin_task(&["alice"]).with_form_kind(TaskFormKind::NewGroupApprove),
        TaskEventListenerManager::new(),
    );
    let row = scenario.create().await.remove(0);

    let err = scenario
        .act(ActionContext::new(WorkflowAction::Reject, "alice", row.clone()).with_form(group_approve_form("test_group")))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidAction(_)));
    assert_eq!(scenario.stored(row.id).await.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_listener_failure_after_persisting_is_not_compensated() {
    let journal = journal();
    let l1 = listener("L1", TaskEvent::Approve, &journal);
    let l2 = RecordingListener::new("L2", TaskEvent::Approve, &journal)
        .failing("topic quota exceeded")
        .shared();
    let l3 = listener("L3", TaskEvent::Approve, &journal);
    let scenario = Scenario::new(admin_task(&["alice"]), manager_with(&[l1.clone(), l2.clone(), l3.clone()]));
    let row = scenario.create().await.remove(0);

    let err = scenario
        .act(ActionContext::new(WorkflowAction::Approve, "alice", row.clone()))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "topic quota exceeded");
    assert_eq!((l1.calls(), l2.calls(), l3.calls()), (1, 1, 0));
    // The row was written before the listeners ran and stays written
    assert_eq!(scenario.stored(row.id).await.status, TaskStatus::Approved);
}
