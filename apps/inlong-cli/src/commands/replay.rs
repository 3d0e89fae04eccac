//! Scenario replay
//!
//! Starts the process, walks its tasks the way an engine would, and applies
//! the scenario's operator actions in order. Non-fatal failures are recorded
//! as failed steps; configuration errors abort the replay.

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use inlong_core::{
    EventLogRepository, EventLogStatus, ProcessStatus, TaskEntityRepository, WorkflowConfig,
    WorkflowEventLogEntity, WorkflowProcessEntity, WorkflowTaskEntity,
};
use inlong_infra::{MemoryEventLogRepository, MemoryTaskRepository};
use inlong_workflow::{
    ActionContext, ProcessEvent, ProcessForm, ServiceTaskProcessor, TaskEvent, TaskKind,
    TaskProcessor, UserTaskProcessor, WorkflowAction, WorkflowContext, WorkflowError,
    WorkflowEventNotifier, WorkflowProcess, WorkflowTask, END_EVENT,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::{info, warn};

use crate::output::{self, OutputFormat};
use crate::scenario::{ActionSpec, BuiltScenario, Scenario};

type StepResult = inlong_workflow::Result<String>;

#[derive(Debug, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub ok: bool,
    pub outcome: String,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub process: String,
    pub process_id: i64,
    pub status: ProcessStatus,
    pub steps: Vec<StepRecord>,
    pub tasks: Vec<WorkflowTaskEntity>,
    pub events: Vec<WorkflowEventLogEntity>,
}

struct Replay {
    process: Arc<WorkflowProcess>,
    entity: WorkflowProcessEntity,
    form: Option<ProcessForm>,
    task_repo: Arc<MemoryTaskRepository>,
    event_log: Arc<MemoryEventLogRepository>,
    notifier: WorkflowEventNotifier,
    user_processor: UserTaskProcessor,
    service_processor: ServiceTaskProcessor,
    steps: Vec<StepRecord>,
}

impl Replay {
    fn new(scenario: BuiltScenario, config: &WorkflowConfig) -> (Self, Vec<ActionSpec>) {
        let task_repo = Arc::new(MemoryTaskRepository::new());
        let event_log = Arc::new(MemoryEventLogRepository::new());
        let notifier = WorkflowEventNotifier::new(
            Arc::new(scenario.process_manager),
            Arc::new(scenario.task_manager),
            event_log.clone(),
            &config.notifier,
        );
        let user_processor = UserTaskProcessor::new(task_repo.clone(), notifier.task_notifier());
        let service_processor = ServiceTaskProcessor::new(
            task_repo.clone(),
            notifier.task_notifier(),
            config.approval.system_operator.clone(),
        );

        let replay = Self {
            process: scenario.process,
            entity: scenario.entity,
            form: scenario.form,
            task_repo,
            event_log,
            notifier,
            user_processor,
            service_processor,
            steps: Vec::new(),
        };
        (replay, scenario.actions)
    }

    fn base_context(&self) -> WorkflowContext {
        let context = WorkflowContext::new(Arc::clone(&self.process), self.entity.clone());
        match &self.form {
            Some(form) => context.with_form(form.clone()),
            None => context,
        }
    }

    fn processor(&self, task: &WorkflowTask) -> &dyn TaskProcessor {
        match task.kind() {
            TaskKind::User(_) => &self.user_processor,
            TaskKind::Service(_) => &self.service_processor,
        }
    }

    fn task(&self, name: &str) -> inlong_workflow::Result<Arc<WorkflowTask>> {
        self.process.task(name).cloned().ok_or_else(|| {
            WorkflowError::Configuration(format!("process {} has no task {}", self.process.name(), name))
        })
    }

    /// Record a step; fatal errors end the replay
    fn record(&mut self, step: String, result: StepResult) -> Result<()> {
        match result {
            Ok(outcome) => {
                info!(step = %step, outcome = %outcome, "Step succeeded");
                self.steps.push(StepRecord { step, ok: true, outcome });
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(anyhow::Error::new(e).context(format!("step {} failed", step))),
            Err(e) => {
                warn!(step = %step, error = %e, code = e.error_code(), "Step failed");
                self.steps.push(StepRecord {
                    step,
                    ok: false,
                    outcome: e.to_string(),
                });
                Ok(())
            }
        }
    }

    async fn start(&mut self) -> Result<()> {
        let result = self.start_process().await;
        let step = format!("start {}", self.process.name());
        self.record(step, result)
    }

    async fn start_process(&mut self) -> StepResult {
        self.notifier
            .process_notifier()
            .notify(ProcessEvent::Create, &self.base_context())
            .await?;
        let start = self.process.start_tasks().to_vec();
        self.advance(start).await
    }

    /// Enter tasks until every branch waits on an operator or reaches the end
    async fn advance(&mut self, names: Vec<String>) -> StepResult {
        let mut queue: VecDeque<String> = names.into();
        let mut entered = Vec::new();

        while let Some(name) = queue.pop_front() {
            if name == END_EVENT {
                self.finish(ProcessStatus::Completed, ProcessEvent::Complete).await?;
                entered.push(END_EVENT.to_string());
                continue;
            }

            let task = self.task(&name)?;
            let mut context = self.base_context().with_current_element(Arc::clone(&task));
            let processor = self.processor(&task);
            processor.create(&task, &mut context).await?;
            entered.push(name.clone());

            if processor.pending_for_action(&context) {
                continue;
            }

            if let Err(e) = processor.complete(&mut context).await {
                self.notify_process_failure(&context).await;
                return Err(e);
            }
            queue.extend(processor.next(&task, &context).await?);
        }

        Ok(format!("entered {}", entered.join(" -> ")))
    }

    async fn notify_process_failure(&self, context: &WorkflowContext) {
        if let Err(e) = self
            .notifier
            .process_notifier()
            .notify(ProcessEvent::Fail, context)
            .await
        {
            warn!(process_id = self.entity.id, error = %e, "Process failure listeners failed");
        }
    }

    async fn finish(&mut self, status: ProcessStatus, event: ProcessEvent) -> inlong_workflow::Result<()> {
        self.entity.status = status;
        self.entity.end_time = Some(Utc::now());
        info!(process_id = self.entity.id, status = ?status, "Process finished");
        self.notifier
            .process_notifier()
            .notify(event, &self.base_context())
            .await
    }

    async fn apply(&mut self, spec: &ActionSpec) -> StepResult {
        if self.entity.status != ProcessStatus::Processing {
            return Err(WorkflowError::InvalidState(format!(
                "process {} is {:?}",
                self.entity.id, self.entity.status
            )));
        }

        let task = self.task(&spec.task)?;
        let row = self.pending_row(&spec.task, &spec.operator).await?;

        let mut action = ActionContext::new(spec.action, spec.operator.clone(), row)
            .with_transfer_to(spec.transfer_to.iter().cloned());
        if let Some(remark) = &spec.remark {
            action = action.with_remark(remark.clone());
        }
        if let Some(form) = &spec.form {
            action = action.with_form(form.clone());
        }
        let mut context = self
            .base_context()
            .with_current_element(Arc::clone(&task))
            .with_action(action);

        let processor = self.processor(&task);
        processor.complete(&mut context).await?;
        let task_id = context.action()?.task_entity.id;

        match spec.action {
            WorkflowAction::Approve | WorkflowAction::Complete => {
                let next = processor.next(&task, &context).await?;
                if next.is_empty() {
                    return Ok(format!("task {} approved, waiting on other approvers", task_id));
                }
                let entered = self.advance(next).await?;
                Ok(format!("task {} approved, {}", task_id, entered))
            }
            WorkflowAction::Transfer => {
                let created = self.transfer(&task, &context, &spec.transfer_to).await?;
                Ok(format!("task {} transferred to row {}", task_id, created))
            }
            WorkflowAction::Reject => {
                self.finish(ProcessStatus::Rejected, ProcessEvent::Reject).await?;
                Ok(format!("task {} rejected, process rejected", task_id))
            }
            WorkflowAction::Cancel => {
                self.finish(ProcessStatus::Canceled, ProcessEvent::Cancel).await?;
                Ok(format!("task {} canceled, process canceled", task_id))
            }
            WorkflowAction::Terminate => {
                self.finish(ProcessStatus::Terminated, ProcessEvent::Terminate).await?;
                Ok(format!("task {} terminated, process terminated", task_id))
            }
            WorkflowAction::Start => Err(WorkflowError::InvalidAction(
                "START cannot be applied to a task".to_string(),
            )),
        }
    }

    /// Pending row of `task` assigned to `operator`, else the first pending row
    async fn pending_row(&self, task: &str, operator: &str) -> inlong_workflow::Result<WorkflowTaskEntity> {
        let pending: Vec<WorkflowTaskEntity> = self
            .task_repo
            .list_by_process(self.entity.id)
            .await?
            .into_iter()
            .filter(|row| row.name == task && !row.status.is_terminal())
            .collect();

        let index = pending
            .iter()
            .position(|row| row.is_approver(operator))
            .unwrap_or(0);
        pending
            .into_iter()
            .nth(index)
            .ok_or_else(|| WorkflowError::InvalidState(format!("task {} has no pending row", task)))
    }

    /// Hand the task to the transfer targets as a fresh pending row
    async fn transfer(
        &self,
        task: &Arc<WorkflowTask>,
        context: &WorkflowContext,
        users: &[String],
    ) -> inlong_workflow::Result<i64> {
        if users.is_empty() {
            return Err(WorkflowError::InvalidAction("transfer needs at least one user".to_string()));
        }
        let row = WorkflowTaskEntity::pending(
            WorkflowTask::USER_TASK,
            &self.entity,
            task.name(),
            task.display_name(),
            users.join(WorkflowTaskEntity::APPROVERS_DELIMITER),
        );
        let saved = self.task_repo.insert(row).await?;

        let mut created = context.clone();
        created.action_context = None;
        created.new_tasks = vec![saved.clone()];
        self.notifier
            .task_notifier()
            .notify(TaskEvent::Create, &created)
            .await?;
        Ok(saved.id)
    }

    async fn into_report(self) -> Result<ReplayReport> {
        self.notifier.wait_idle().await;
        let tasks = self.task_repo.list_by_process(self.entity.id).await?;
        let events = self.event_log.list_by_process(self.entity.id).await?;
        Ok(ReplayReport {
            process: self.process.name().to_string(),
            process_id: self.entity.id,
            status: self.entity.status,
            steps: self.steps,
            tasks,
            events,
        })
    }
}

pub async fn replay(scenario: BuiltScenario, config: &WorkflowConfig) -> Result<ReplayReport> {
    let (mut replay, actions) = Replay::new(scenario, config);
    replay.start().await?;

    for spec in &actions {
        let step = format!("{} {} by {}", spec.action, spec.task, spec.operator);
        let result = replay.apply(spec).await;
        replay.record(step, result)?;
    }

    replay.into_report().await
}

pub async fn run(path: &Path, config: &WorkflowConfig, format: OutputFormat) -> Result<()> {
    let scenario = Scenario::load(path)?.build()?;
    let report = replay(scenario, config).await?;

    if let Some(rendered) = output::format_structured(&report, format)? {
        println!("{}", rendered);
        return Ok(());
    }
    print_report(&report);
    Ok(())
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Task")]
    name: String,
    #[tabled(rename = "Type")]
    task_type: String,
    #[tabled(rename = "Approvers")]
    approvers: String,
    #[tabled(rename = "Operator")]
    operator: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Remark")]
    remark: String,
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Element")]
    element: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Listener")]
    listener: String,
    #[tabled(rename = "Mode")]
    mode: &'static str,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn print_report(report: &ReplayReport) {
    output::key_value("Process", &format!("{} ({})", report.process, report.process_id));
    output::key_value("Status", &format!("{:?}", report.status).to_uppercase());

    output::section("Steps");
    for step in &report.steps {
        let line = format!("{}: {}", step.step, step.outcome);
        if step.ok {
            output::success(&line);
        } else {
            output::failure(&line);
        }
    }

    output::section("Task rows");
    let rows: Vec<TaskRow> = report
        .tasks
        .iter()
        .map(|task| TaskRow {
            id: task.id,
            name: task.name.clone(),
            task_type: task.task_type.clone(),
            approvers: task.approvers.clone(),
            operator: task.operator.clone().unwrap_or_else(|| "-".to_string()),
            status: task.status.to_string(),
            remark: output::truncate(task.remark.as_deref().unwrap_or("-"), 40),
        })
        .collect();
    println!("{}", Table::new(rows));

    output::section("Event log");
    if report.events.is_empty() {
        println!("{}", "No listener invocations".dimmed());
        return;
    }
    let rows: Vec<EventRow> = report
        .events
        .iter()
        .map(|log| EventRow {
            id: log.id,
            element: log.element_name.clone(),
            event: format!("{}.{}", log.event_type, log.event),
            listener: log.listener.clone(),
            mode: if log.is_async { "async" } else { "sync" },
            status: match log.status {
                EventLogStatus::Executing => "EXECUTING".yellow().to_string(),
                EventLogStatus::Success => "SUCCESS".green().to_string(),
                EventLogStatus::Failed => "FAILED".red().to_string(),
            },
            detail: output::truncate(
                log.remark
                    .as_deref()
                    .or(log.exception.as_deref())
                    .unwrap_or("-"),
                40,
            ),
        })
        .collect();
    println!("{}", Table::new(rows));
}

#[cfg(test)]
mod tests {
    use super::*;
    use inlong_core::TaskStatus;

    fn scenario(raw: &str) -> BuiltScenario {
        serde_yaml::from_str::<Scenario>(raw).unwrap().build().unwrap()
    }

    fn config() -> WorkflowConfig {
        let mut config = WorkflowConfig::default();
        config.notifier.workers = 2;
        config
    }

    const APPROVAL: &str = r#"
process:
  id: 9
  name: GROUP_RESOURCE_PROCESS
  applicant: carol
  start: [ut_admin]
form:
  formName: GroupResourceProcessForm
  groupInfo:
    inlongGroupId: demo_group
    mqType: PULSAR
tasks:
  - name: ut_admin
    kind: user
    approvers: [alice, bob]
    need_all_approve: true
    next: [st_init_mq]
  - name: st_init_mq
    kind: service
    task_types: [INIT_MQ]
    next: [end]
listeners:
  - name: create_pulsar_topic
    event: COMPLETE
    target:
      kind: service
      category: QUEUE_OPERATE
      selector:
        type: mq_type
        mq_type: PULSAR
  - name: create_tube_topic
    event: COMPLETE
    target:
      kind: service
      category: QUEUE_OPERATE
      selector:
        type: mq_type
        mq_type: TUBE
actions:
  - task: ut_admin
    operator: alice
    action: APPROVE
  - task: ut_admin
    operator: mallory
    action: APPROVE
  - task: ut_admin
    operator: bob
    action: APPROVE
"#;

    #[tokio::test]
    async fn test_unanimous_approval_reaches_end() {
        let report = replay(scenario(APPROVAL), &config()).await.unwrap();

        assert_eq!(report.status, ProcessStatus::Completed);
        let ok: Vec<bool> = report.steps.iter().map(|s| s.ok).collect();
        assert_eq!(ok, vec![true, true, false, true]);
        assert!(report.steps[2].outcome.contains("not in approvers list"));

        let service_rows: Vec<&WorkflowTaskEntity> =
            report.tasks.iter().filter(|t| t.name == "st_init_mq").collect();
        assert_eq!(service_rows.len(), 1);
        assert_eq!(service_rows[0].status, TaskStatus::Completed);

        let listeners: Vec<&str> = report.events.iter().map(|e| e.listener.as_str()).collect();
        assert_eq!(listeners, vec!["create_pulsar_topic"]);
    }

    #[tokio::test]
    async fn test_failed_service_task_keeps_process_open() {
        let raw = APPROVAL.replace(
            "  - name: create_tube_topic\n",
            "  - name: create_tube_topic\n    fail: never used\n",
        );
        let raw = raw.replace(
            "  - name: create_pulsar_topic\n",
            "  - name: create_pulsar_topic\n    fail: tenant quota exceeded\n",
        );
        let report = replay(scenario(&raw), &config()).await.unwrap();

        assert_eq!(report.status, ProcessStatus::Processing);
        let last = report.steps.last().unwrap();
        assert!(!last.ok);
        assert_eq!(last.outcome, "tenant quota exceeded");

        let service_row = report.tasks.iter().find(|t| t.name == "st_init_mq").unwrap();
        assert_eq!(service_row.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_reject_closes_process() {
        let raw = APPROVAL.replace(
            "    operator: alice\n    action: APPROVE",
            "    operator: alice\n    action: REJECT\n    remark: missing owner",
        );
        let report = replay(scenario(&raw), &config()).await.unwrap();

        assert_eq!(report.status, ProcessStatus::Rejected);
        assert!(report.steps[1].ok);
        // Later actions find the process closed
        assert!(report.steps[2..].iter().all(|s| !s.ok));
        assert!(report.tasks.iter().all(|t| t.name == "ut_admin"));
    }
}
