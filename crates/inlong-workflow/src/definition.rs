//! Process and task definitions
//!
//! A [`WorkflowProcess`] is built once at startup and shared read-only by
//! every process instance through an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::WorkflowContext;
use crate::event::{EventListener, ProcessEvent, TaskEvent, TaskEventListener};
use crate::form::{ProcessFormKind, TaskFormKind};
use crate::registry::{ListenerGroups, ListenerRegistry};
use crate::{Result, WorkflowError};

/// Successor name that ends the process
pub const END_EVENT: &str = "end";

/// Resolves the approvers of a user task for one process instance
pub trait ApproverAssign: Send + Sync {
    fn assign(&self, context: &WorkflowContext) -> Vec<String>;
}

impl<F> ApproverAssign for F
where
    F: Fn(&WorkflowContext) -> Vec<String> + Send + Sync,
{
    fn assign(&self, context: &WorkflowContext) -> Vec<String> {
        self(context)
    }
}

/// Always the same approvers
#[derive(Debug, Clone)]
pub struct FixedApprovers(Vec<String>);

impl FixedApprovers {
    pub fn new<I, S>(approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(approvers.into_iter().map(Into::into).collect())
    }
}

impl ApproverAssign for FixedApprovers {
    fn assign(&self, _context: &WorkflowContext) -> Vec<String> {
        self.0.clone()
    }
}

/// Kinds of automated work a service task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceTaskType {
    InitMq,
    InitSort,
    StopSort,
    RestartSort,
    DeleteSort,
    InitSource,
    StopSource,
    RestartSource,
    DeleteSource,
    InitSink,
}

impl ServiceTaskType {
    pub const ALL: [ServiceTaskType; 10] = [
        ServiceTaskType::InitMq,
        ServiceTaskType::InitSort,
        ServiceTaskType::StopSort,
        ServiceTaskType::RestartSort,
        ServiceTaskType::DeleteSort,
        ServiceTaskType::InitSource,
        ServiceTaskType::StopSource,
        ServiceTaskType::RestartSource,
        ServiceTaskType::DeleteSource,
        ServiceTaskType::InitSink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTaskType::InitMq => "INIT_MQ",
            ServiceTaskType::InitSort => "INIT_SORT",
            ServiceTaskType::StopSort => "STOP_SORT",
            ServiceTaskType::RestartSort => "RESTART_SORT",
            ServiceTaskType::DeleteSort => "DELETE_SORT",
            ServiceTaskType::InitSource => "INIT_SOURCE",
            ServiceTaskType::StopSource => "STOP_SOURCE",
            ServiceTaskType::RestartSource => "RESTART_SOURCE",
            ServiceTaskType::DeleteSource => "DELETE_SOURCE",
            ServiceTaskType::InitSink => "INIT_SINK",
        }
    }
}

impl fmt::Display for ServiceTaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceTaskType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| WorkflowError::UnsupportedTaskType(s.to_string()))
    }
}

/// Supplies extra listeners to a service task at dispatch time
pub trait ServiceTaskListenerProvider: Send + Sync {
    fn get(
        &self,
        context: &WorkflowContext,
        task_type: ServiceTaskType,
    ) -> Result<Vec<Arc<TaskEventListener>>>;
}

pub struct UserTaskSpec {
    pub approver_assign: Arc<dyn ApproverAssign>,
    /// One row per approver, all of which must approve
    pub need_all_approve: bool,
    /// Form an approver must submit with APPROVE
    pub form_kind: Option<TaskFormKind>,
}

#[derive(Default)]
pub struct ServiceTaskSpec {
    pub task_types: Vec<ServiceTaskType>,
    pub providers: Vec<Arc<dyn ServiceTaskListenerProvider>>,
}

pub enum TaskKind {
    User(UserTaskSpec),
    Service(ServiceTaskSpec),
}

/// One step of a process
pub struct WorkflowTask {
    name: String,
    display_name: String,
    kind: TaskKind,
    listeners: ListenerRegistry<TaskEvent>,
    next: Vec<String>,
}

impl WorkflowTask {
    pub const USER_TASK: &'static str = "UserTask";
    pub const SERVICE_TASK: &'static str = "ServiceTask";

    pub fn user(
        name: impl Into<String>,
        display_name: impl Into<String>,
        approver_assign: impl ApproverAssign + 'static,
    ) -> Self {
        Self::with_kind(
            name,
            display_name,
            TaskKind::User(UserTaskSpec {
                approver_assign: Arc::new(approver_assign),
                need_all_approve: false,
                form_kind: None,
            }),
        )
    }

    pub fn service(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::with_kind(name, display_name, TaskKind::Service(ServiceTaskSpec::default()))
    }

    fn with_kind(name: impl Into<String>, display_name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            kind,
            listeners: ListenerRegistry::new(),
            next: Vec::new(),
        }
    }

    /// Only meaningful for user tasks
    pub fn need_all_approve(mut self, need_all_approve: bool) -> Self {
        if let TaskKind::User(spec) = &mut self.kind {
            spec.need_all_approve = need_all_approve;
        }
        self
    }

    /// Only meaningful for user tasks
    pub fn with_form_kind(mut self, form_kind: TaskFormKind) -> Self {
        if let TaskKind::User(spec) = &mut self.kind {
            spec.form_kind = Some(form_kind);
        }
        self
    }

    /// Only meaningful for service tasks
    pub fn with_task_type(mut self, task_type: ServiceTaskType) -> Self {
        if let TaskKind::Service(spec) = &mut self.kind {
            spec.task_types.push(task_type);
        }
        self
    }

    /// Only meaningful for service tasks
    pub fn with_listener_provider(mut self, provider: Arc<dyn ServiceTaskListenerProvider>) -> Self {
        if let TaskKind::Service(spec) = &mut self.kind {
            spec.providers.push(provider);
        }
        self
    }

    pub fn with_next(mut self, name: impl Into<String>) -> Self {
        self.next.push(name.into());
        self
    }

    pub fn add_listener(&mut self, listener: Arc<TaskEventListener>) -> Result<()> {
        self.listeners.register(listener)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            TaskKind::User(_) => Self::USER_TASK,
            TaskKind::Service(_) => Self::SERVICE_TASK,
        }
    }

    pub fn as_user(&self) -> Option<&UserTaskSpec> {
        match &self.kind {
            TaskKind::User(spec) => Some(spec),
            TaskKind::Service(_) => None,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceTaskSpec> {
        match &self.kind {
            TaskKind::Service(spec) => Some(spec),
            TaskKind::User(_) => None,
        }
    }

    pub fn next(&self) -> &[String] {
        &self.next
    }

    /// Statically registered listeners
    pub fn listeners(&self) -> &ListenerRegistry<TaskEvent> {
        &self.listeners
    }

    /// Static listeners for `event`, then provider-supplied ones. Providers
    /// and their selectors are consulted once per call.
    pub fn listener_groups(
        &self,
        event: TaskEvent,
        context: &WorkflowContext,
    ) -> Result<ListenerGroups<TaskEvent>> {
        let mut groups = self.listeners.groups(event);
        groups.extend_for(event, self.provided_listeners(context)?);
        Ok(groups)
    }

    pub fn listener(&self, name: &str, context: &WorkflowContext) -> Result<Option<Arc<TaskEventListener>>> {
        if let Some(listener) = self.listeners.listener(name) {
            return Ok(Some(listener));
        }
        Ok(self
            .provided_listeners(context)?
            .into_iter()
            .find(|l| l.name() == name))
    }

    fn provided_listeners(&self, context: &WorkflowContext) -> Result<Vec<Arc<TaskEventListener>>> {
        let Some(spec) = self.as_service() else {
            return Ok(Vec::new());
        };

        let mut listeners = Vec::new();
        for task_type in &spec.task_types {
            for provider in &spec.providers {
                listeners.extend(provider.get(context, *task_type)?);
            }
        }
        Ok(listeners)
    }
}

impl fmt::Debug for WorkflowTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowTask")
            .field("name", &self.name)
            .field("type", &self.type_name())
            .field("listeners", &self.listeners)
            .field("next", &self.next)
            .finish()
    }
}

/// A process definition: its listeners and its tasks
pub struct WorkflowProcess {
    name: String,
    display_name: String,
    process_type: String,
    form_kind: Option<ProcessFormKind>,
    listeners: ListenerRegistry<ProcessEvent>,
    tasks: Vec<Arc<WorkflowTask>>,
    start: Vec<String>,
}

impl WorkflowProcess {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            process_type: name.clone(),
            name,
            display_name: display_name.into(),
            form_kind: None,
            listeners: ListenerRegistry::new(),
            tasks: Vec::new(),
            start: Vec::new(),
        }
    }

    pub fn with_type(mut self, process_type: impl Into<String>) -> Self {
        self.process_type = process_type.into();
        self
    }

    pub fn with_form_kind(mut self, form_kind: ProcessFormKind) -> Self {
        self.form_kind = Some(form_kind);
        self
    }

    /// First task(s) entered when the process starts
    pub fn with_start(mut self, task_name: impl Into<String>) -> Self {
        self.start.push(task_name.into());
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn EventListener<ProcessEvent>>) -> Result<()> {
        self.listeners.register(listener)
    }

    pub fn add_task(&mut self, task: WorkflowTask) -> Result<Arc<WorkflowTask>> {
        if self.task(task.name()).is_some() {
            return Err(WorkflowError::Configuration(format!(
                "task {} defined twice in process {}",
                task.name(),
                self.name
            )));
        }
        let task = Arc::new(task);
        self.tasks.push(Arc::clone(&task));
        Ok(task)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn process_type(&self) -> &str {
        &self.process_type
    }

    pub fn form_kind(&self) -> Option<ProcessFormKind> {
        self.form_kind
    }

    pub fn listeners(&self) -> &ListenerRegistry<ProcessEvent> {
        &self.listeners
    }

    pub fn tasks(&self) -> &[Arc<WorkflowTask>] {
        &self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&Arc<WorkflowTask>> {
        self.tasks.iter().find(|task| task.name() == name)
    }

    pub fn start_tasks(&self) -> &[String] {
        &self.start
    }

    /// Check that the start list and every successor name a defined task
    pub fn validate(&self) -> Result<()> {
        if self.start.is_empty() {
            return Err(WorkflowError::Configuration(format!(
                "process {} has no start task",
                self.name
            )));
        }

        let known: HashSet<&str> = self.tasks.iter().map(|task| task.name()).collect();
        let successors = self
            .tasks
            .iter()
            .flat_map(|task| task.next().iter().map(move |next| (task.name(), next.as_str())));

        for name in &self.start {
            if !known.contains(name.as_str()) {
                return Err(WorkflowError::Configuration(format!(
                    "process {} starts at unknown task {name}",
                    self.name
                )));
            }
        }
        for (from, to) in successors {
            if to != END_EVENT && !known.contains(to) {
                return Err(WorkflowError::Configuration(format!(
                    "task {from} in process {} points to unknown task {to}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for WorkflowProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowProcess")
            .field("name", &self.name)
            .field("type", &self.process_type)
            .field("listeners", &self.listeners)
            .field("tasks", &self.tasks)
            .finish()
    }
}
