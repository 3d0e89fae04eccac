//! Scenario files: a process definition, its listeners and the operator
//! actions to replay against it

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use inlong_core::WorkflowProcessEntity;
use inlong_workflow::form::{GroupOperateType, MqType};
use inlong_workflow::selector::{
    LightGroupSortSelector, MqTypeSelector, SinkTypeSelector, SourceOperateSelector,
    ZookeeperSelector,
};
use inlong_workflow::{
    EventListener, EventSelector, FixedApprovers, ListenerCategory, ListenerResult, ProcessEvent,
    ProcessEventListenerManager, ProcessForm, ServiceTaskListenerFactory, ServiceTaskType,
    TaskEvent, TaskEventListenerManager, TaskForm, TaskFormKind, WorkflowAction, WorkflowContext,
    WorkflowEvent, WorkflowProcess, WorkflowTask,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub process: ProcessSpec,
    #[serde(default)]
    pub form: Option<ProcessForm>,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessSpec {
    #[serde(default = "default_process_id")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub applicant: String,
    #[serde(default)]
    pub group_id: Option<String>,
    pub start: Vec<String>,
}

fn default_process_id() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub kind: TaskKindSpec,
    #[serde(default)]
    pub next: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKindSpec {
    User {
        approvers: Vec<String>,
        #[serde(default)]
        need_all_approve: bool,
        #[serde(default)]
        form_kind: Option<TaskFormKind>,
    },
    Service {
        task_types: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct ListenerSpec {
    pub name: String,
    pub target: ListenerTarget,
    pub event: String,
    #[serde(default, rename = "async")]
    pub is_async: bool,
    /// Message returned as a listener failure
    #[serde(default)]
    pub fail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListenerTarget {
    /// Global process event listener
    ManagerProcess,
    /// Global task event listener
    ManagerTask,
    /// Listener on the process definition
    Process,
    /// Listener on one task definition
    Task { task: String },
    /// Selector-gated service task listener
    Service {
        category: ListenerCategory,
        #[serde(default)]
        selector: SelectorSpec,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectorSpec {
    #[default]
    Always,
    MqType { mq_type: MqType },
    Zookeeper { enabled: bool },
    SourceOperate { operate: GroupOperateType },
    SinkType { sink_type: String },
    LightGroup,
}

impl SelectorSpec {
    fn build(&self) -> Result<Arc<dyn EventSelector>> {
        let selector: Arc<dyn EventSelector> = match self {
            SelectorSpec::Always => Arc::new(|_: &WorkflowContext| true),
            SelectorSpec::MqType { mq_type } => Arc::new(MqTypeSelector::new(*mq_type)),
            SelectorSpec::Zookeeper { enabled: true } => Arc::new(ZookeeperSelector::enabled()),
            SelectorSpec::Zookeeper { enabled: false } => Arc::new(ZookeeperSelector::disabled()),
            SelectorSpec::SourceOperate { operate } => match operate {
                GroupOperateType::Suspend => Arc::new(SourceOperateSelector::stop()),
                GroupOperateType::Restart => Arc::new(SourceOperateSelector::restart()),
                GroupOperateType::Delete => Arc::new(SourceOperateSelector::delete()),
                GroupOperateType::Init => bail!("source operate selector cannot select INIT"),
            },
            SelectorSpec::SinkType { sink_type } => Arc::new(SinkTypeSelector::new(sink_type.clone())),
            SelectorSpec::LightGroup => Arc::new(LightGroupSortSelector),
        };
        Ok(selector)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionSpec {
    pub task: String,
    pub operator: String,
    pub action: WorkflowAction,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub form: Option<TaskForm>,
    #[serde(default)]
    pub transfer_to: Vec<String>,
}

/// Listener whose outcome is fixed by the scenario
struct ScriptedListener<E> {
    name: String,
    event: E,
    is_async: bool,
    fail: Option<String>,
}

#[async_trait]
impl<E: WorkflowEvent> EventListener<E> for ScriptedListener<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn event(&self) -> E {
        self.event
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    async fn listen(&self, context: &WorkflowContext) -> inlong_workflow::Result<ListenerResult> {
        info!(
            listener = %self.name,
            event = %self.event,
            process_id = context.process_entity.id,
            group_id = ?context.inlong_group_id(),
            "Scripted listener invoked"
        );
        Ok(match &self.fail {
            Some(message) => ListenerResult::fail(message.clone()),
            None => ListenerResult::success(),
        })
    }
}

impl ListenerSpec {
    fn scripted<E>(&self) -> Result<Arc<ScriptedListener<E>>>
    where
        E: WorkflowEvent + DeserializeOwned,
    {
        let event = parse_event::<E>(&self.event)
            .with_context(|| format!("listener {}: unknown {} {}", self.name, E::EVENT_TYPE, self.event))?;
        Ok(Arc::new(ScriptedListener {
            name: self.name.clone(),
            event,
            is_async: self.is_async,
            fail: self.fail.clone(),
        }))
    }
}

fn parse_event<E: DeserializeOwned>(raw: &str) -> Result<E> {
    Ok(serde_yaml::from_value(serde_yaml::Value::String(raw.to_uppercase()))?)
}

/// Everything a replay needs, wired from one scenario file
pub struct BuiltScenario {
    pub process: Arc<WorkflowProcess>,
    pub process_manager: ProcessEventListenerManager,
    pub task_manager: TaskEventListenerManager,
    pub entity: WorkflowProcessEntity,
    pub form: Option<ProcessForm>,
    pub actions: Vec<ActionSpec>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read scenario {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn build(self) -> Result<BuiltScenario> {
        if let Some(form) = &self.form {
            form.validate()?;
        }

        let factory = Arc::new(ServiceTaskListenerFactory::new());
        let mut tasks: Vec<WorkflowTask> = Vec::with_capacity(self.tasks.len());
        let mut positions: HashMap<String, usize> = HashMap::new();
        for spec in &self.tasks {
            positions.insert(spec.name.clone(), tasks.len());
            tasks.push(build_task(spec, &factory)?);
        }

        let spec = &self.process;
        let display_name = spec.display_name.clone().unwrap_or_else(|| spec.name.clone());
        let mut process = WorkflowProcess::new(&spec.name, &display_name);
        for start in &spec.start {
            process = process.with_start(start);
        }
        if let Some(form) = &self.form {
            process = process.with_form_kind(form.kind());
        }

        let mut process_manager = ProcessEventListenerManager::new();
        let mut task_manager = TaskEventListenerManager::new();
        for listener in &self.listeners {
            match &listener.target {
                ListenerTarget::ManagerProcess => {
                    process_manager.register(listener.scripted::<ProcessEvent>()?)?
                }
                ListenerTarget::ManagerTask => task_manager.register(listener.scripted::<TaskEvent>()?)?,
                ListenerTarget::Process => process.add_listener(listener.scripted::<ProcessEvent>()?)?,
                ListenerTarget::Task { task } => {
                    let position = positions
                        .get(task)
                        .with_context(|| format!("listener {}: unknown task {}", listener.name, task))?;
                    tasks[*position].add_listener(listener.scripted::<TaskEvent>()?)?;
                }
                ListenerTarget::Service { category, selector } => {
                    factory.register(*category, listener.scripted::<TaskEvent>()?, selector.build()?);
                }
            }
        }

        for task in tasks {
            process.add_task(task)?;
        }
        process.validate()?;

        let mut entity = WorkflowProcessEntity::new(spec.id, &spec.name, &spec.applicant)
            .with_display_name(display_name);
        let group_id = spec
            .group_id
            .clone()
            .or_else(|| self.form.as_ref().and_then(|f| f.inlong_group_id().map(String::from)));
        if let Some(group_id) = group_id {
            entity = entity.with_group_id(group_id);
        }
        if let Some(form) = &self.form {
            entity.form_data = Some(serde_json::to_string(form)?);
        }

        Ok(BuiltScenario {
            process: Arc::new(process),
            process_manager,
            task_manager,
            entity,
            form: self.form,
            actions: self.actions,
        })
    }
}

fn build_task(spec: &TaskSpec, factory: &Arc<ServiceTaskListenerFactory>) -> Result<WorkflowTask> {
    let display_name = spec.display_name.clone().unwrap_or_else(|| spec.name.clone());
    let mut task = match &spec.kind {
        TaskKindSpec::User {
            approvers,
            need_all_approve,
            form_kind,
        } => {
            let mut task = WorkflowTask::user(&spec.name, display_name, FixedApprovers::new(approvers.clone()))
                .need_all_approve(*need_all_approve);
            if let Some(kind) = form_kind {
                task = task.with_form_kind(*kind);
            }
            task
        }
        TaskKindSpec::Service { task_types } => {
            let mut task = WorkflowTask::service(&spec.name, display_name)
                .with_listener_provider(Arc::clone(factory) as _);
            for raw in task_types {
                task = task.with_task_type(raw.parse::<ServiceTaskType>()?);
            }
            task
        }
    };
    for next in &spec.next {
        task = task.with_next(next);
    }
    Ok(task)
}
