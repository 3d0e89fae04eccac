#![allow(dead_code)]

use async_trait::async_trait;
use inlong_core::WorkflowProcessEntity;
use inlong_infra::{MemoryEventLogRepository, MemoryTaskRepository, WorkerPool};
use inlong_workflow::{
    EventListener, ListenerResult, ProcessEventListenerManager, ProcessEventNotifier,
    ServiceTaskProcessor, TaskEventListenerManager, TaskEventNotifier, UserTaskProcessor,
    WorkflowContext, WorkflowError, WorkflowEvent, WorkflowProcess,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Names of listeners in the order they ran
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    Error(String),
    Panic,
}

pub struct RecordingListener<E> {
    name: String,
    event: E,
    is_async: bool,
    behavior: Behavior,
    calls: AtomicUsize,
    journal: Journal,
}

impl<E: WorkflowEvent> RecordingListener<E> {
    pub fn new(name: &str, event: E, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            event,
            is_async: false,
            behavior: Behavior::Succeed,
            calls: AtomicUsize::new(0),
            journal: Arc::clone(journal),
        }
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.behavior = Behavior::Fail(message.to_string());
        self
    }

    pub fn erroring(mut self, message: &str) -> Self {
        self.behavior = Behavior::Error(message.to_string());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behavior = Behavior::Panic;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: WorkflowEvent> EventListener<E> for RecordingListener<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn event(&self) -> E {
        self.event
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    async fn listen(&self, _context: &WorkflowContext) -> inlong_workflow::Result<ListenerResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().push(self.name.clone());
        match &self.behavior {
            Behavior::Succeed => Ok(ListenerResult::success()),
            Behavior::Fail(message) => Ok(ListenerResult::fail(message.clone())),
            Behavior::Error(message) => Err(WorkflowError::External(message.clone())),
            Behavior::Panic => panic!("{} blew up", self.name),
        }
    }
}

/// In-memory stores plus notifiers wired the way an engine wires them
pub struct Harness {
    pub task_repo: Arc<MemoryTaskRepository>,
    pub event_log: Arc<MemoryEventLogRepository>,
    pub process_notifier: Arc<ProcessEventNotifier>,
    pub task_notifier: Arc<TaskEventNotifier>,
}

impl Harness {
    pub fn new(process_manager: ProcessEventListenerManager, task_manager: TaskEventListenerManager) -> Self {
        let event_log = Arc::new(MemoryEventLogRepository::new());
        Self {
            task_repo: Arc::new(MemoryTaskRepository::new()),
            process_notifier: Arc::new(ProcessEventNotifier::new(
                Arc::new(process_manager),
                event_log.clone(),
                Arc::new(WorkerPool::with_workers("ProcessEvent", 4)),
            )),
            task_notifier: Arc::new(TaskEventNotifier::new(
                Arc::new(task_manager),
                event_log.clone(),
                Arc::new(WorkerPool::with_workers("TaskEvent", 4)),
            )),
            event_log,
        }
    }

    pub fn with_task_manager(task_manager: TaskEventListenerManager) -> Self {
        Self::new(ProcessEventListenerManager::new(), task_manager)
    }

    pub fn user_processor(&self) -> UserTaskProcessor {
        UserTaskProcessor::new(self.task_repo.clone(), Arc::clone(&self.task_notifier))
    }

    pub fn service_processor(&self) -> ServiceTaskProcessor {
        ServiceTaskProcessor::new(self.task_repo.clone(), Arc::clone(&self.task_notifier), "admin")
    }
}

pub fn process_entity(id: i64, name: &str, applicant: &str) -> WorkflowProcessEntity {
    WorkflowProcessEntity::new(id, name, applicant).with_group_id("test_group")
}

pub fn context(process: &Arc<WorkflowProcess>, entity: WorkflowProcessEntity) -> WorkflowContext {
    WorkflowContext::new(Arc::clone(process), entity)
}
