//! Event notifiers
//!
//! One notification pass runs four listener groups in a fixed order:
//! manager sync, element sync, manager async, element async. Sync listeners
//! run inline and the first failure aborts the pass. Async listeners are
//! handed to the notifier's worker pool and their failures are only logged.

use inlong_core::{EventLogRepository, NotifierConfig};
use inlong_infra::{WorkerPool, WorkerPoolConfig};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit::{ElementRef, LoggedListener};
use crate::context::WorkflowContext;
use crate::event::{EventListener, ListenerResult, ProcessEvent, TaskEvent, WorkflowEvent};
use crate::registry::{ListenerGroups, ListenerRegistry};
use crate::{Result, WorkflowError};

/// Where the element-level listeners of an event family live
pub trait ListenerScope: WorkflowEvent {
    fn element(context: &WorkflowContext) -> Result<ElementRef>;

    /// Element listeners for `event`, resolved once per notification pass
    fn element_listeners(context: &WorkflowContext, event: Self) -> Result<ListenerGroups<Self>>;

    fn element_listener(context: &WorkflowContext, name: &str) -> Result<Option<Arc<dyn EventListener<Self>>>>;
}

impl ListenerScope for ProcessEvent {
    fn element(context: &WorkflowContext) -> Result<ElementRef> {
        Ok(ElementRef::new(
            context.process.name(),
            context.process.display_name(),
        ))
    }

    fn element_listeners(context: &WorkflowContext, event: Self) -> Result<ListenerGroups<Self>> {
        Ok(context.process.listeners().groups(event))
    }

    fn element_listener(context: &WorkflowContext, name: &str) -> Result<Option<Arc<dyn EventListener<Self>>>> {
        Ok(context.process.listeners().listener(name))
    }
}

impl ListenerScope for TaskEvent {
    fn element(context: &WorkflowContext) -> Result<ElementRef> {
        let task = context.current_task()?;
        Ok(ElementRef::new(task.name(), task.display_name()))
    }

    fn element_listeners(context: &WorkflowContext, event: Self) -> Result<ListenerGroups<Self>> {
        context.current_task()?.listener_groups(event, context)
    }

    fn element_listener(context: &WorkflowContext, name: &str) -> Result<Option<Arc<dyn EventListener<Self>>>> {
        context.current_task()?.listener(name, context)
    }
}

/// Dispatches one event family to the manager and element listeners
pub struct EventNotifier<E: ListenerScope> {
    manager: Arc<ListenerRegistry<E>>,
    event_log: Arc<dyn EventLogRepository>,
    pool: Arc<WorkerPool>,
}

pub type ProcessEventNotifier = EventNotifier<ProcessEvent>;
pub type TaskEventNotifier = EventNotifier<TaskEvent>;

impl<E: ListenerScope> EventNotifier<E> {
    pub fn new(
        manager: Arc<ListenerRegistry<E>>,
        event_log: Arc<dyn EventLogRepository>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            manager,
            event_log,
            pool,
        }
    }

    /// Create with a dedicated pool sized by `config`
    pub fn from_config(
        manager: Arc<ListenerRegistry<E>>,
        event_log: Arc<dyn EventLogRepository>,
        config: &NotifierConfig,
    ) -> Self {
        let mut pool_config = WorkerPoolConfig::new(E::EVENT_TYPE, config.workers);
        pool_config.queue_capacity = config.queue_capacity;
        Self::new(manager, event_log, Arc::new(WorkerPool::new(pool_config)))
    }

    pub fn manager(&self) -> &ListenerRegistry<E> {
        &self.manager
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Wait for every async listener submitted so far
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    /// Dispatch `event` to every listener registered for it
    pub async fn notify(&self, event: E, source_context: &WorkflowContext) -> Result<()> {
        let context = Arc::new(source_context.clone());
        let element = E::element(&context)?;

        let manager_sync = self.manager.sync_listeners(event);
        self.trace(&element, event, "manager.sync_listeners", manager_sync);
        for listener in manager_sync {
            self.run_sync(listener, &context, &element).await?;
        }

        let element_groups = E::element_listeners(&context, event)?;
        self.trace(&element, event, "element.sync_listeners", &element_groups.sync);
        for listener in &element_groups.sync {
            self.run_sync(listener, &context, &element).await?;
        }

        let manager_async = self.manager.async_listeners(event);
        self.trace(&element, event, "manager.async_listeners", manager_async);
        for listener in manager_async {
            self.submit(Arc::clone(listener), Arc::clone(&context), element.clone())
                .await;
        }

        self.trace(&element, event, "element.async_listeners", &element_groups.asynchronous);
        for listener in element_groups.asynchronous {
            self.submit(listener, Arc::clone(&context), element.clone()).await;
        }

        Ok(())
    }

    /// Dispatch a single listener by name, found in the manager and/or the element
    pub async fn notify_by_name(
        &self,
        listener_name: &str,
        force_sync: bool,
        source_context: &WorkflowContext,
    ) -> Result<()> {
        let context = Arc::new(source_context.clone());
        let element = E::element(&context)?;

        info!(
            listener = %listener_name,
            force_sync,
            element = %element.name,
            "Notifying listener by name"
        );

        if let Some(listener) = self.manager.listener(listener_name) {
            self.dispatch(listener, force_sync, &context, &element).await?;
        }
        if let Some(listener) = E::element_listener(&context, listener_name)? {
            self.dispatch(listener, force_sync, &context, &element).await?;
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        listener: Arc<dyn EventListener<E>>,
        force_sync: bool,
        context: &Arc<WorkflowContext>,
        element: &ElementRef,
    ) -> Result<()> {
        if force_sync || !listener.is_async() {
            self.run_sync(&listener, context, element).await
        } else {
            self.submit(listener, Arc::clone(context), element.clone()).await;
            Ok(())
        }
    }

    async fn run_sync(
        &self,
        listener: &Arc<dyn EventListener<E>>,
        context: &WorkflowContext,
        element: &ElementRef,
    ) -> Result<()> {
        let logged = LoggedListener::new(Arc::clone(listener), Arc::clone(&self.event_log));
        match logged.listen(context, element, false).await? {
            ListenerResult::Success => Ok(()),
            ListenerResult::Fail(message) => {
                warn!(
                    listener = %logged.name(),
                    element = %element.name,
                    message = %message,
                    "Sync listener failed"
                );
                Err(WorkflowError::ListenerFailed {
                    listener: logged.name().to_string(),
                    message,
                })
            }
        }
    }

    async fn submit(
        &self,
        listener: Arc<dyn EventListener<E>>,
        context: Arc<WorkflowContext>,
        element: ElementRef,
    ) {
        let logged = LoggedListener::new(listener, Arc::clone(&self.event_log));
        self.pool
            .execute(async move {
                match logged.listen(&context, &element, true).await {
                    Ok(ListenerResult::Success) => {}
                    Ok(ListenerResult::Fail(message)) => {
                        warn!(
                            listener = %logged.name(),
                            element = %element.name,
                            message = %message,
                            "Async listener failed"
                        );
                    }
                    Err(e) => {
                        error!(
                            listener = %logged.name(),
                            element = %element.name,
                            error = %e,
                            "Async listener error"
                        );
                    }
                }
            })
            .await;
    }

    fn trace(&self, element: &ElementRef, event: E, source: &str, listeners: &[Arc<dyn EventListener<E>>]) {
        if listeners.is_empty() {
            return;
        }
        let names: Vec<&str> = listeners.iter().map(|l| l.name()).collect();
        info!(
            element = %element.name,
            event = %event,
            source,
            listeners = ?names,
            "Dispatching listeners"
        );
    }
}

/// The process and task notifiers of one engine, each with its own pool
pub struct WorkflowEventNotifier {
    process: Arc<ProcessEventNotifier>,
    task: Arc<TaskEventNotifier>,
}

impl WorkflowEventNotifier {
    pub fn new(
        process_manager: Arc<ListenerRegistry<ProcessEvent>>,
        task_manager: Arc<ListenerRegistry<TaskEvent>>,
        event_log: Arc<dyn EventLogRepository>,
        config: &NotifierConfig,
    ) -> Self {
        Self {
            process: Arc::new(ProcessEventNotifier::from_config(
                process_manager,
                Arc::clone(&event_log),
                config,
            )),
            task: Arc::new(TaskEventNotifier::from_config(task_manager, event_log, config)),
        }
    }

    pub fn process_notifier(&self) -> Arc<ProcessEventNotifier> {
        Arc::clone(&self.process)
    }

    pub fn task_notifier(&self) -> Arc<TaskEventNotifier> {
        Arc::clone(&self.task)
    }

    /// Wait for async listeners of both notifiers
    pub async fn wait_idle(&self) {
        self.process.wait_idle().await;
        self.task.wait_idle().await;
    }
}
