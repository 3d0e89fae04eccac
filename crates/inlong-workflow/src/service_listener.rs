//! Selector-filtered listeners for service tasks
//!
//! Listeners are grouped into four categories. A service task type maps to
//! one category; at dispatch time the category's (listener, selector) pairs
//! are walked in registration order and the accepted listeners returned.
//! Plugins can append pairs at runtime.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::WorkflowContext;
use crate::definition::{ServiceTaskListenerProvider, ServiceTaskType};
use crate::event::TaskEventListener;
use crate::selector::EventSelector;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListenerCategory {
    SourceOperate,
    SinkOperate,
    QueueOperate,
    SortOperate,
}

impl ListenerCategory {
    pub fn for_task_type(task_type: ServiceTaskType) -> Self {
        match task_type {
            ServiceTaskType::InitMq => ListenerCategory::QueueOperate,
            ServiceTaskType::InitSort
            | ServiceTaskType::StopSort
            | ServiceTaskType::RestartSort
            | ServiceTaskType::DeleteSort => ListenerCategory::SortOperate,
            ServiceTaskType::InitSource
            | ServiceTaskType::StopSource
            | ServiceTaskType::RestartSource
            | ServiceTaskType::DeleteSource => ListenerCategory::SourceOperate,
            ServiceTaskType::InitSink => ListenerCategory::SinkOperate,
        }
    }
}

/// A listener paired with the selector gating it
#[derive(Clone)]
pub struct SelectedListener {
    pub listener: Arc<TaskEventListener>,
    pub selector: Arc<dyn EventSelector>,
}

impl SelectedListener {
    pub fn new(listener: Arc<TaskEventListener>, selector: Arc<dyn EventSelector>) -> Self {
        Self { listener, selector }
    }
}

impl fmt::Debug for SelectedListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedListener")
            .field("listener", &self.listener.name())
            .finish()
    }
}

/// Contributes service task listeners, one list per category
pub trait ProcessPlugin: Send + Sync {
    fn source_operate_listeners(&self) -> Vec<SelectedListener> {
        Vec::new()
    }

    fn sink_operate_listeners(&self) -> Vec<SelectedListener> {
        Vec::new()
    }

    fn queue_operate_listeners(&self) -> Vec<SelectedListener> {
        Vec::new()
    }

    fn sort_operate_listeners(&self) -> Vec<SelectedListener> {
        Vec::new()
    }
}

/// Something loaded at runtime; only process plugins contribute listeners
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn as_process_plugin(&self) -> Option<&dyn ProcessPlugin> {
        None
    }
}

#[derive(Default)]
struct CategoryListeners {
    source: Vec<SelectedListener>,
    sink: Vec<SelectedListener>,
    queue: Vec<SelectedListener>,
    sort: Vec<SelectedListener>,
}

impl CategoryListeners {
    fn get(&self, category: ListenerCategory) -> &[SelectedListener] {
        match category {
            ListenerCategory::SourceOperate => &self.source,
            ListenerCategory::SinkOperate => &self.sink,
            ListenerCategory::QueueOperate => &self.queue,
            ListenerCategory::SortOperate => &self.sort,
        }
    }

    fn get_mut(&mut self, category: ListenerCategory) -> &mut Vec<SelectedListener> {
        match category {
            ListenerCategory::SourceOperate => &mut self.source,
            ListenerCategory::SinkOperate => &mut self.sink,
            ListenerCategory::QueueOperate => &mut self.queue,
            ListenerCategory::SortOperate => &mut self.sort,
        }
    }
}

/// Categorized (listener, selector) pairs shared by service tasks
#[derive(Default)]
pub struct ServiceTaskListenerFactory {
    listeners: RwLock<CategoryListeners>,
}

impl ServiceTaskListenerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        category: ListenerCategory,
        listener: Arc<TaskEventListener>,
        selector: Arc<dyn EventSelector>,
    ) {
        debug!(listener = %listener.name(), ?category, "Service task listener registered");
        self.listeners
            .write()
            .get_mut(category)
            .push(SelectedListener::new(listener, selector));
    }

    /// Listeners of `category` whose selector accepts, in registration order
    pub fn listeners(&self, context: &WorkflowContext, category: ListenerCategory) -> Vec<Arc<TaskEventListener>> {
        self.listeners
            .read()
            .get(category)
            .iter()
            .filter(|selected| selected.selector.accept(context))
            .map(|selected| Arc::clone(&selected.listener))
            .collect()
    }

    /// Append a plugin's listeners; plugins that are not process plugins are ignored
    pub fn accept_plugin(&self, plugin: &dyn Plugin) {
        let Some(process_plugin) = plugin.as_process_plugin() else {
            debug!(plugin = %plugin.name(), "Plugin contributes no process listeners");
            return;
        };

        let contributions = [
            (ListenerCategory::SourceOperate, process_plugin.source_operate_listeners()),
            (ListenerCategory::SinkOperate, process_plugin.sink_operate_listeners()),
            (ListenerCategory::QueueOperate, process_plugin.queue_operate_listeners()),
            (ListenerCategory::SortOperate, process_plugin.sort_operate_listeners()),
        ];

        let mut listeners = self.listeners.write();
        for (category, added) in contributions {
            info!(
                plugin = %plugin.name(),
                ?category,
                count = added.len(),
                "Accepted plugin listeners"
            );
            listeners.get_mut(category).extend(added);
        }
    }

    pub fn clear_listeners(&self) {
        *self.listeners.write() = CategoryListeners::default();
    }

    pub fn len(&self, category: ListenerCategory) -> usize {
        self.listeners.read().get(category).len()
    }
}

impl ServiceTaskListenerProvider for ServiceTaskListenerFactory {
    fn get(
        &self,
        context: &WorkflowContext,
        task_type: ServiceTaskType,
    ) -> Result<Vec<Arc<TaskEventListener>>> {
        Ok(self.listeners(context, ListenerCategory::for_task_type(task_type)))
    }
}

impl fmt::Debug for ServiceTaskListenerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("ServiceTaskListenerFactory")
            .field("source", &listeners.source)
            .field("sink", &listeners.sink)
            .field("queue", &listeners.queue)
            .field("sort", &listeners.sort)
            .finish()
    }
}
