//! Listener registries
//!
//! A registry indexes listeners by name and by (event, mode). Insertion order
//! within each (event, mode) group is preserved because it is the dispatch
//! order. Registries are filled while a process is being defined and are
//! read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::event::{EventListener, ProcessEvent, TaskEvent, WorkflowEvent};
use crate::{Result, WorkflowError};

type SharedListener<E> = Arc<dyn EventListener<E>>;

pub struct ListenerRegistry<E: WorkflowEvent> {
    listeners: HashMap<String, SharedListener<E>>,
    sync_listeners: HashMap<E, Vec<SharedListener<E>>>,
    async_listeners: HashMap<E, Vec<SharedListener<E>>>,
}

pub type ProcessEventListenerManager = ListenerRegistry<ProcessEvent>;
pub type TaskEventListenerManager = ListenerRegistry<TaskEvent>;

impl<E: WorkflowEvent> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
            sync_listeners: HashMap::new(),
            async_listeners: HashMap::new(),
        }
    }
}

impl<E: WorkflowEvent> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener under its name and its (event, mode) group
    pub fn register(&mut self, listener: SharedListener<E>) -> Result<()> {
        let name = listener.name().to_string();
        if self.listeners.contains_key(&name) {
            return Err(WorkflowError::DuplicateListener(name));
        }

        let event = listener.event();
        let group = if listener.is_async() {
            &mut self.async_listeners
        } else {
            &mut self.sync_listeners
        };
        group.entry(event).or_default().push(Arc::clone(&listener));

        debug!(
            listener = %name,
            event = %event,
            is_async = listener.is_async(),
            "Listener registered"
        );
        self.listeners.insert(name, listener);
        Ok(())
    }

    pub fn sync_listeners(&self, event: E) -> &[SharedListener<E>] {
        self.sync_listeners
            .get(&event)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn async_listeners(&self, event: E) -> &[SharedListener<E>] {
        self.async_listeners
            .get(&event)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Both groups registered for `event`
    pub fn groups(&self, event: E) -> ListenerGroups<E> {
        ListenerGroups {
            sync: self.sync_listeners(event).to_vec(),
            asynchronous: self.async_listeners(event).to_vec(),
        }
    }

    pub fn listener(&self, name: &str) -> Option<SharedListener<E>> {
        self.listeners.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Listeners resolved for one event, split by dispatch mode
pub struct ListenerGroups<E: WorkflowEvent> {
    pub sync: Vec<SharedListener<E>>,
    pub asynchronous: Vec<SharedListener<E>>,
}

impl<E: WorkflowEvent> Default for ListenerGroups<E> {
    fn default() -> Self {
        Self {
            sync: Vec::new(),
            asynchronous: Vec::new(),
        }
    }
}

impl<E: WorkflowEvent> ListenerGroups<E> {
    /// Append listeners bound to `event`, each to the group of its mode
    pub fn extend_for(&mut self, event: E, listeners: impl IntoIterator<Item = SharedListener<E>>) {
        for listener in listeners.into_iter().filter(|l| l.event() == event) {
            if listener.is_async() {
                self.asynchronous.push(listener);
            } else {
                self.sync.push(listener);
            }
        }
    }
}

impl<E: WorkflowEvent> fmt::Debug for ListenerRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.listeners.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ListenerRegistry")
            .field("event_type", &E::EVENT_TYPE)
            .field("listeners", &names)
            .finish()
    }
}
