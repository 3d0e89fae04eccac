//! Workflow dispatch core for InLong
//!
//! This crate provides the pieces a workflow engine calls on every state
//! transition:
//! - Process and task event listeners with per-event sync/async registries
//! - Event notifiers that dispatch inline or on a bounded worker pool
//! - Audit logging of every listener invocation
//! - Selector-filtered service task listeners with plugin contributions
//! - User (approval) and service task processors

pub mod audit;
pub mod context;
pub mod definition;
pub mod event;
pub mod form;
pub mod notifier;
pub mod processor;
pub mod registry;
pub mod selector;
pub mod service_listener;

pub use audit::{ElementRef, LoggedListener};
pub use context::{ActionContext, WorkflowContext};
pub use definition::{
    ApproverAssign, FixedApprovers, ServiceTaskListenerProvider, ServiceTaskSpec, ServiceTaskType,
    TaskKind, UserTaskSpec, WorkflowProcess, WorkflowTask, END_EVENT,
};
pub use event::{
    EventListener, ListenerResult, ProcessEvent, ProcessEventListener, TaskEvent,
    TaskEventListener, WorkflowAction, WorkflowEvent,
};
pub use form::{ProcessForm, ProcessFormKind, TaskForm, TaskFormKind};
pub use notifier::{
    EventNotifier, ListenerScope, ProcessEventNotifier, TaskEventNotifier,
    WorkflowEventNotifier,
};
pub use processor::{ServiceTaskProcessor, TaskProcessor, UserTaskProcessor};
pub use registry::{
    ListenerGroups, ListenerRegistry, ProcessEventListenerManager, TaskEventListenerManager,
};
pub use selector::EventSelector;
pub use service_listener::{
    ListenerCategory, Plugin, ProcessPlugin, SelectedListener, ServiceTaskListenerFactory,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported service task type: {0}")]
    UnsupportedTaskType(String),

    #[error("Cannot assign approvers for task {0}: the approver set is empty")]
    EmptyApprovers(String),

    #[error("Form type mismatch: expected {expected}, got {actual}")]
    FormTypeMismatch { expected: String, actual: String },

    #[error("Form validation failed: {0}")]
    FormValidation(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid task state: {0}")]
    InvalidState(String),

    #[error("current operator {operator} not in approvers list: {approvers}")]
    Unauthorized { operator: String, approvers: String },

    #[error("Duplicate listener: {0}")]
    DuplicateListener(String),

    /// A listener returned `ListenerResult::Fail`; the message is shown as is
    #[error("{message}")]
    ListenerFailed { listener: String, message: String },

    #[error("External call failed: {0}")]
    External(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] inlong_core::AppError),
}

impl WorkflowError {
    /// Wiring or definition bugs that must not be retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkflowError::Configuration(_)
                | WorkflowError::UnsupportedTaskType(_)
                | WorkflowError::EmptyApprovers(_)
                | WorkflowError::FormTypeMismatch { .. }
                | WorkflowError::DuplicateListener(_)
        )
    }

    /// The operator may retry with a different identity or action
    pub fn is_authorization(&self) -> bool {
        matches!(self, WorkflowError::Unauthorized { .. })
    }

    /// Lost an optimistic update against a concurrent writer
    pub fn is_conflict(&self) -> bool {
        matches!(self, WorkflowError::Core(inlong_core::AppError::Conflict { .. }))
    }

    /// Get error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            WorkflowError::Configuration(_) => "CONFIGURATION_ERROR",
            WorkflowError::UnsupportedTaskType(_) => "UNSUPPORTED_TASK_TYPE",
            WorkflowError::EmptyApprovers(_) => "EMPTY_APPROVERS",
            WorkflowError::FormTypeMismatch { .. } => "FORM_TYPE_MISMATCH",
            WorkflowError::FormValidation(_) => "FORM_VALIDATION_ERROR",
            WorkflowError::InvalidAction(_) => "INVALID_ACTION",
            WorkflowError::InvalidState(_) => "INVALID_STATE",
            WorkflowError::Unauthorized { .. } => "UNAUTHORIZED",
            WorkflowError::DuplicateListener(_) => "DUPLICATE_LISTENER",
            WorkflowError::ListenerFailed { .. } => "LISTENER_FAILED",
            WorkflowError::External(_) => "EXTERNAL_ERROR",
            WorkflowError::Serialization(_) => "SERIALIZATION_ERROR",
            WorkflowError::Core(e) => e.error_code(),
        }
    }
}


pub type Result<T> = std::result::Result<T, WorkflowError>;
