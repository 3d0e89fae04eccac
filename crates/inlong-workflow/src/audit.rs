//! Event log wrapper around listener invocations
//!
//! Every dispatched listener runs through [`LoggedListener`], which records an
//! EXECUTING row before the call and SUCCESS or FAILED after it. The
//! listener's outcome passes through untouched; event log storage failures
//! are only logged.

use chrono::Utc;
use inlong_core::{EventLogRepository, EventLogStatus, WorkflowEventLogEntity};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::WorkflowContext;
use crate::event::{EventListener, ListenerResult, WorkflowEvent};
use crate::Result;

/// Name of the element (process or task) a dispatch runs for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub name: String,
    pub display_name: String,
}

impl ElementRef {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
        }
    }
}

pub struct LoggedListener<E: WorkflowEvent> {
    listener: Arc<dyn EventListener<E>>,
    event_log: Arc<dyn EventLogRepository>,
}

impl<E: WorkflowEvent> LoggedListener<E> {
    pub fn new(listener: Arc<dyn EventListener<E>>, event_log: Arc<dyn EventLogRepository>) -> Self {
        Self { listener, event_log }
    }

    pub fn name(&self) -> &str {
        self.listener.name()
    }

    /// Run the listener, recording the invocation; `is_async` is the mode it
    /// actually runs in, which differs from the listener's own flag when forced
    pub async fn listen(
        &self,
        context: &WorkflowContext,
        element: &ElementRef,
        is_async: bool,
    ) -> Result<ListenerResult> {
        let log = self.begin(context, element, is_async).await;
        let outcome = self.listener.listen(context).await;
        if let Some(log) = log {
            self.finish(log, &outcome).await;
        }
        outcome
    }

    async fn begin(
        &self,
        context: &WorkflowContext,
        element: &ElementRef,
        is_async: bool,
    ) -> Option<WorkflowEventLogEntity> {
        let process = &context.process_entity;
        let log = WorkflowEventLogEntity {
            id: 0,
            process_id: process.id,
            process_name: process.name.clone(),
            process_display_name: process.display_name.clone(),
            inlong_group_id: context.inlong_group_id().map(str::to_string),
            task_id: context.action_context.as_ref().map(|a| a.task_entity.id),
            element_name: element.name.clone(),
            element_display_name: element.display_name.clone(),
            event_type: E::EVENT_TYPE.to_string(),
            event: self.listener.event().as_str().to_string(),
            listener: self.listener.name().to_string(),
            is_async,
            status: EventLogStatus::Executing,
            start_time: Utc::now(),
            end_time: None,
            remark: None,
            exception: None,
        };

        match self.event_log.insert(log).await {
            Ok(saved) => Some(saved),
            Err(e) => {
                warn!(
                    listener = %self.listener.name(),
                    error = %e,
                    "Failed to record listener start"
                );
                None
            }
        }
    }

    async fn finish(&self, mut log: WorkflowEventLogEntity, outcome: &Result<ListenerResult>) {
        log.end_time = Some(Utc::now());
        match outcome {
            Ok(ListenerResult::Success) => {
                log.status = EventLogStatus::Success;
            }
            Ok(ListenerResult::Fail(message)) => {
                log.status = EventLogStatus::Failed;
                log.remark = Some(message.clone());
            }
            Err(e) => {
                log.status = EventLogStatus::Failed;
                log.exception = Some(e.to_string());
            }
        }

        debug!(
            listener = %log.listener,
            element = %log.element_name,
            event = %log.event,
            status = ?log.status,
            "Listener finished"
        );

        if let Err(e) = self.event_log.update(&log).await {
            warn!(
                listener = %log.listener,
                error = %e,
                "Failed to record listener result"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::WorkflowProcess;
    use crate::event::ProcessEvent;
    use crate::WorkflowError;
    use async_trait::async_trait;
    use inlong_core::{AppError, WorkflowProcessEntity};
    use inlong_infra::MemoryEventLogRepository;

    struct Scripted {
        outcome: fn() -> Result<ListenerResult>,
    }

    #[async_trait]
    impl EventListener<ProcessEvent> for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn event(&self) -> ProcessEvent {
            ProcessEvent::Create
        }

        async fn listen(&self, _context: &WorkflowContext) -> Result<ListenerResult> {
            (self.outcome)()
        }
    }

    struct BrokenLog;

    #[async_trait]
    impl EventLogRepository for BrokenLog {
        async fn insert(&self, _log: WorkflowEventLogEntity) -> inlong_core::Result<WorkflowEventLogEntity> {
            Err(AppError::Storage("event log offline".to_string()))
        }

        async fn update(&self, _log: &WorkflowEventLogEntity) -> inlong_core::Result<()> {
            Err(AppError::Storage("event log offline".to_string()))
        }

        async fn list(&self) -> inlong_core::Result<Vec<WorkflowEventLogEntity>> {
            Ok(Vec::new())
        }

        async fn list_by_process(&self, _process_id: i64) -> inlong_core::Result<Vec<WorkflowEventLogEntity>> {
            Ok(Vec::new())
        }
    }

    fn context() -> WorkflowContext {
        WorkflowContext::new(
            Arc::new(WorkflowProcess::new("NEW_GROUP", "New Group")),
            WorkflowProcessEntity::new(5, "NEW_GROUP", "alice").with_group_id("g1"),
        )
    }

    fn element() -> ElementRef {
        ElementRef::new("NEW_GROUP", "New Group")
    }

    #[tokio::test]
    async fn test_success_recorded() {
        let log = Arc::new(MemoryEventLogRepository::new());
        let wrapped = LoggedListener::new(
            Arc::new(Scripted { outcome: || Ok(ListenerResult::success()) }),
            log.clone(),
        );

        let result = wrapped.listen(&context(), &element(), false).await.unwrap();
        assert!(result.is_success());

        let rows = log.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, EventLogStatus::Success);
        assert_eq!(rows[0].event_type, "ProcessEvent");
        assert_eq!(rows[0].event, "CREATE");
        assert_eq!(rows[0].inlong_group_id.as_deref(), Some("g1"));
        assert!(rows[0].end_time.is_some());
        assert!(!rows[0].is_async);
    }

    #[tokio::test]
    async fn test_failures_recorded_and_passed_through() {
        let log = Arc::new(MemoryEventLogRepository::new());

        let refused = LoggedListener::new(
            Arc::new(Scripted { outcome: || Ok(ListenerResult::fail("quota exceeded")) }),
            log.clone(),
        );
        let result = refused.listen(&context(), &element(), true).await.unwrap();
        assert_eq!(result, ListenerResult::fail("quota exceeded"));

        let broken = LoggedListener::new(
            Arc::new(Scripted { outcome: || Err(WorkflowError::External("sort unreachable".into())) }),
            log.clone(),
        );
        let err = broken.listen(&context(), &element(), false).await.unwrap_err();
        assert!(matches!(err, WorkflowError::External(_)));

        let rows = log.list().await.unwrap();
        assert_eq!(rows[0].status, EventLogStatus::Failed);
        assert_eq!(rows[0].remark.as_deref(), Some("quota exceeded"));
        assert!(rows[0].is_async);
        assert_eq!(rows[1].status, EventLogStatus::Failed);
        assert!(rows[1].exception.as_deref().unwrap().contains("sort unreachable"));
    }

    #[tokio::test]
    async fn test_log_storage_failure_does_not_change_outcome() {
        let wrapped = LoggedListener::new(
            Arc::new(Scripted { outcome: || Ok(ListenerResult::success()) }),
            Arc::new(BrokenLog),
        );

        let result = wrapped.listen(&context(), &element(), false).await.unwrap();
        assert!(result.is_success());
    }
}
