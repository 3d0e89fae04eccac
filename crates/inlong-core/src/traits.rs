//! Persistence contracts consumed by the workflow core.

use async_trait::async_trait;

use crate::entity::{TaskStatus, WorkflowEventLogEntity, WorkflowTaskEntity};
use crate::error::Result;

/// Storage for task rows.
#[async_trait]
pub trait TaskEntityRepository: Send + Sync {
    /// Insert a row and return it with its assigned id.
    async fn insert(&self, entity: WorkflowTaskEntity) -> Result<WorkflowTaskEntity>;

    /// Compare-and-set update keyed on `entity.version`.
    ///
    /// Returns the stored row with its bumped version, or `AppError::Conflict`
    /// when the stored version differs from the one supplied.
    async fn update(&self, entity: &WorkflowTaskEntity) -> Result<WorkflowTaskEntity>;

    async fn get(&self, id: i64) -> Result<Option<WorkflowTaskEntity>>;

    /// Count rows of one task name within a process instance by status.
    async fn count_by_status(&self, process_id: i64, name: &str, status: TaskStatus) -> Result<usize>;

    async fn list_by_process(&self, process_id: i64) -> Result<Vec<WorkflowTaskEntity>>;
}

/// Storage for listener audit rows.
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    async fn insert(&self, log: WorkflowEventLogEntity) -> Result<WorkflowEventLogEntity>;

    async fn update(&self, log: &WorkflowEventLogEntity) -> Result<()>;

    async fn list(&self) -> Result<Vec<WorkflowEventLogEntity>>;

    async fn list_by_process(&self, process_id: i64) -> Result<Vec<WorkflowEventLogEntity>>;
}
