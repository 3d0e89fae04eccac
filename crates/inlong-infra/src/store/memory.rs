//! In-memory repositories
//!
//! Back the workflow core in tests and in the CLI replay. Ids are assigned
//! from a per-repository sequence, like an auto-increment column.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use inlong_core::{
    AppError, EventLogRepository, Result, TaskEntityRepository, TaskStatus,
    WorkflowEventLogEntity, WorkflowTaskEntity,
};

/// In-memory task row storage
#[derive(Clone, Default)]
pub struct MemoryTaskRepository {
    rows: Arc<RwLock<BTreeMap<i64, WorkflowTaskEntity>>>,
    sequence: Arc<AtomicI64>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored rows
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Check if storage is empty
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl TaskEntityRepository for MemoryTaskRepository {
    async fn insert(&self, mut entity: WorkflowTaskEntity) -> Result<WorkflowTaskEntity> {
        entity.id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        entity.version = 0;

        let mut rows = self.rows.write().await;
        rows.insert(entity.id, entity.clone());
        debug!(task_id = entity.id, name = %entity.name, "Task row inserted");
        Ok(entity)
    }

    async fn update(&self, entity: &WorkflowTaskEntity) -> Result<WorkflowTaskEntity> {
        let mut rows = self.rows.write().await;
        let stored = rows
            .get_mut(&entity.id)
            .ok_or_else(|| AppError::not_found("task", entity.id))?;

        if stored.version != entity.version {
            return Err(AppError::Conflict {
                entity: "task",
                id: entity.id.to_string(),
                expected: entity.version,
                actual: stored.version,
            });
        }

        let mut updated = entity.clone();
        updated.version += 1;
        *stored = updated.clone();
        debug!(
            task_id = entity.id,
            status = %updated.status,
            version = updated.version,
            "Task row updated"
        );
        Ok(updated)
    }

    async fn get(&self, id: i64) -> Result<Option<WorkflowTaskEntity>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn count_by_status(&self, process_id: i64, name: &str, status: TaskStatus) -> Result<usize> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| row.process_id == process_id && row.name == name && row.status == status)
            .count())
    }

    async fn list_by_process(&self, process_id: i64) -> Result<Vec<WorkflowTaskEntity>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| row.process_id == process_id)
            .cloned()
            .collect())
    }
}

/// In-memory event log storage
#[derive(Clone, Default)]
pub struct MemoryEventLogRepository {
    rows: Arc<RwLock<BTreeMap<i64, WorkflowEventLogEntity>>>,
    sequence: Arc<AtomicI64>,
}

impl MemoryEventLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLogRepository for MemoryEventLogRepository {
    async fn insert(&self, mut log: WorkflowEventLogEntity) -> Result<WorkflowEventLogEntity> {
        log.id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.write().await.insert(log.id, log.clone());
        Ok(log)
    }

    async fn update(&self, log: &WorkflowEventLogEntity) -> Result<()> {
        let mut rows = self.rows.write().await;
        let stored = rows
            .get_mut(&log.id)
            .ok_or_else(|| AppError::not_found("event log", log.id))?;
        *stored = log.clone();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowEventLogEntity>> {
        Ok(self.rows.read().await.values().cloned().collect())
    }

    async fn list_by_process(&self, process_id: i64) -> Result<Vec<WorkflowEventLogEntity>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| row.process_id == process_id)
            .cloned()
            .collect())
    }
}
