//! Persisted workflow records
//!
//! Task rows are never deleted; together with the event log they form the
//! audit trail of a process instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a task row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Approved,
    Rejected,
    Canceled,
    Transferred,
    Terminated,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Approved => "APPROVED",
            TaskStatus::Rejected => "REJECTED",
            TaskStatus::Canceled => "CANCELED",
            TaskStatus::Transferred => "TRANSFERRED",
            TaskStatus::Terminated => "TERMINATED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a process instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    Processing,
    Completed,
    Rejected,
    Canceled,
    Terminated,
}

/// One process instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowProcessEntity {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub process_type: String,
    pub applicant: String,
    pub status: ProcessStatus,
    pub inlong_group_id: Option<String>,
    pub form_data: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl WorkflowProcessEntity {
    pub fn new(id: i64, name: impl Into<String>, applicant: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            display_name: name.clone(),
            process_type: name.clone(),
            name,
            applicant: applicant.into(),
            status: ProcessStatus::Processing,
            inlong_group_id: None,
            form_data: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.inlong_group_id = Some(group_id.into());
        self
    }
}

/// One task instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTaskEntity {
    /// Assigned by the repository on insert
    pub id: i64,
    pub task_type: String,
    pub process_id: i64,
    pub process_name: String,
    pub process_display_name: String,
    pub applicant: String,
    pub name: String,
    pub display_name: String,
    /// Approver names joined by [`WorkflowTaskEntity::APPROVERS_DELIMITER`]
    pub approvers: String,
    pub operator: Option<String>,
    pub status: TaskStatus,
    pub remark: Option<String>,
    /// Serialized task form
    pub form_data: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// JSON object with free-form extension values
    pub ext_params: Option<String>,
    /// Bumped by every successful update
    #[serde(default)]
    pub version: i32,
}

impl WorkflowTaskEntity {
    pub const APPROVERS_DELIMITER: &'static str = ",";
    pub const EXT_TRANSFER_USER_KEY: &'static str = "transferToUsers";

    /// A fresh PENDING row, not yet persisted
    pub fn pending(
        task_type: impl Into<String>,
        process: &WorkflowProcessEntity,
        name: impl Into<String>,
        display_name: impl Into<String>,
        approvers: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            task_type: task_type.into(),
            process_id: process.id,
            process_name: process.name.clone(),
            process_display_name: process.display_name.clone(),
            applicant: process.applicant.clone(),
            name: name.into(),
            display_name: display_name.into(),
            approvers: approvers.into(),
            operator: None,
            status: TaskStatus::Pending,
            remark: None,
            form_data: None,
            start_time: Utc::now(),
            end_time: None,
            ext_params: None,
            version: 0,
        }
    }

    pub fn approver_list(&self) -> impl Iterator<Item = &str> {
        self.approvers.split(Self::APPROVERS_DELIMITER)
    }

    pub fn is_approver(&self, user: &str) -> bool {
        self.approver_list().any(|approver| approver == user)
    }
}

/// Outcome recorded for one listener invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventLogStatus {
    Executing,
    Success,
    Failed,
}

/// Audit row written around every listener invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEventLogEntity {
    /// Assigned by the repository on insert
    pub id: i64,
    pub process_id: i64,
    pub process_name: String,
    pub process_display_name: String,
    pub inlong_group_id: Option<String>,
    pub task_id: Option<i64>,
    pub element_name: String,
    pub element_display_name: String,
    /// `ProcessEvent` or `TaskEvent`
    pub event_type: String,
    pub event: String,
    pub listener: String,
    pub is_async: bool,
    pub status: EventLogStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    pub exception: Option<String>,
}
