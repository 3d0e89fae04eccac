//! Core types for the InLong workflow dispatch core: configuration,
//! persisted entities and the repository contracts they are stored through.

pub mod config;
pub mod entity;
pub mod error;
pub mod traits;

pub use crate::config::{ApprovalConfig, NotifierConfig, WorkflowConfig};
pub use crate::entity::*;
pub use crate::error::{AppError, Result};
pub use crate::traits::{EventLogRepository, TaskEntityRepository};
