//! Repository implementations

pub mod memory;

pub use memory::{MemoryEventLogRepository, MemoryTaskRepository};
