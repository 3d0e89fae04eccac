//! Infrastructure for the InLong workflow core: the listener worker pool and
//! in-memory repositories.

pub mod resilience;
pub mod store;

pub use resilience::{WorkerPool, WorkerPoolConfig};
pub use store::{MemoryEventLogRepository, MemoryTaskRepository};
