//! Resilience primitives for listener dispatch

pub mod worker_pool;

pub use worker_pool::{WorkerPool, WorkerPoolConfig};
