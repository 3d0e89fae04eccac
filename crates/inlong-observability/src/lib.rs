//! Observability for the InLong workflow core

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, TracingConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),
}

pub type Result<T> = std::result::Result<T, ObservabilityError>;
