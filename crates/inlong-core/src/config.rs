use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Workflow core configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
}

impl WorkflowConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("INLONG")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?.add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("INLONG")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("notifier.workers", default_workers() as i64)?
            .set_default("approval.system_operator", default_system_operator())
    }
}

/// Event notifier worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Number of workers running async listeners
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Queue capacity; `None` means unbounded
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: None,
        }
    }
}

impl NotifierConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            queue_capacity: None,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }
}

fn default_workers() -> usize {
    20
}

/// Approval task configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Operator recorded on automated (service) task rows
    #[serde(default = "default_system_operator")]
    pub system_operator: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            system_operator: default_system_operator(),
        }
    }
}

fn default_system_operator() -> String {
    "admin".to_string()
}
