//! Tracing subscriber setup

use crate::{ObservabilityError, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Targets carrying listener dispatch and audit records
const DISPATCH_TARGETS: [&str; 2] = ["inlong_workflow::notifier", "inlong_workflow::audit"];

/// Tracing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Service name recorded in the startup line
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Default filter directive, overridden by `RUST_LOG`
    pub log_level: String,
    /// Level for listener dispatch records, when it should differ from `log_level`
    #[serde(default)]
    pub dispatch_level: Option<String>,
    /// Enable JSON logging
    pub json_logs: bool,
    /// Enable span events (enter, exit)
    pub span_events: bool,
    /// Enable colored output (for console)
    pub colored_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "inlong-workflow".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            dispatch_level: None,
            json_logs: false,
            span_events: false,
            colored_output: true,
        }
    }
}

impl TracingConfig {
    /// JSON records without ANSI codes, for log shippers
    pub fn production() -> Self {
        Self {
            json_logs: true,
            colored_output: false,
            ..Default::default()
        }
    }

    pub fn with_service_name(mut self, name: &str) -> Self {
        self.service_name = name.to_string();
        self
    }

    pub fn with_log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }

    pub fn with_dispatch_level(mut self, level: &str) -> Self {
        self.dispatch_level = Some(level.to_string());
        self
    }

    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    pub fn with_colored_output(mut self, colored: bool) -> Self {
        self.colored_output = colored;
        self
    }

    /// Filter directive built from `log_level` and `dispatch_level`
    pub fn directive(&self) -> String {
        let mut directives = vec![self.log_level.clone()];
        if let Some(level) = &self.dispatch_level {
            directives.extend(DISPATCH_TARGETS.iter().map(|target| format!("{target}={level}")));
        }
        directives.join(",")
    }
}

/// Install the global subscriber; records go to stderr so command output
/// on stdout stays machine-readable
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directive())
            .map_err(|e| ObservabilityError::TracingInit(e.to_string()))?,
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(false);
        subscriber
            .with(fmt_layer)
            .try_init()
            .map_err(|e| ObservabilityError::TracingInit(e.to_string()))?;
    } else {
        // Async listeners run on named pool threads
        let mut layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(true)
            .with_ansi(config.colored_output);

        if config.span_events {
            layer = layer.with_span_events(FmtSpan::ENTER | FmtSpan::EXIT);
        }

        subscriber
            .with(layer)
            .try_init()
            .map_err(|e| ObservabilityError::TracingInit(e.to_string()))?;
    }

    tracing::debug!(
        service = %config.service_name,
        version = %config.service_version,
        "Tracing initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = TracingConfig::default()
            .with_service_name("replay")
            .with_log_level("debug")
            .with_json_logs(true);

        assert_eq!(config.service_name, "replay");
        assert_eq!(config.log_level, "debug");
        assert!(config.json_logs);
    }

    #[test]
    fn test_directive_adds_dispatch_targets() {
        assert_eq!(TracingConfig::default().with_log_level("warn").directive(), "warn");

        let directive = TracingConfig::default()
            .with_log_level("warn")
            .with_dispatch_level("debug")
            .directive();
        assert_eq!(
            directive,
            "warn,inlong_workflow::notifier=debug,inlong_workflow::audit=debug"
        );
    }

    #[test]
    fn test_production_defaults() {
        let config = TracingConfig::production();
        assert!(config.json_logs);
        assert!(!config.colored_output);
    }

    #[test]
    fn test_second_init_fails() {
        let config = TracingConfig::default().with_colored_output(false);
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
