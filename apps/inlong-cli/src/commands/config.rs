//! Configuration commands

use crate::output::{self, OutputFormat};
use crate::ConfigCommands;
use anyhow::Result;
use colored::Colorize;
use inlong_core::WorkflowConfig;
use std::path::Path;

pub fn run(cmd: ConfigCommands, config: &WorkflowConfig, source: Option<&Path>, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show_config(config, source, format),
    }
}

fn show_config(config: &WorkflowConfig, source: Option<&Path>, format: OutputFormat) -> Result<()> {
    if let Some(rendered) = output::format_structured(config, format)? {
        println!("{}", rendered);
        return Ok(());
    }

    match source {
        Some(path) => output::key_value("Config file", &path.display().to_string()),
        None => output::key_value("Config file", &"[environment only]".dimmed().to_string()),
    }

    output::section("Notifier");
    println!("  {}: {}", "workers".cyan(), config.notifier.workers);
    let capacity = config
        .notifier
        .queue_capacity
        .map_or_else(|| "unbounded".to_string(), |c| c.to_string());
    println!("  {}: {}", "queue_capacity".cyan(), capacity);

    output::section("Approval");
    println!("  {}: {}", "system_operator".cyan(), config.approval.system_operator);

    Ok(())
}
