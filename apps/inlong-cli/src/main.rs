//! InLong workflow CLI
//!
//! Replays approval scenarios against the workflow dispatch core with
//! in-memory storage, and inspects the effective configuration.

mod commands;
mod output;
mod scenario;

use clap::{Parser, Subcommand};
use colored::Colorize;
use inlong_core::WorkflowConfig;
use inlong_observability::{init_tracing, TracingConfig};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "inlong-workflow",
    author = "InLong Workflow Team",
    version,
    about = "InLong workflow dispatch core",
    long_about = "Drives InLong approval and resource workflows against in-memory storage.\n\n\
                  Use `replay` to run a scenario file through the task processors and\n\
                  event notifiers, then inspect the task rows and the event log."
)]
struct Cli {
    /// Output format (text, json, yaml)
    #[arg(
        short,
        long,
        default_value = "text",
        value_parser = ["text", "json", "yaml"]
    )]
    format: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "INLONG_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Configuration file; INLONG__* variables override it
    #[arg(short, long, env = "INLONG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file through the workflow core
    Replay {
        /// Scenario file (YAML)
        scenario: PathBuf,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WorkflowConfig> {
    let config = match path {
        Some(path) => WorkflowConfig::load_from_file(&path.to_string_lossy())?,
        None => WorkflowConfig::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let log_level = if cli.verbose { "info" } else { cli.log_level.as_str() };
    let mut tracing_config = TracingConfig::default()
        .with_service_name("inlong-cli")
        .with_log_level(log_level)
        .with_json_logs(cli.json_logs)
        .with_colored_output(!cli.no_color);
    if cli.verbose {
        tracing_config = tracing_config.with_dispatch_level("debug");
    }
    if let Err(e) = init_tracing(&tracing_config) {
        eprintln!("{}: {}", "Warning".yellow(), e);
    }

    // value_parser restricts the flag, so parsing cannot fail
    let format: OutputFormat = cli.format.parse().unwrap_or(OutputFormat::Text);

    let result = match load_config(cli.config.as_ref()) {
        Ok(config) => match cli.command {
            Commands::Replay { scenario } => commands::replay::run(&scenario, &config, format).await,
            Commands::Config(cmd) => commands::config::run(cmd, &config, cli.config.as_deref(), format),
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            if cli.verbose {
                for cause in e.chain().skip(1) {
                    eprintln!("{}: {}", "Caused by".yellow(), cause);
                }
            }
            ExitCode::FAILURE
        }
    }
}
