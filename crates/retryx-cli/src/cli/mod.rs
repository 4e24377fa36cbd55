//! CLI for exercising the retryx executor.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use retryx_core::action::ActionKind;
use retryx_core::config::RetryxConfig;
use retryx_core::{config, logging};
use std::path::{Path, PathBuf};

use commands::{run_completions, run_contend, run_simulate, run_timeouts, Simulation};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "retryx")]
#[command(about = "retryx: retry executor with auto-trace retries and metrics", long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of ~/.config/retryx/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Show the resolved default timeout of every action kind.
    Timeouts,

    /// Run one simulated action through the retry helper and report metrics.
    Simulate {
        /// Action kind (e.g. change-update, index-query).
        #[arg(long, default_value = "change-update")]
        kind: ActionKind,
        /// Number of transient failures before the action succeeds.
        #[arg(long, default_value_t = 0, value_name = "N")]
        failures: u32,
        /// After the transient failures, fail with a non-retryable error instead of succeeding.
        #[arg(long)]
        fatal: bool,
        /// Retry a non-retryable failure once with tracing forced on.
        #[arg(long)]
        trace: bool,
        /// Caller label used in auto-retry metrics.
        #[arg(long)]
        caller: Option<String>,
        /// Time budget for the call in milliseconds (default: the kind's timeout).
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run concurrent writers against one in-memory ref and report lock-failure retries.
    Contend {
        /// Number of concurrent writers.
        #[arg(long, default_value_t = 4, value_name = "N")]
        writers: usize,
        /// Increments performed by each writer.
        #[arg(long, default_value_t = 10, value_name = "M")]
        updates: usize,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let target = logging::init_logging(cli.verbose);
        tracing::debug!("logging to {:?}", target);

        match cli.command {
            // No config needed; completions must work before one exists.
            CliCommand::Completions { shell } => run_completions(shell),
            CliCommand::Timeouts => run_timeouts(&load_config(cli.config.as_deref())?)?,
            CliCommand::Simulate {
                kind,
                failures,
                fatal,
                trace,
                caller,
                timeout_ms,
                json,
            } => {
                let cfg = load_config(cli.config.as_deref())?;
                let sim = Simulation {
                    kind,
                    failures,
                    fatal,
                    trace,
                    caller,
                    timeout_ms,
                };
                run_simulate(&cfg, sim, json).await?;
            }
            CliCommand::Contend {
                writers,
                updates,
                json,
            } => {
                let cfg = load_config(cli.config.as_deref())?;
                run_contend(&cfg, writers, updates, json).await?;
            }
        }

        Ok(())
    }
}

/// Load `--config PATH` if given, else the default file (created on first run).
fn load_config(path: Option<&Path>) -> Result<RetryxConfig> {
    let cfg = match path {
        Some(path) => config::load_from(path)?,
        None => config::load_or_init()?,
    };
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

#[cfg(test)]
mod tests;
