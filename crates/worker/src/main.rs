// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! axw: run unified jobs from a local state snapshot

mod commands;
mod exit_error;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ax_adapters::{ContainerRunner, ProcessRunner};
use ax_engine::{init_tracing, LogSettings, Settings};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::commands::run::RunArgs;
use crate::exit_error::{ExitError, EXIT_FATAL, EXIT_UNSUCCESSFUL};
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "axw", version, about = "Run automation jobs through the task engine")]
struct Cli {
    /// Settings file; defaults to `AX_CONFIG`, then built-in defaults
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `ax_engine=debug`
    #[arg(long, global = true)]
    log: Option<String>,

    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Text, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run jobs from a state snapshot
    Run(RunArgs),
    /// Print the effective settings
    Settings,
}

fn load_settings(config: Option<&PathBuf>) -> Result<Settings> {
    let settings = match config {
        Some(path) => {
            let mut settings = Settings::from_file(path)?;
            settings.apply_env();
            settings
        }
        None => Settings::load()?,
    };
    Ok(settings)
}

/// Cancel `shutdown` on the first ctrl-c.
fn watch_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("received shutdown signal");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
        }
    });
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_ref()).context("failed to load settings")?;

    match cli.command {
        Command::Settings => {
            print!("{}", commands::settings::render(&settings, cli.output)?);
            Ok(())
        }
        Command::Run(args) => {
            let shutdown = CancellationToken::new();
            watch_ctrl_c(shutdown.clone());
            let runner = Arc::new(ContainerRunner::new(ProcessRunner::new()));
            let outcomes = commands::run::run_jobs(settings, &args, runner, shutdown).await?;
            output::print_outcomes(&outcomes, cli.output)?;

            if outcomes.iter().any(|o| o.status.is_none()) {
                return Err(ExitError::new(EXIT_FATAL, "one or more jobs could not start").into());
            }
            if outcomes.len() < args.job_ids.len() || !outcomes.iter().all(|o| o.is_successful()) {
                return Err(ExitError::new(EXIT_UNSUCCESSFUL, "one or more jobs did not succeed").into());
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut log = LogSettings::from_env();
    if cli.log.is_some() {
        log.filter = cli.log.clone();
    }
    let guard = match init_tracing(&log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("axw: {e}");
            std::process::exit(EXIT_FATAL);
        }
    };

    if let Err(e) = run(cli).await {
        let code = e.downcast_ref::<ExitError>().map_or(EXIT_FATAL, |exit| exit.code);
        eprintln!("axw: {e:#}");
        drop(guard);
        std::process::exit(code);
    }
}
