// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! Bootstrap-layer CLI handling, security-first: `clap` does the parsing,
//! [`validate`] re-checks anything clap can't express as a type (worker
//! counts, fixture paths) before the engine ever sees it.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use nes_execution_domain::value_objects::WorkerCount;
use nes_execution_domain::PipelineError;

/// Top-level CLI, parsed by `nes-execution`'s `main.rs`.
#[derive(Parser, Debug, Clone)]
#[command(name = "nes-execution", about = "NebulaStream execution core runner", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML configuration file (layered under defaults and env
    /// vars per spec.md §6; see `nes_execution::infrastructure::config`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Runs one of the canonical end-to-end scenarios (spec.md §8, S1-S6)
    /// against the CSV fixtures under `--fixtures-dir`.
    Scenario {
        #[arg(value_enum)]
        name: ScenarioName,

        #[arg(long)]
        fixtures_dir: Option<PathBuf>,

        #[arg(long)]
        workers: Option<usize>,
    },
    /// Starts the query manager and blocks until a shutdown signal arrives.
    Serve {
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioName {
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
}

/// CLI arguments after security/range validation.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Scenario { name: ScenarioName, fixtures_dir: PathBuf, workers: WorkerCount },
    Serve { workers: WorkerCount },
}

pub fn parse_and_validate() -> Result<ValidatedCli, PipelineError> {
    validate(Cli::parse())
}

fn validate(cli: Cli) -> Result<ValidatedCli, PipelineError> {
    let command = match cli.command {
        Commands::Scenario { name, fixtures_dir, workers } => {
            let fixtures_dir = fixtures_dir.unwrap_or_else(|| PathBuf::from("demos/fixtures"));
            if fixtures_dir.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
                return Err(PipelineError::ValidationError(format!(
                    "fixtures-dir must not contain '..': {}",
                    fixtures_dir.display()
                )));
            }
            ValidatedCommand::Scenario { name, fixtures_dir, workers: resolve_workers(workers)? }
        }
        Commands::Serve { workers } => ValidatedCommand::Serve { workers: resolve_workers(workers)? },
    };

    if let Some(path) = &cli.config {
        if !path.exists() {
            return Err(PipelineError::ValidationError(format!("config file not found: {}", path.display())));
        }
    }

    Ok(ValidatedCli { command, config: cli.config, verbose: cli.verbose })
}

fn resolve_workers(requested: Option<usize>) -> Result<WorkerCount, PipelineError> {
    match requested {
        Some(n) => WorkerCount::new(n),
        None => Ok(WorkerCount::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_workers() {
        let cli = Cli {
            command: Commands::Serve { workers: Some(0) },
            config: None,
            verbose: false,
        };
        assert!(validate(cli).is_err());
    }

    #[test]
    fn rejects_fixtures_dir_with_parent_traversal() {
        let cli = Cli {
            command: Commands::Scenario {
                name: ScenarioName::S1,
                fixtures_dir: Some(PathBuf::from("../../etc")),
                workers: None,
            },
            config: None,
            verbose: false,
        };
        assert!(validate(cli).is_err());
    }

    #[test]
    fn defaults_workers_to_hardware_concurrency() {
        let cli = Cli {
            command: Commands::Serve { workers: None },
            config: None,
            verbose: false,
        };
        let validated = validate(cli).unwrap();
        match validated.command {
            ValidatedCommand::Serve { workers } => assert!(workers.get() >= 1),
            _ => panic!("expected Serve"),
        }
    }
}
