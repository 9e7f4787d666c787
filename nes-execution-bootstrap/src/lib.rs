// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap module
//!
//! Process entry-point concerns for the execution core, kept outside the
//! domain/engine layers (SPEC_FULL.md §A): CLI argument parsing and
//! validation, `tracing` subscriber initialization, and graceful-shutdown
//! coordination for the query manager's worker pool.
//!
//! `nes-execution`'s `main.rs` is the only caller: it parses CLI args
//! through [`bootstrap_cli`], initializes logging via [`logger::init_tracing`],
//! builds an `EngineConfig`/`QueryManager` from the validated arguments, and
//! uses [`shutdown::ShutdownCoordinator`] to drive a graceful `stop` on
//! Ctrl-C.

pub mod cli;
pub mod logger;
pub mod shutdown;

pub use cli::{parse_and_validate, Cli, Commands, ScenarioName, ValidatedCli, ValidatedCommand};

/// Parses and validates CLI arguments. The main entry point for the
/// bootstrap layer.
pub fn bootstrap_cli() -> Result<ValidatedCli, nes_execution_domain::PipelineError> {
    cli::parse_and_validate()
}
