// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `nes-execution`'s process entry point (spec.md §6, §8): parses and
//! validates CLI arguments through `nes-execution-bootstrap`, initializes
//! logging, loads the layered [`nes_execution::infrastructure::EngineConfig`],
//! and either runs one of the S1-S6 demonstration scenarios or starts the
//! query manager and blocks serving metrics until a shutdown signal
//! arrives.

use std::time::Duration;

use nes_execution_bootstrap::{bootstrap_cli, logger, shutdown::ShutdownCoordinator, ValidatedCommand};
use nes_execution_domain::value_objects::{QueryManagerMode, WorkerCount};
use nes_execution_domain::PipelineError;
use nes_execution::infrastructure::config::QueueModeKind;
use nes_execution::infrastructure::{load_config, EngineConfig};
use nes_execution::infrastructure::metrics;
use nes_execution::scheduler::QueryManager;
use tracing::info;

fn resolve_mode(config: &EngineConfig) -> QueryManagerMode {
    match config.query_manager_mode {
        QueueModeKind::Dynamic => QueryManagerMode::Dynamic,
        QueueModeKind::Static => {
            QueryManagerMode::Static { number_of_queues: config.number_of_queues, threads_per_queue: config.threads_per_queue }
        }
        QueueModeKind::NumaAware => QueryManagerMode::NumaAware { number_of_domains: config.number_of_queues },
    }
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let cli = bootstrap_cli()?;
    logger::init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    info!(?config, "engine configuration loaded");

    match cli.command {
        ValidatedCommand::Scenario { name, fixtures_dir, workers } => {
            nes_execution::demo::run(name, fixtures_dir, workers)?;
        }
        ValidatedCommand::Serve { workers } => {
            serve(config, workers).await?;
        }
    }
    Ok(())
}

async fn serve(config: EngineConfig, cli_workers: WorkerCount) -> Result<(), PipelineError> {
    // A config file/env override of `numberOfWorkerThreads` wins over the
    // CLI default; `cli_workers` only matters when the config left the
    // field at its hardware-concurrency default.
    let worker_count = if config.number_of_worker_threads == EngineConfig::default().number_of_worker_threads {
        cli_workers
    } else {
        WorkerCount::new(config.number_of_worker_threads)?
    };
    let mode = resolve_mode(&config);
    let scheduler = QueryManager::start(mode, worker_count)?;

    let engine_metrics = metrics::EngineMetrics::new()?;
    let metrics_addr = config.metrics_endpoint.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(engine_metrics, &metrics_addr).await {
            tracing::error!(error = %e, "metrics endpoint exited");
        }
    });

    let coordinator = ShutdownCoordinator::new(Duration::from_secs(config.termination_timeout_secs));
    let token = coordinator.token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        coordinator.initiate_shutdown();
    });

    info!(addr = %config.metrics_endpoint, "query manager serving, awaiting shutdown signal");
    token.cancelled().await;
    info!("shutdown signal received, stopping worker pool");
    scheduler.shutdown();
    Ok(())
}
