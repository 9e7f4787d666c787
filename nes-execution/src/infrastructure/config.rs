// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Layered engine configuration (spec.md §6), following the teacher's
//! `infrastructure::config` module: defaults, overlaid by an optional TOML
//! file, overlaid by `NES_*`-prefixed environment variables. Recognizes
//! exactly the options spec.md §6 lists plus `metrics.endpoint` and
//! `logging.level` (SPEC_FULL.md §B).

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use nes_execution_domain::value_objects::JoinStrategy;
use nes_execution_domain::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashJoinConfig {
    pub partitions: usize,
    pub page_size: usize,
    pub pre_alloc_pages: usize,
    pub max_table_size: usize,
}

impl Default for HashJoinConfig {
    fn default() -> Self {
        Self { partitions: 16, page_size: 4096, pre_alloc_pages: 4, max_table_size: 1 << 20 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveConfig {
    pub window_size: usize,
    pub increase_factor: f64,
    pub decrease_factor: f64,
    pub min_batch: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self { window_size: 10, increase_factor: 1.1, decrease_factor: 0.9, min_batch: 1 }
    }
}

/// Raw queue-manager-mode shape as it appears in configuration sources
/// (strings/numbers); resolved into `QueryManagerMode` once `numberOfQueues`
/// / `threadsPerQueue` are known (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueModeKind {
    Dynamic,
    Static,
    NumaAware,
}

impl Default for QueueModeKind {
    fn default() -> Self {
        QueueModeKind::Dynamic
    }
}

/// Validated, fully-resolved engine configuration (spec.md §6). Produced
/// only by [`load`]/[`EngineConfig::from_config`], never constructed
/// field-by-field outside tests, so every value on it has already passed
/// validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub number_of_worker_threads: usize,
    pub query_manager_mode: QueueModeKind,
    pub number_of_queues: usize,
    pub threads_per_queue: usize,
    pub buffer_size: usize,
    pub number_of_buffers: usize,
    pub alignment: usize,
    pub join_strategy: JoinStrategy,
    pub hash_join: HashJoinConfig,
    pub termination_timeout_secs: u64,
    pub adaptive: AdaptiveConfig,
    pub metrics_endpoint: String,
    pub logging_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            number_of_worker_threads: workers,
            query_manager_mode: QueueModeKind::Dynamic,
            number_of_queues: 1,
            threads_per_queue: workers,
            buffer_size: 8192,
            number_of_buffers: 1024,
            alignment: 64,
            join_strategy: JoinStrategy::NestedLoop,
            hash_join: HashJoinConfig::default(),
            termination_timeout_secs: 10 * 60,
            adaptive: AdaptiveConfig::default(),
            metrics_endpoint: "127.0.0.1:9898".to_string(),
            logging_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    fn validate(self) -> Result<Self, PipelineError> {
        if self.number_of_worker_threads == 0 {
            return Err(PipelineError::configuration_error("numberOfWorkerThreads must be >= 1"));
        }
        if !self.alignment.is_power_of_two() {
            return Err(PipelineError::configuration_error(format!("alignment must be a power of two, got {}", self.alignment)));
        }
        if self.query_manager_mode == QueueModeKind::Static
            && self.number_of_queues * self.threads_per_queue != self.number_of_worker_threads
        {
            return Err(PipelineError::configuration_error(
                "static mode requires numberOfQueues * threadsPerQueue == numberOfWorkerThreads",
            ));
        }
        Ok(self)
    }
}

/// Builds an [`EngineConfig`] by layering defaults, an optional TOML file,
/// and `NES_`-prefixed environment variables (e.g. `NES__BUFFER_SIZE`), in
/// that order of increasing precedence — mirroring the teacher's
/// `config_service` builder.
pub fn load(config_file: Option<&Path>) -> Result<EngineConfig, PipelineError> {
    // Keys are snake_case throughout (rather than spec.md §6's illustrative
    // camelCase) so they line up with how `config::Environment` folds
    // `NES__BUFFER_SIZE` into a key: lowercased, underscores kept as-is.
    let defaults = EngineConfig::default();
    let mut builder = Config::builder()
        .set_default("number_of_worker_threads", defaults.number_of_worker_threads as i64)
        .map_err(config_error)?
        .set_default("query_manager_mode", "dynamic")
        .map_err(config_error)?
        .set_default("number_of_queues", defaults.number_of_queues as i64)
        .map_err(config_error)?
        .set_default("threads_per_queue", defaults.threads_per_queue as i64)
        .map_err(config_error)?
        .set_default("buffer_size", defaults.buffer_size as i64)
        .map_err(config_error)?
        .set_default("number_of_buffers", defaults.number_of_buffers as i64)
        .map_err(config_error)?
        .set_default("alignment", defaults.alignment as i64)
        .map_err(config_error)?
        .set_default("join_strategy", "nested_loop")
        .map_err(config_error)?
        .set_default("termination_timeout_secs", defaults.termination_timeout_secs as i64)
        .map_err(config_error)?
        .set_default("metrics_endpoint", defaults.metrics_endpoint.clone())
        .map_err(config_error)?
        .set_default("logging_level", defaults.logging_level.clone())
        .map_err(config_error)?;

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path.to_path_buf()));
    }
    // A double-underscore separator, rather than a single one, keeps flat
    // keys like `buffer_size` intact: `config`'s `Environment` source uses
    // the separator both to strip the prefix and to turn remaining
    // occurrences into nested-path dots, so a single `_` would split
    // `NES__BUFFER_SIZE` into `buffer.size` instead of `buffer_size`.
    builder = builder.add_source(Environment::with_prefix("NES").separator("__"));

    let raw = builder.build().map_err(config_error)?;
    let join_strategy = match raw.get_string("join_strategy").map_err(config_error)?.as_str() {
        "hash" => JoinStrategy::Hash,
        _ => JoinStrategy::NestedLoop,
    };
    let query_manager_mode = match raw.get_string("query_manager_mode").map_err(config_error)?.as_str() {
        "static" => QueueModeKind::Static,
        "numa_aware" => QueueModeKind::NumaAware,
        _ => QueueModeKind::Dynamic,
    };

    let engine = EngineConfig {
        number_of_worker_threads: raw.get_int("number_of_worker_threads").map_err(config_error)? as usize,
        query_manager_mode,
        number_of_queues: raw.get_int("number_of_queues").map_err(config_error)? as usize,
        threads_per_queue: raw.get_int("threads_per_queue").map_err(config_error)? as usize,
        buffer_size: raw.get_int("buffer_size").map_err(config_error)? as usize,
        number_of_buffers: raw.get_int("number_of_buffers").map_err(config_error)? as usize,
        alignment: raw.get_int("alignment").map_err(config_error)? as usize,
        join_strategy,
        hash_join: HashJoinConfig::default(),
        termination_timeout_secs: raw.get_int("termination_timeout_secs").map_err(config_error)? as u64,
        adaptive: AdaptiveConfig::default(),
        metrics_endpoint: raw.get_string("metrics_endpoint").map_err(config_error)?,
        logging_level: raw.get_string("logging_level").map_err(config_error)?,
    };
    engine.validate()
}

fn config_error(err: config::ConfigError) -> PipelineError {
    PipelineError::configuration_error(err.to_string())
}
