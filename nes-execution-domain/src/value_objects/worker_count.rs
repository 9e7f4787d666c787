// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Worker count value object — validated `numberOfWorkerThreads` (spec.md
//! §6) used to size the query manager's thread pool and, for `Static` mode,
//! to validate `numberOfQueues * threadsPerQueue == numWorkers` (§4.4).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::PipelineError;

/// A validated, non-zero worker thread count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerCount(usize);

impl WorkerCount {
    /// Hard ceiling to keep misconfiguration (e.g. a typo'd `0` that got
    /// clamped up, or a config file in the wrong units) from spawning an
    /// unreasonable number of OS threads.
    pub const MAX: usize = 4096;

    pub fn new(count: usize) -> Result<Self, PipelineError> {
        if count == 0 {
            return Err(PipelineError::invalid_config("worker count must be greater than zero"));
        }
        if count > Self::MAX {
            return Err(PipelineError::invalid_config(format!(
                "worker count {count} exceeds maximum of {}",
                Self::MAX
            )));
        }
        Ok(Self(count))
    }

    /// Defaults to the host's detected hardware concurrency (spec.md §6
    /// default for `numberOfWorkerThreads`).
    pub fn hardware_concurrency() -> Self {
        let count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self(count)
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::hardware_concurrency()
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} workers", self.0)
    }
}

impl TryFrom<usize> for WorkerCount {
    type Error = PipelineError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
