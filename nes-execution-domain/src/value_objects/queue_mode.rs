// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Task queue operating modes (spec.md §4.4).

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// How worker threads are mapped onto task queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryManagerMode {
    /// One shared MPMC queue; all workers read queue 0.
    Dynamic,
    /// `numberOfQueues` queues; workers round-robin-assigned in blocks of
    /// `threadsPerQueue`.
    Static { number_of_queues: usize, threads_per_queue: usize },
    /// One queue per NUMA domain; each worker affinitized to a domain.
    NumaAware { number_of_domains: usize },
}

impl Default for QueryManagerMode {
    fn default() -> Self {
        QueryManagerMode::Dynamic
    }
}

impl QueryManagerMode {
    /// Number of distinct task queues this mode requires.
    pub fn queue_count(&self) -> usize {
        match self {
            QueryManagerMode::Dynamic => 1,
            QueryManagerMode::Static { number_of_queues, .. } => *number_of_queues,
            QueryManagerMode::NumaAware { number_of_domains } => *number_of_domains,
        }
    }

    /// Validates the invariant `numberOfQueues * threadsPerQueue ==
    /// numWorkers` required by Static mode (spec.md §4.4 table).
    pub fn validate(&self, num_workers: usize) -> Result<(), PipelineError> {
        match self {
            QueryManagerMode::Dynamic => Ok(()),
            QueryManagerMode::Static { number_of_queues, threads_per_queue } => {
                if number_of_queues * threads_per_queue != num_workers {
                    return Err(PipelineError::configuration_error(format!(
                        "static mode requires numberOfQueues * threadsPerQueue == numWorkers, \
                         got {number_of_queues} * {threads_per_queue} != {num_workers}"
                    )));
                }
                Ok(())
            }
            QueryManagerMode::NumaAware { number_of_domains } => {
                if *number_of_domains == 0 || *number_of_domains > num_workers {
                    return Err(PipelineError::configuration_error(
                        "numa-aware mode requires 1..=numWorkers domains",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Queue index that worker `worker_index` (0-based, out of
    /// `num_workers`) should read from.
    pub fn queue_for_worker(&self, worker_index: usize) -> usize {
        match self {
            QueryManagerMode::Dynamic => 0,
            QueryManagerMode::Static { threads_per_queue, .. } => {
                if *threads_per_queue == 0 {
                    0
                } else {
                    worker_index / threads_per_queue
                }
            }
            QueryManagerMode::NumaAware { number_of_domains } => worker_index % (*number_of_domains).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_mode_rejects_mismatched_worker_count() {
        let mode = QueryManagerMode::Static { number_of_queues: 2, threads_per_queue: 3 };
        assert!(mode.validate(6).is_ok());
        assert!(mode.validate(7).is_err());
    }

    #[test]
    fn static_mode_assigns_workers_in_blocks() {
        let mode = QueryManagerMode::Static { number_of_queues: 2, threads_per_queue: 3 };
        assert_eq!(mode.queue_for_worker(0), 0);
        assert_eq!(mode.queue_for_worker(2), 0);
        assert_eq!(mode.queue_for_worker(3), 1);
        assert_eq!(mode.queue_for_worker(5), 1);
    }
}
