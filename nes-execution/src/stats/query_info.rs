// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-query statistics (spec.md §4.9) — the SLA and the aggregate of
//! throughput/latency across a query's pipelines that the adaptive
//! controller reads.
//!
//! Grounded on `TaskStatisticsProcessor.hpp` (`examples/original_source`,
//! SPEC_FULL.md §C): a query carries one `QueryInfo` aggregating every
//! pipeline's rolling statistics, consulted by
//! [`TuplePerTaskComputer`](super::tuple_per_task::TuplePerTaskComputer).
//! `current_throughput`/`current_latency_ms`/`next_tuples_per_task` share a
//! single `parking_lot::Mutex` so a recompute (read aggregate, scale, store)
//! is exactly-once per task (spec.md §4.9 "exactly-once SLA recomputation
//! per task") rather than split across a read and a write that a concurrent
//! recompute could interleave with.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Per-query service-level objective (spec.md §6 `adaptive.*`, §4.9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sla {
    pub min_throughput: f64,
    pub max_latency_ms: f64,
}

impl Sla {
    pub fn new(min_throughput: f64, max_latency_ms: f64) -> Self {
        Self { min_throughput, max_latency_ms }
    }
}

impl Default for Sla {
    fn default() -> Self {
        Self { min_throughput: 0.0, max_latency_ms: f64::INFINITY }
    }
}

struct Inner {
    current_throughput: f64,
    current_latency_ms: f64,
    next_tuples_per_task: u64,
}

/// Aggregated view of one query's pipelines, consumed by the adaptive batch
/// size controller (spec.md §4.9).
pub struct QueryInfo {
    sla: Sla,
    inner: Mutex<Inner>,
}

impl QueryInfo {
    pub fn new(sla: Sla, initial_tuples_per_task: u64) -> Self {
        Self {
            sla,
            inner: Mutex::new(Inner {
                current_throughput: 0.0,
                current_latency_ms: 0.0,
                next_tuples_per_task: initial_tuples_per_task.max(1),
            }),
        }
    }

    pub fn sla(&self) -> Sla {
        self.sla
    }

    /// Replaces the query-level aggregate with the min throughput / max
    /// latency just recomputed across the query's pipelines (spec.md §4.9
    /// step 2). Called by the statistics listener before the adaptive
    /// computer runs, holding the same lock the computer reads under so the
    /// two steps observe a consistent snapshot.
    pub fn update_aggregate(&self, current_throughput: f64, current_latency_ms: f64) {
        let mut inner = self.inner.lock();
        inner.current_throughput = current_throughput;
        inner.current_latency_ms = current_latency_ms;
    }

    pub fn current_throughput(&self) -> f64 {
        self.inner.lock().current_throughput
    }

    pub fn current_latency_ms(&self) -> f64 {
        self.inner.lock().current_latency_ms
    }

    pub fn next_tuples_per_task(&self) -> u64 {
        self.inner.lock().next_tuples_per_task
    }

    /// Locks the combined state for the adaptive computer's
    /// read-scale-write step (spec.md §4.9 "pipeline and query locks
    /// together in fixed order" — this is the query-level half of that
    /// order; `TuplePerTaskComputer` never also locks a `PipelineStatistics`
    /// while holding this one).
    pub(crate) fn with_locked<R>(&self, f: impl FnOnce(&Sla, f64, &mut u64) -> R) -> R {
        let mut inner = self.inner.lock();
        let (throughput, next_ref) = (inner.current_throughput, &mut inner.next_tuples_per_task);
        f(&self.sla, throughput, next_ref)
    }
}

/// Snapshot returned by the query-submission interface's `statistics(qepId)`
/// (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryStatistics {
    pub current_throughput: f64,
    pub current_latency_ms: f64,
    pub next_tuples_per_task: u64,
    pub meets_sla: bool,
}

impl QueryInfo {
    pub fn snapshot(&self) -> QueryStatistics {
        let inner = self.inner.lock();
        QueryStatistics {
            current_throughput: inner.current_throughput,
            current_latency_ms: inner.current_latency_ms,
            next_tuples_per_task: inner.next_tuples_per_task,
            meets_sla: inner.current_throughput >= self.sla.min_throughput
                && inner.current_latency_ms <= self.sla.max_latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_sla_compliance() {
        let info = QueryInfo::new(Sla::new(100.0, 50.0), 10);
        info.update_aggregate(50.0, 60.0);
        let snap = info.snapshot();
        assert!(!snap.meets_sla);

        info.update_aggregate(150.0, 10.0);
        assert!(info.snapshot().meets_sla);
    }
}
