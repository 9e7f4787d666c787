// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Adaptive batch-size controller (spec.md §4.9, §9 Open Questions, C9).
//!
//! Grounded on `ThroughputTuplePerTaskComputer.cpp`
//! (`examples/original_source`, SPEC_FULL.md §C): on every statistics
//! sample the computer scales `nextTuplesPerTask` up when the query misses
//! its minimum-throughput SLA and down otherwise, clamped to
//! `[min_batch, max_batch]`.

use super::query_info::QueryInfo;

/// Tunables for [`TuplePerTaskComputer`] (spec.md §6 `adaptive.*`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveConfig {
    /// Multiplier applied when throughput is below the SLA minimum.
    pub increase_factor: f64,
    /// Multiplier applied when the SLA is met.
    pub decrease_factor: f64,
    pub min_batch: u64,
    pub max_batch: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            increase_factor: 1.1,
            decrease_factor: 0.9,
            min_batch: 1,
            max_batch: 1_000_000,
        }
    }
}

/// Recomputes a query's `nextTuplesPerTask` from its current aggregated
/// throughput against its SLA.
pub struct TuplePerTaskComputer {
    config: AdaptiveConfig,
}

impl TuplePerTaskComputer {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self { config }
    }

    /// Scales `query.next_tuples_per_task` by `increase_factor` if the
    /// query's current throughput is below its SLA minimum, else by
    /// `decrease_factor`, clamped to `[min_batch, max_batch]`. Returns the
    /// new value. Runs entirely under `query`'s own lock (spec.md §4.9
    /// "exactly-once SLA recomputation per task").
    pub fn recompute(&self, query: &QueryInfo) -> u64 {
        query.with_locked(|sla, current_throughput, next| {
            let factor = if current_throughput < sla.min_throughput {
                self.config.increase_factor
            } else {
                self.config.decrease_factor
            };
            let scaled = (*next as f64 * factor).round();
            let clamped = if scaled.is_finite() {
                scaled.clamp(self.config.min_batch as f64, self.config.max_batch as f64) as u64
            } else {
                self.config.max_batch
            };
            *next = clamped;
            clamped
        })
    }
}

impl Default for TuplePerTaskComputer {
    fn default() -> Self {
        Self::new(AdaptiveConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::query_info::Sla;

    #[test]
    fn increases_batch_when_below_sla() {
        let query = QueryInfo::new(Sla::new(100.0, 1000.0), 10);
        query.update_aggregate(50.0, 1.0);
        let computer = TuplePerTaskComputer::default();
        let next = computer.recompute(&query);
        assert_eq!(next, 11); // round(10 * 1.1)
    }

    #[test]
    fn decreases_batch_when_sla_met() {
        let query = QueryInfo::new(Sla::new(100.0, 1000.0), 10);
        query.update_aggregate(150.0, 1.0);
        let computer = TuplePerTaskComputer::default();
        let next = computer.recompute(&query);
        assert_eq!(next, 9); // round(10 * 0.9)
    }

    #[test]
    fn never_drops_below_min_batch() {
        let query = QueryInfo::new(Sla::new(100.0, 1000.0), 1);
        query.update_aggregate(150.0, 1.0);
        let computer = TuplePerTaskComputer::new(AdaptiveConfig { min_batch: 1, ..Default::default() });
        let next = computer.recompute(&query);
        assert!(next >= 1);
    }

    #[test]
    fn never_exceeds_max_batch() {
        let query = QueryInfo::new(Sla::new(100.0, 1000.0), 999_999);
        query.update_aggregate(0.0, 1.0);
        let computer = TuplePerTaskComputer::default();
        let next = computer.recompute(&query);
        assert!(next <= 1_000_000);
    }

    #[test]
    fn monotonic_increase_while_below_sla() {
        let query = QueryInfo::new(Sla::new(100.0, 1000.0), 10);
        query.update_aggregate(0.0, 1.0);
        let computer = TuplePerTaskComputer::default();
        let mut prev = query.next_tuples_per_task();
        for _ in 0..5 {
            let next = computer.recompute(&query);
            assert!(next >= prev, "batch size must not decrease while SLA is missed");
            prev = next;
        }
    }
}
