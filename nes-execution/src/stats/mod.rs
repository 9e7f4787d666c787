// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Statistics & adaptive task sizing (spec.md §4.9, C9).
//!
//! Grounded on `PipelineStatistics.hpp`/`TaskStatisticsProcessor.hpp`/
//! `ThroughputTuplePerTaskComputer.cpp` (`examples/original_source`,
//! SPEC_FULL.md §C): a rolling per-pipeline window feeds a per-query SLA
//! aggregate, which an adaptive computer uses to scale the batch size every
//! source targets for its outgoing buffers.

pub mod pipeline_statistics;
pub mod query_info;
pub mod tuple_per_task;

pub use pipeline_statistics::{PipelineStatistics, TaskStatistics};
pub use query_info::{QueryInfo, QueryStatistics, Sla};
pub use tuple_per_task::TuplePerTaskComputer;
