// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # NebulaStream Execution Core
//!
//! The runtime half of the execution engine: everything `nes-execution-domain`
//! declares as traits and value objects, this crate makes concrete. A
//! pipeline plan compiled elsewhere (query optimization, code generation) is
//! handed to this crate as a graph of [`nes_execution_domain::PipelineStage`]
//! trait objects plus operator handler state; this crate owns running it —
//! acquiring buffers, dispatching tasks to worker threads, driving windows
//! and joins to completion, and reassembling spanning tuples at source
//! boundaries.
//!
//! ## Layout
//!
//! - [`buffers`] — the buffer manager (global pool, fixed-size sub-pools,
//!   unpooled arena) tuple buffers are acquired from and recycled back to.
//! - [`pipeline`] — the concrete [`nes_execution_domain::ExecutionContext`]
//!   implementation and the runtime `Pipeline` a scheduler task executes.
//! - [`scheduler`] — task queues, the OS-thread worker pool, the
//!   reconfiguration barrier that carries setup/start/stop/destroy messages
//!   through a running query, and the [`scheduler::QueryManager`] that owns
//!   all three.
//! - [`record`] — structured field access over a tuple buffer's payload,
//!   shared by every stateful operator below.
//! - [`emit`] — chunk/sequence ordering state for pipelines that reassemble
//!   split output back into a single logical sequence.
//! - [`windowing`] — tumbling/sliding window slices and watermark-driven
//!   firing.
//! - [`join`] — windowed two-sided stream joins over the same slice scheme.
//! - [`source`] — the source lifecycle glue between a `Source` plugin and
//!   the scheduler's reconfiguration messages.
//! - [`reassembly`] — spanning-tuple reconstruction across buffer
//!   boundaries for formats whose records aren't buffer-aligned.
//! - [`stats`] — the rolling pipeline/query statistics and the adaptive
//!   `tuplesPerTask` controller they feed.
//! - [`application`] — the external query-lifecycle surface (register,
//!   start, stop, fail, status, statistics) the bootstrap CLI and any future
//!   RPC front end call into.
//! - [`infrastructure`] — configuration loading and the metrics endpoint.
//! - [`sink`] — sink plugins (file, console) a query's terminal pipelines
//!   write to.
//! - [`demo`] — scenario drivers for spec.md §8's S1-S6 end-to-end
//!   examples, wired into the `nes-execution scenario` CLI subcommand.

pub mod application;
pub mod buffers;
pub mod demo;
pub mod emit;
pub mod infrastructure;
pub mod join;
pub mod pipeline;
pub mod reassembly;
pub mod record;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod stats;
pub mod windowing;

pub use nes_execution_domain::{
    handlers::{HandlerIndex, HandlerTable, OperatorHandler},
    value_objects::*,
    BufferSink, ExecutionContext, PipelineError, PipelineStage, Sink, Source,
};
