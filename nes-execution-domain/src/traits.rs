// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Capability traits the engine dispatches through (spec.md §9 "Inheritance
//! hierarchies"): a small fixed method set per role, object-safe so the
//! scheduler holds `Arc<dyn ...>` rather than a concrete generic per
//! pipeline/source/sink. No deep trait hierarchies: `PipelineStage`,
//! `Source`, and `Sink` each stand alone, matching the three call sites
//! (stage execution, source lifecycle, sink lifecycle) spec.md §6 names.
//!
//! `ExecutionContext` is itself a trait rather than a concrete struct so
//! this crate never names the engine's `BufferManager`/worker-pool types
//! (SPEC_FULL.md §A: the domain crate stays free of the engine's runtime
//! machinery). The engine crate provides the one real implementation
//! (`nes_execution::pipeline::PipelineExecutionContext`); stage code only
//! ever sees it through `&dyn ExecutionContext`.

use crate::buffers::TupleBuffer;
use crate::handlers::HandlerTable;
use crate::value_objects::{ContinuationPolicy, ExecutionResult, PipelineId, SuccessorRef};
use crate::PipelineError;

/// Everything a pipeline stage's `execute` needs from the worker running
/// it (spec.md §4.3, §6 `PipelineExecutionContext`).
pub trait ExecutionContext: Send + Sync {
    fn pipeline_id(&self) -> PipelineId;
    fn worker_id(&self) -> usize;
    fn worker_count(&self) -> usize;
    fn handlers(&self) -> &HandlerTable;

    /// Acquires a fresh output buffer from the worker's buffer provider
    /// (its fixed-size sub-pool, spec.md §4.2).
    fn allocate_buffer(&self) -> Result<TupleBuffer, PipelineError>;

    /// Hands a filled buffer back to the scheduler: re-enqueued into this
    /// same pipeline (`Repeat`) or forwarded to successors (`Emit`),
    /// spec.md §4.3.
    fn emit_buffer(&self, buffer: TupleBuffer, policy: ContinuationPolicy) -> Result<(), PipelineError>;

    fn successors(&self) -> &[SuccessorRef];
}

/// A compiled pipeline stage (spec.md §4.3, §6). The code generator
/// produces the concrete type; the engine only ever calls through this
/// trait.
///
/// Contract: `execute` must not block (spec.md §5 "Suspension points") and
/// is idempotent per buffer only when every handler it touches is
/// deterministic over the buffer's sequence identity — stateful operators
/// (windows, joins) are not, and must run exactly once per input buffer.
pub trait PipelineStage: Send + Sync {
    fn setup(&self, ctx: &dyn ExecutionContext) -> Result<(), PipelineError>;
    fn execute(&self, buffer: TupleBuffer, ctx: &dyn ExecutionContext) -> ExecutionResult;
    fn stop(&self, ctx: &dyn ExecutionContext) -> Result<(), PipelineError>;
}

/// Callback a source uses to hand a freshly produced buffer to the engine
/// (spec.md §6 "source plugin contract" `emitBuffer(buf)`).
pub trait BufferSink: Send + Sync {
    fn emit_buffer(&self, buffer: TupleBuffer) -> Result<(), PipelineError>;
}

/// Source plugin contract (spec.md §6, §4.8). Sequence numbering per
/// origin is the source's own responsibility; the engine only starts,
/// stops, and fails it.
pub trait Source: Send + Sync {
    fn start(&self, emit: std::sync::Arc<dyn BufferSink>) -> Result<(), PipelineError>;

    /// `graceful`: stop producing, emit one final buffer with
    /// `lastChunk = true`, then soft-EOS (§4.8). Non-graceful: propagate
    /// hard-EOS immediately without draining.
    fn stop(&self, graceful: bool) -> Result<(), PipelineError>;

    fn fail(&self, reason: PipelineError) -> Result<(), PipelineError>;

    fn operator_id(&self) -> crate::value_objects::OriginId;

    fn executable_successors(&self) -> Vec<SuccessorRef>;

    /// True for sources the scheduler starts/stops out of the leaf-source
    /// drain order (spec.md §4.4 start order, §4.8 "Network sources/sinks
    /// are treated specially").
    fn is_network(&self) -> bool {
        false
    }
}

/// Sink plugin contract (spec.md §6). Sinks consume buffers in arrival
/// order on their own queue, not in sequence order — no ordering
/// reconstruction happens at the sink.
pub trait Sink: Send + Sync {
    fn setup(&self) -> Result<(), PipelineError>;
    fn write_data(&self, buffer: TupleBuffer) -> Result<(), PipelineError>;
    fn shutdown(&self, graceful: bool) -> Result<(), PipelineError>;

    fn is_network(&self) -> bool {
        false
    }
}
