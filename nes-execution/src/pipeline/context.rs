// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The engine's one concrete [`ExecutionContext`] implementation (spec.md
//! §6 `PipelineExecutionContext`). Built fresh by the scheduler for every
//! task: it borrows the pipeline's handler table, carries the worker's
//! buffer provider, and routes `emitBuffer` calls back through whatever the
//! scheduler registers as the [`EmitSink`] for that task.

use std::sync::Arc;

use nes_execution_domain::buffers::TupleBuffer;
use nes_execution_domain::handlers::HandlerTable;
use nes_execution_domain::value_objects::{ContinuationPolicy, OriginId, PipelineId, SuccessorRef};
use nes_execution_domain::{ExecutionContext, PipelineError};

use crate::buffers::{BufferManager, FixedSizeBufferPool};

/// Where a pipeline's output buffers come from (spec.md §4.2/§4.3): either
/// the global pool directly, or a fixed-size sub-pool reserved for this
/// pipeline/worker at deployment time.
#[derive(Clone)]
pub enum BufferSource {
    Global(BufferManager),
    SubPool(Arc<FixedSizeBufferPool>),
}

impl BufferSource {
    fn allocate(&self, origin_id: OriginId) -> Result<TupleBuffer, PipelineError> {
        match self {
            BufferSource::Global(manager) => Ok(manager.get_buffer_blocking(origin_id)),
            BufferSource::SubPool(pool) => pool.get_buffer_blocking(origin_id),
        }
    }
}

/// Where a filled output buffer goes once a stage hands it to `emitBuffer`
/// (spec.md §4.3): the scheduler is the only implementor, routing `Repeat`
/// back into this pipeline's own queue and `Emit` to its successors.
pub trait EmitSink: Send + Sync {
    fn emit(
        &self,
        pipeline_id: PipelineId,
        successors: &[SuccessorRef],
        buffer: TupleBuffer,
        policy: ContinuationPolicy,
    ) -> Result<(), PipelineError>;
}

/// Per-task execution context (spec.md §6). Cheap to build: `handlers` is a
/// shallow clone of `Arc`-backed slots, and everything else is either a
/// plain value or a reference-counted handle.
pub struct PipelineExecutionContext {
    pipeline_id: PipelineId,
    worker_id: usize,
    worker_count: usize,
    handlers: HandlerTable,
    successors: Vec<SuccessorRef>,
    buffers: BufferSource,
    origin_id: OriginId,
    sink: Arc<dyn EmitSink>,
}

impl PipelineExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline_id: PipelineId,
        worker_id: usize,
        worker_count: usize,
        handlers: HandlerTable,
        successors: Vec<SuccessorRef>,
        buffers: BufferSource,
        origin_id: OriginId,
        sink: Arc<dyn EmitSink>,
    ) -> Self {
        Self { pipeline_id, worker_id, worker_count, handlers, successors, buffers, origin_id, sink }
    }
}

impl ExecutionContext for PipelineExecutionContext {
    fn pipeline_id(&self) -> PipelineId {
        self.pipeline_id.clone()
    }

    fn worker_id(&self) -> usize {
        self.worker_id
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    fn allocate_buffer(&self) -> Result<TupleBuffer, PipelineError> {
        self.buffers.allocate(self.origin_id)
    }

    fn emit_buffer(&self, buffer: TupleBuffer, policy: ContinuationPolicy) -> Result<(), PipelineError> {
        self.sink.emit(self.pipeline_id.clone(), &self.successors, buffer, policy)
    }

    fn successors(&self) -> &[SuccessorRef] {
        &self.successors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::pool::BufferManagerConfig;
    use parking_lot::Mutex;

    struct RecordingSink {
        calls: Mutex<Vec<(PipelineId, ContinuationPolicy)>>,
    }

    impl EmitSink for RecordingSink {
        fn emit(
            &self,
            pipeline_id: PipelineId,
            _successors: &[SuccessorRef],
            _buffer: TupleBuffer,
            policy: ContinuationPolicy,
        ) -> Result<(), PipelineError> {
            self.calls.lock().push((pipeline_id, policy));
            Ok(())
        }
    }

    fn manager() -> BufferManager {
        BufferManager::new(BufferManagerConfig { buffer_size: 256, number_of_buffers: 4, alignment: 64 }).unwrap()
    }

    #[test]
    fn allocates_through_the_configured_buffer_source() {
        let pipeline_id = PipelineId::new();
        let sink = Arc::new(RecordingSink { calls: Mutex::new(Vec::new()) });
        let ctx = PipelineExecutionContext::new(
            pipeline_id.clone(),
            0,
            1,
            HandlerTable::new(),
            Vec::new(),
            BufferSource::Global(manager()),
            OriginId::new(1),
            sink.clone(),
        );

        let buf = ctx.allocate_buffer().unwrap();
        assert_eq!(buf.origin_id(), OriginId::new(1));
        assert_eq!(ctx.pipeline_id(), pipeline_id);
    }

    #[test]
    fn emit_buffer_routes_through_the_sink_with_the_right_policy() {
        let pipeline_id = PipelineId::new();
        let sink = Arc::new(RecordingSink { calls: Mutex::new(Vec::new()) });
        let ctx = PipelineExecutionContext::new(
            pipeline_id.clone(),
            0,
            1,
            HandlerTable::new(),
            Vec::new(),
            BufferSource::Global(manager()),
            OriginId::new(1),
            sink.clone(),
        );

        let buf = ctx.allocate_buffer().unwrap();
        ctx.emit_buffer(buf, ContinuationPolicy::Emit).unwrap();

        let calls = sink.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (pipeline_id, ContinuationPolicy::Emit));
    }
}
