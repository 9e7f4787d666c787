// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Join operator handler and the two pipeline stages that feed it (spec.md
//! §4.7). A join has two build-side inputs; each gets its own compiled
//! `JoinPipelineStage` (`Side::Left`/`Side::Right`) wired to the same
//! `JoinOperatorHandler` slot, the same way a windowed join's two scan
//! pipelines share one hash table in the original engine.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use nes_execution_domain::buffers::TupleBuffer;
use nes_execution_domain::handlers::{HandlerIndex, OperatorHandler};
use nes_execution_domain::value_objects::{ContinuationPolicy, EqualityPredicate, ExecutionResult, JoinDescriptor};
use nes_execution_domain::{ExecutionContext, PipelineError, PipelineStage};

use crate::record::{self, FieldValue, Record};

pub use super::store::Side;
use super::store::JoinSliceStore;

/// Per-pipeline join state: the two-sided slice store plus one watermark
/// per input side. The join's effective watermark is the minimum of the
/// two — a slice cannot fire until both sides have confirmed no more data
/// will arrive for it (spec.md §4.7 "a join's watermark trails its slower
/// input").
pub struct JoinOperatorHandler {
    descriptor: JoinDescriptor,
    store: JoinSliceStore,
    left_watermark_ms: AtomicU64,
    right_watermark_ms: AtomicU64,
}

impl JoinOperatorHandler {
    pub fn new(descriptor: JoinDescriptor) -> Self {
        let store = JoinSliceStore::new(descriptor.window.clone());
        Self { descriptor, store, left_watermark_ms: AtomicU64::new(0), right_watermark_ms: AtomicU64::new(0) }
    }

    pub fn descriptor(&self) -> &JoinDescriptor {
        &self.descriptor
    }

    pub fn store(&self) -> &JoinSliceStore {
        &self.store
    }

    pub fn advance_watermark(&self, side: Side, candidate_ms: u64) {
        let counter = match side {
            Side::Left => &self.left_watermark_ms,
            Side::Right => &self.right_watermark_ms,
        };
        counter.fetch_max(candidate_ms, Ordering::AcqRel);
    }

    /// The combined join watermark both sides' lateness and firing
    /// decisions are measured against.
    pub fn watermark(&self) -> u64 {
        self.left_watermark_ms.load(Ordering::Acquire).min(self.right_watermark_ms.load(Ordering::Acquire))
    }
}

impl OperatorHandler for JoinOperatorHandler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One side's compiled pipeline stage (spec.md §6): folds input rows into
/// the shared join handler, then drains and emits whatever has fired.
pub struct JoinPipelineStage {
    handler_index: HandlerIndex,
    side: Side,
}

impl JoinPipelineStage {
    pub fn new(handler_index: HandlerIndex, side: Side) -> Self {
        Self { handler_index, side }
    }

    fn handler(&self, ctx: &dyn ExecutionContext) -> Result<std::sync::Arc<JoinOperatorHandler>, PipelineError> {
        ctx.handlers()
            .get::<JoinOperatorHandler>(self.handler_index)
            .ok_or_else(|| PipelineError::internal_error("join operator handler missing from handler table"))
    }
}

impl PipelineStage for JoinPipelineStage {
    fn setup(&self, _ctx: &dyn ExecutionContext) -> Result<(), PipelineError> {
        Ok(())
    }

    fn execute(&self, buffer: TupleBuffer, ctx: &dyn ExecutionContext) -> ExecutionResult {
        match self.execute_inner(buffer, ctx) {
            Ok(()) => ExecutionResult::Ok,
            Err(e) => ExecutionResult::Error(e),
        }
    }

    fn stop(&self, _ctx: &dyn ExecutionContext) -> Result<(), PipelineError> {
        Ok(())
    }
}

impl JoinPipelineStage {
    fn execute_inner(&self, buffer: TupleBuffer, ctx: &dyn ExecutionContext) -> Result<(), PipelineError> {
        let handler = self.handler(ctx)?;
        let descriptor = handler.descriptor();
        let timestamp_field = descriptor.window.timestamp_field.clone();
        let predicate = descriptor.predicate.clone();
        let strategy = descriptor.strategy;

        for row in record::read_records(&buffer)? {
            let Some(ts) = row.get(&timestamp_field).and_then(FieldValue::as_u64_timestamp) else {
                continue;
            };
            handler.advance_watermark(self.side, ts);
            handler.store().add(self.side, ts, row, handler.watermark());
        }

        let fired = handler.store().fire_ready(handler.watermark(), &predicate, strategy);
        if fired.is_empty() {
            return Ok(());
        }

        let out_records: Vec<Record> = fired
            .into_iter()
            .map(|w| {
                let mut record = Record::new();
                record.insert("start".to_string(), FieldValue::Int64(w.start_ms as i64));
                record.insert("end".to_string(), FieldValue::Int64(w.end_ms as i64));
                if let Some(key) = w.left.get(&predicate.left_field) {
                    record.insert("key".to_string(), key.clone());
                }
                record.extend(w.left);
                record.extend(w.right);
                record
            })
            .collect();

        let out = ctx.allocate_buffer()?;
        record::write_records(&out, &out_records)?;
        ctx.emit_buffer(out, ContinuationPolicy::Emit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::pool::{BufferManager, BufferManagerConfig};
    use crate::pipeline::context::{BufferSource, EmitSink, PipelineExecutionContext};
    use nes_execution_domain::handlers::HandlerTable;
    use nes_execution_domain::value_objects::{AggregationFunction, OriginId, PipelineId, SuccessorRef, TimeCharacteristic, WindowDescriptor, WindowKind};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct CollectingSink {
        buffers: Mutex<Vec<TupleBuffer>>,
    }

    impl EmitSink for CollectingSink {
        fn emit(
            &self,
            _pipeline_id: PipelineId,
            _successors: &[SuccessorRef],
            buffer: TupleBuffer,
            _policy: ContinuationPolicy,
        ) -> Result<(), PipelineError> {
            self.buffers.lock().push(buffer);
            Ok(())
        }
    }

    fn context(sink: Arc<CollectingSink>, handlers: HandlerTable) -> PipelineExecutionContext {
        let manager = BufferManager::new(BufferManagerConfig { buffer_size: 8192, number_of_buffers: 8, alignment: 64 }).unwrap();
        PipelineExecutionContext::new(
            PipelineId::new(),
            0,
            1,
            handlers,
            Vec::new(),
            BufferSource::Global(manager),
            OriginId::new(1),
            sink,
        )
    }

    #[test]
    fn joins_rows_from_both_sides_once_their_window_fires() {
        let window = WindowDescriptor::new(WindowKind::Tumbling { size_ms: 1000 }, TimeCharacteristic::EventTime, "ts", "amount", AggregationFunction::Sum);
        let descriptor = JoinDescriptor::new(window, EqualityPredicate::new("id", "order_id"), vec!["id".into()], vec!["order_id".into(), "amount".into()]);
        let index = HandlerIndex::new(0);
        let mut handlers = HandlerTable::new();
        handlers.insert(index, Arc::new(JoinOperatorHandler::new(descriptor)));

        let sink = Arc::new(CollectingSink { buffers: Mutex::new(Vec::new()) });
        let ctx = context(sink.clone(), handlers);

        let mut left_row = Record::new();
        left_row.insert("ts".into(), FieldValue::Int64(100));
        left_row.insert("id".into(), FieldValue::Int64(1));
        let left_buf = ctx.allocate_buffer().unwrap();
        record::write_records(&left_buf, &[left_row]).unwrap();

        let mut right_row = Record::new();
        right_row.insert("ts".into(), FieldValue::Int64(1200));
        right_row.insert("order_id".into(), FieldValue::Int64(1));
        right_row.insert("amount".into(), FieldValue::Float64(9.5));
        let right_buf = ctx.allocate_buffer().unwrap();
        record::write_records(&right_buf, &[right_row]).unwrap();

        let left_stage = JoinPipelineStage::new(index, Side::Left);
        let right_stage = JoinPipelineStage::new(index, Side::Right);

        assert!(left_stage.execute(left_buf, &ctx).is_ok());
        assert!(sink.buffers.lock().is_empty());
        assert!(right_stage.execute(right_buf, &ctx).is_ok());

        let emitted = sink.buffers.lock();
        assert_eq!(emitted.len(), 1);
        let out = record::read_records(&emitted[0]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("amount"), Some(&FieldValue::Float64(9.5)));
    }
}
