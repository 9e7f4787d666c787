// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Window operator handler and pipeline stage (spec.md §4.6). The handler
//! is the long-lived per-pipeline state (slice store plus watermark); the
//! stage is the stateless `PipelineStage` the scheduler calls `execute` on
//! for every input buffer, looking the handler up by its `HandlerIndex`
//! slot (spec.md §9 "Dynamic reflection over operator handlers").

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use nes_execution_domain::buffers::TupleBuffer;
use nes_execution_domain::handlers::{HandlerIndex, OperatorHandler};
use nes_execution_domain::value_objects::{ContinuationPolicy, ExecutionResult, WindowDescriptor};
use nes_execution_domain::{ExecutionContext, PipelineError, PipelineStage};

use crate::record::{self, FieldValue, Record};

use super::store::SliceStore;

/// Per-pipeline window state: the slice store plus the watermark that
/// drives firing. `TimeCharacteristic::IngestionTime` advances the
/// watermark from wall-clock time at `execute`; `EventTime` advances it
/// from the maximum `timestamp_field` value observed so far.
pub struct WindowOperatorHandler {
    store: SliceStore,
    watermark_ms: AtomicU64,
}

impl WindowOperatorHandler {
    pub fn new(descriptor: WindowDescriptor) -> Self {
        Self { store: SliceStore::new(descriptor), watermark_ms: AtomicU64::new(0) }
    }

    pub fn store(&self) -> &SliceStore {
        &self.store
    }

    pub fn watermark(&self) -> u64 {
        self.watermark_ms.load(Ordering::Acquire)
    }

    /// Advances the watermark monotonically (spec.md §4.6 "the watermark
    /// never moves backward"); a candidate below the current watermark is
    /// simply ignored rather than rejected.
    pub fn advance_watermark(&self, candidate_ms: u64) {
        self.watermark_ms.fetch_max(candidate_ms, Ordering::AcqRel);
    }
}

impl OperatorHandler for WindowOperatorHandler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The compiled pipeline stage a window operator's code generation produces
/// (spec.md §6): reads input records, folds them into the handler's slice
/// store, advances the watermark, and emits every window that has now
/// fired.
pub struct WindowPipelineStage {
    handler_index: HandlerIndex,
}

impl WindowPipelineStage {
    pub fn new(handler_index: HandlerIndex) -> Self {
        Self { handler_index }
    }

    fn handler<'a>(&self, ctx: &'a dyn ExecutionContext) -> Result<std::sync::Arc<WindowOperatorHandler>, PipelineError> {
        ctx.handlers()
            .get::<WindowOperatorHandler>(self.handler_index)
            .ok_or_else(|| PipelineError::internal_error("window operator handler missing from handler table"))
    }
}

impl PipelineStage for WindowPipelineStage {
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

impl WindowPipelineStage {
    fn execute_inner(&self, buffer: TupleBuffer, ctx: &dyn ExecutionContext) -> Result<(), PipelineError> {
        let handler = self.handler(ctx)?;
        let descriptor = handler.store().descriptor().clone();
        let records = record::read_records(&buffer)?;

        for row in &records {
            let Some(ts) = row.get(&descriptor.timestamp_field).and_then(FieldValue::as_u64_timestamp) else {
                continue;
            };
            let Some(value) = row.get(&descriptor.value_field).and_then(FieldValue::as_f64) else {
                continue;
            };
            let key = match &descriptor.key_field {
                Some(field) => row.get(field).map(field_value_as_key),
                None => None,
            };
            handler.advance_watermark(ts);
            handler.store().record(ts, key, value, handler.watermark());
        }

        let fired = handler.store().fire_ready(handler.watermark());
        if fired.is_empty() {
            return Ok(());
        }

        let out_records: Vec<Record> = fired
            .into_iter()
            .map(|w| {
                let mut record = Record::new();
                record.insert("start".to_string(), FieldValue::Int64(w.start_ms as i64));
                record.insert("end".to_string(), FieldValue::Int64(w.end_ms as i64));
                if let Some(key) = w.key {
                    record.insert("key".to_string(), FieldValue::Text(key));
                }
                record.insert(descriptor.value_field.clone(), FieldValue::Float64(w.value));
                record
            })
            .collect();

        let out = ctx.allocate_buffer()?;
        record::write_records(&out, &out_records)?;
        ctx.emit_buffer(out, ContinuationPolicy::Emit)
    }
}

fn field_value_as_key(v: &FieldValue) -> String {
    match v {
        FieldValue::Int64(i) => i.to_string(),
        FieldValue::Float64(f) => f.to_string(),
        FieldValue::Text(s) => s.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::pool::{BufferManager, BufferManagerConfig};
    use crate::pipeline::context::{BufferSource, EmitSink, PipelineExecutionContext};
    use nes_execution_domain::handlers::HandlerTable;
    use nes_execution_domain::value_objects::{AggregationFunction, OriginId, PipelineId, SuccessorRef, TimeCharacteristic, WindowKind};
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

    fn input_buffer(ctx: &PipelineExecutionContext, rows: Vec<Record>) -> TupleBuffer {
        let buf = ctx.allocate_buffer().unwrap();
        record::write_records(&buf, &rows).unwrap();
        buf
    }

    #[test]
    fn fires_a_tumbling_window_once_enough_timestamps_have_been_seen() {
        let descriptor = WindowDescriptor::new(
            WindowKind::Tumbling { size_ms: 1000 },
            TimeCharacteristic::EventTime,
            "ts",
            "value",
            AggregationFunction::Sum,
        );
        let index = HandlerIndex::new(0);
        let mut handlers = HandlerTable::new();
        handlers.insert(index, Arc::new(WindowOperatorHandler::new(descriptor)));

        let sink = Arc::new(CollectingSink { buffers: Mutex::new(Vec::new()) });
        let ctx = context(sink.clone(), handlers);

        let mut row1 = Record::new();
        row1.insert("ts".into(), FieldValue::Int64(100));
        row1.insert("value".into(), FieldValue::Float64(1.0));
        let mut row2 = Record::new();
        row2.insert("ts".into(), FieldValue::Int64(1200));
        row2.insert("value".into(), FieldValue::Float64(2.0));

        let stage = WindowPipelineStage::new(index);
        let buf = input_buffer(&ctx, vec![row1, row2]);
        let result = stage.execute(buf, &ctx);
        assert!(result.is_ok());

        let emitted = sink.buffers.lock();
        assert_eq!(emitted.len(), 1);
        let out = record::read_records(&emitted[0]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("value"), Some(&FieldValue::Float64(1.0)));
    }
}
