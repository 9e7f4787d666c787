// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Scenario drivers for spec.md §8's canonical end-to-end scenarios
//! (S1-S6), run by `nes-execution`'s `scenario` subcommand against the CSV
//! fixtures under `demos/fixtures/`. Each scenario wires a small, concrete
//! pipeline out of the same building blocks a real plan layer would
//! produce and drives it to completion through
//! [`crate::application::QueryExecutionService`], logging its output
//! through `tracing` rather than asserting against the spec's literal
//! expected-output tables, since this binary is a demonstration harness,
//! not the property checker spec.md §8 describes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nes_execution_domain::handlers::{HandlerIndex, HandlerTable};
use nes_execution_domain::value_objects::{
    AggregationFunction, EqualityPredicate, JoinDescriptor, OriginId, PipelineId, QueryManagerMode, SuccessorRef,
    TimeCharacteristic, WindowDescriptor, WindowKind, WorkerCount,
};
use nes_execution_domain::PipelineError;
use tracing::info;

use crate::application::{QepSpec, QueryExecutionService};
use crate::buffers::pool::BufferManagerConfig;
use crate::buffers::BufferManager;
use crate::join::{JoinOperatorHandler, JoinPipelineStage, Side};
use crate::pipeline::{BufferSource, Pipeline};
use crate::scheduler::QueryManager;
use crate::sink::{shared_file_sink, ConsoleSink, FileSink};
use crate::source::{CsvSource, SourceHandle};
use crate::stats::Sla;
use crate::windowing::WindowOperatorHandler;
use nes_execution_bootstrap::ScenarioName;

const DEFAULT_ROWS_PER_BUFFER: usize = 8;

fn sink_id() -> nes_execution_domain::value_objects::SinkId {
    nes_execution_domain::value_objects::SinkId::new(1)
}

fn buffer_manager() -> Result<BufferManager, PipelineError> {
    BufferManager::new(BufferManagerConfig { buffer_size: 64 * 1024, number_of_buffers: 64, alignment: 64 })
}

fn window_pipeline(
    scheduler: &Arc<QueryManager>,
    origin: OriginId,
    descriptor: WindowDescriptor,
    successors: Vec<SuccessorRef>,
) -> Result<PipelineId, PipelineError> {
    let index = HandlerIndex::new(0);
    let mut handlers = HandlerTable::new();
    handlers.insert(index, Arc::new(WindowOperatorHandler::new(descriptor)));
    let stage = Arc::new(crate::windowing::handler::WindowPipelineStage::new(index));
    let pipeline = Pipeline::new(PipelineId::new(), stage, successors, handlers);
    Ok(scheduler.register_pipeline(pipeline, BufferSource::Global(buffer_manager()?), origin, 32))
}

fn run_tumbling_or_sliding(
    scheduler: Arc<QueryManager>,
    service: &QueryExecutionService,
    fixtures_dir: &Path,
    descriptor: WindowDescriptor,
    label: &str,
) -> Result<(), PipelineError> {
    let sink = Arc::new(ConsoleSink::new(label));
    let sink_origin = OriginId::new(1);
    let pipeline_id = window_pipeline(&scheduler, sink_origin, descriptor, vec![SuccessorRef::Sink(sink_id())])?;

    let source: Arc<dyn nes_execution_domain::Source> =
        Arc::new(CsvSource::new(fixtures_dir.join("window.csv"), sink_origin, vec![SuccessorRef::Pipeline(pipeline_id.clone())], DEFAULT_ROWS_PER_BUFFER));
    let handle = Arc::new(SourceHandle::new(source, scheduler.clone()));

    let spec = QepSpec {
        pipelines: vec![pipeline_id],
        sources: vec![handle],
        sinks: vec![(sink_id(), sink)],
        sla: Sla::default(),
        initial_tuples_per_task: DEFAULT_ROWS_PER_BUFFER as u64,
    };
    let qep_id = service.register(spec);
    service.start(&qep_id)?;
    service.stop(&qep_id, true)?;
    info!(scenario = label, "scenario complete");
    Ok(())
}

fn s1_keyed_tumbling_sum(scheduler: Arc<QueryManager>, service: &QueryExecutionService, fixtures_dir: &Path) -> Result<(), PipelineError> {
    let descriptor = WindowDescriptor::new(WindowKind::Tumbling { size_ms: 1000 }, TimeCharacteristic::EventTime, "ts", "value", AggregationFunction::Sum)
        .keyed_by("id");
    run_tumbling_or_sliding(scheduler, service, fixtures_dir, descriptor, "s1-tumbling-keyed-sum")
}

fn s2_sliding_sum(scheduler: Arc<QueryManager>, service: &QueryExecutionService, fixtures_dir: &Path) -> Result<(), PipelineError> {
    let descriptor = WindowDescriptor::new(
        WindowKind::Sliding { size_ms: 1000, slide_ms: 500 },
        TimeCharacteristic::EventTime,
        "ts",
        "value",
        AggregationFunction::Sum,
    );
    run_tumbling_or_sliding(scheduler, service, fixtures_dir, descriptor, "s2-sliding-sum")
}

fn s3_tumbling_hash_join(scheduler: Arc<QueryManager>, service: &QueryExecutionService, fixtures_dir: &Path) -> Result<(), PipelineError> {
    let window = WindowDescriptor::new(WindowKind::Tumbling { size_ms: 1000 }, TimeCharacteristic::EventTime, "ts", "win1", AggregationFunction::Sum);
    let descriptor = JoinDescriptor::new(
        window,
        EqualityPredicate::new("id1", "id2"),
        vec!["win1".to_string(), "id1".to_string(), "ts".to_string()],
        vec!["win2".to_string(), "id2".to_string(), "ts".to_string()],
    )
    .with_strategy(nes_execution_domain::value_objects::JoinStrategy::Hash);

    let index = HandlerIndex::new(0);
    let handler = Arc::new(JoinOperatorHandler::new(descriptor));

    let sink = Arc::new(ConsoleSink::new("s3-tumbling-hash-join"));
    let successors = vec![SuccessorRef::Sink(sink_id())];

    let left_origin = OriginId::new(1);
    let mut left_handlers = HandlerTable::new();
    left_handlers.insert(index, handler.clone());
    let left_stage = Arc::new(JoinPipelineStage::new(index, Side::Left));
    let left_pipeline = Pipeline::new(PipelineId::new(), left_stage, successors.clone(), left_handlers);
    let left_pipeline_id = scheduler.register_pipeline(left_pipeline, BufferSource::Global(buffer_manager()?), left_origin, 32);

    let right_origin = OriginId::new(2);
    let mut right_handlers = HandlerTable::new();
    right_handlers.insert(index, handler);
    let right_stage = Arc::new(JoinPipelineStage::new(index, Side::Right));
    let right_pipeline = Pipeline::new(PipelineId::new(), right_stage, successors, right_handlers);
    let right_pipeline_id = scheduler.register_pipeline(right_pipeline, BufferSource::Global(buffer_manager()?), right_origin, 32);

    let left_source: Arc<dyn nes_execution_domain::Source> = Arc::new(CsvSource::new(
        fixtures_dir.join("window.csv"),
        left_origin,
        vec![SuccessorRef::Pipeline(left_pipeline_id.clone())],
        DEFAULT_ROWS_PER_BUFFER,
    ));
    let right_source: Arc<dyn nes_execution_domain::Source> = Arc::new(CsvSource::new(
        fixtures_dir.join("window2.csv"),
        right_origin,
        vec![SuccessorRef::Pipeline(right_pipeline_id.clone())],
        DEFAULT_ROWS_PER_BUFFER,
    ));

    let spec = QepSpec {
        pipelines: vec![left_pipeline_id, right_pipeline_id],
        sources: vec![Arc::new(SourceHandle::new(left_source, scheduler.clone())), Arc::new(SourceHandle::new(right_source, scheduler.clone()))],
        sinks: vec![(sink_id(), sink)],
        sla: Sla::default(),
        initial_tuples_per_task: DEFAULT_ROWS_PER_BUFFER as u64,
    };
    let qep_id = service.register(spec);
    service.start(&qep_id)?;
    service.stop(&qep_id, true)?;
    info!("scenario complete");
    Ok(())
}

/// Builds a CSV fixture of `rows` identical `(value, id)` tuples at
/// `path`, used by S4 in place of a network source (spec.md §8: "two
/// sources produce 3 buffers each of 10 identical tuples").
fn write_union_fixture(path: &Path, rows: usize) -> Result<(), PipelineError> {
    let mut contents = String::from("value,id\n");
    for _ in 0..rows {
        contents.push_str("1,1\n");
    }
    std::fs::write(path, contents).map_err(|e| PipelineError::IoError(e.to_string()))
}

struct PassthroughStage;
impl nes_execution_domain::PipelineStage for PassthroughStage {
    fn setup(&self, _ctx: &dyn nes_execution_domain::ExecutionContext) -> Result<(), PipelineError> {
        Ok(())
    }
    fn execute(
        &self,
        buffer: nes_execution_domain::buffers::TupleBuffer,
        ctx: &dyn nes_execution_domain::ExecutionContext,
    ) -> nes_execution_domain::value_objects::ExecutionResult {
        match ctx.emit_buffer(buffer, nes_execution_domain::value_objects::ContinuationPolicy::Emit) {
            Ok(()) => nes_execution_domain::value_objects::ExecutionResult::Ok,
            Err(e) => nes_execution_domain::value_objects::ExecutionResult::Error(e),
        }
    }
    fn stop(&self, _ctx: &dyn nes_execution_domain::ExecutionContext) -> Result<(), PipelineError> {
        Ok(())
    }
}

fn s4_graceful_union_stop(scheduler: Arc<QueryManager>, service: &QueryExecutionService, fixtures_dir: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(fixtures_dir).map_err(|e| PipelineError::IoError(e.to_string()))?;
    let fixture_a = fixtures_dir.join("union_a.csv");
    let fixture_b = fixtures_dir.join("union_b.csv");
    write_union_fixture(&fixture_a, 30)?;
    write_union_fixture(&fixture_b, 30)?;

    let sink_path = fixtures_dir.join("union_output.jsonl");
    let sink: Arc<FileSink> = shared_file_sink(&sink_path);

    let origin_a = OriginId::new(1);
    let origin_b = OriginId::new(2);
    let pipeline = Pipeline::new(PipelineId::new(), Arc::new(PassthroughStage), vec![SuccessorRef::Sink(sink_id())], HandlerTable::new());
    let pipeline_id = scheduler.register_pipeline(pipeline, BufferSource::Global(buffer_manager()?), origin_a, 32);

    let source_a: Arc<dyn nes_execution_domain::Source> =
        Arc::new(CsvSource::new(&fixture_a, origin_a, vec![SuccessorRef::Pipeline(pipeline_id.clone())], 10));
    let source_b: Arc<dyn nes_execution_domain::Source> =
        Arc::new(CsvSource::new(&fixture_b, origin_b, vec![SuccessorRef::Pipeline(pipeline_id.clone())], 10));

    let spec = QepSpec {
        pipelines: vec![pipeline_id],
        sources: vec![Arc::new(SourceHandle::new(source_a, scheduler.clone())), Arc::new(SourceHandle::new(source_b, scheduler.clone()))],
        sinks: vec![(sink_id(), sink.clone())],
        sla: Sla::default(),
        initial_tuples_per_task: 10,
    };
    let qep_id = service.register(spec);
    service.start(&qep_id)?;
    // Let both sources finish producing before the graceful stop drains them.
    std::thread::sleep(Duration::from_millis(100));
    service.stop(&qep_id, true)?;

    info!(tuples_written = sink.tuples_written(), "s4 union sink drained (expected 60)");
    Ok(())
}

fn s5_reconfiguration_barrier(scheduler: Arc<QueryManager>) -> Result<(), PipelineError> {
    let pipeline = Pipeline::new(PipelineId::new(), Arc::new(PassthroughStage), Vec::new(), HandlerTable::new());
    let pipeline_id = scheduler.register_pipeline(pipeline, BufferSource::Global(buffer_manager()?), OriginId::new(1), 32);

    scheduler.reconfigure_blocking(pipeline_id.clone(), nes_execution_domain::ReconfigurationMessage::Setup)?;
    scheduler.reconfigure_blocking(pipeline_id.clone(), nes_execution_domain::ReconfigurationMessage::Start)?;
    scheduler.reconfigure_blocking(pipeline_id, nes_execution_domain::ReconfigurationMessage::Destroy)?;
    info!("s5 reconfiguration barrier released after every worker observed Destroy");
    Ok(())
}

fn s6_adaptive_batch_size() {
    use crate::stats::tuple_per_task::AdaptiveConfig;
    use crate::stats::{QueryInfo, TuplePerTaskComputer};

    let query = QueryInfo::new(Sla::new(10_000_000.0, 1000.0), 1);
    query.update_aggregate(5_000_000.0, 1.0);
    let computer = TuplePerTaskComputer::new(AdaptiveConfig::default());
    for _ in 0..10 {
        computer.recompute(&query);
    }
    info!(next_tuples_per_task = query.next_tuples_per_task(), "s6 adaptive batch size after 10 missed-SLA samples (expect >= 1.1^10)");
}

/// Entry point for `nes-execution scenario <name>` (spec.md §8).
pub fn run(name: ScenarioName, fixtures_dir: PathBuf, workers: WorkerCount) -> Result<(), PipelineError> {
    match name {
        ScenarioName::S5 => {
            let scheduler = QueryManager::start(QueryManagerMode::Dynamic, WorkerCount::new(8)?)?;
            let result = s5_reconfiguration_barrier(scheduler.clone());
            scheduler.shutdown();
            result
        }
        ScenarioName::S6 => {
            s6_adaptive_batch_size();
            Ok(())
        }
        other => {
            let scheduler = QueryManager::start(QueryManagerMode::Dynamic, workers)?;
            let service = QueryExecutionService::new(scheduler.clone());
            let result = match other {
                ScenarioName::S1 => s1_keyed_tumbling_sum(scheduler.clone(), &service, &fixtures_dir),
                ScenarioName::S2 => s2_sliding_sum(scheduler.clone(), &service, &fixtures_dir),
                ScenarioName::S3 => s3_tumbling_hash_join(scheduler.clone(), &service, &fixtures_dir),
                ScenarioName::S4 => s4_graceful_union_stop(scheduler.clone(), &service, &fixtures_dir),
                ScenarioName::S5 | ScenarioName::S6 => unreachable!("handled above"),
            };
            scheduler.shutdown();
            result
        }
    }
}
