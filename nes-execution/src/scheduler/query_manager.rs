// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The query manager (spec.md §4.4, C4): owns the worker pool, the shared
//! data queues `QueryManagerMode` carves up, and the registry of deployed
//! pipelines and sinks. Grounded on `nes-core/src/Runtime/QueryManager.cpp`'s
//! shape — one scheduler object owning the thread pool and dispatching
//! `Task`s to it — generalized to the `crossbeam`/`parking_lot` primitives
//! the rest of this crate already uses rather than the original's
//! condition-variable-per-queue C++ implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::Sender;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use nes_execution_domain::value_objects::{
    ContinuationPolicy, OriginId, PipelineId, QueryManagerMode, SinkId, SuccessorRef, WorkerCount,
};
use nes_execution_domain::{PipelineError, ReconfigurationMessage, Sink};

use nes_execution_domain::buffers::TupleBuffer;

use super::barrier::ReconfigurationBarrier;
use super::queue::DataQueue;
use super::task::{ControlEnvelope, Task, WorkerMessage};
use super::worker::Worker;
use crate::pipeline::{BufferSource, EmitSink, Pipeline};
use crate::stats::PipelineStatistics;

/// Everything a worker needs about a deployed pipeline to run a task
/// against it. Cheap to clone — every field is either `Copy` or
/// `Arc`/reference-counted — because [`SchedulerHandle::pipeline`] hands
/// one out fresh per task.
#[derive(Clone)]
pub struct PipelineRuntime {
    pub pipeline: Arc<Pipeline>,
    pub stats: Arc<PipelineStatistics>,
    pub buffers: BufferSource,
    pub origin_id: OriginId,
    queue_index: usize,
}

/// The subset of [`QueryManager`] a [`Worker`] needs: pipeline lookup,
/// worker-count for context construction, and reconfiguration propagation.
/// Split out as a trait (rather than handing `Worker` the concrete
/// `QueryManager`) so `scheduler::worker` doesn't need to know how
/// pipelines are registered or how queues are assigned.
pub trait SchedulerHandle: Send + Sync {
    fn pipeline(&self, pipeline_id: PipelineId) -> Option<PipelineRuntime>;
    fn worker_count(&self) -> usize;
    /// Called by a worker after it has handled an end-of-stream
    /// reconfiguration for `pipeline_id`: forwards the same message to
    /// every successor pipeline (spec.md §4.8 "propagate downstream").
    fn propagate_reconfiguration(&self, pipeline_id: PipelineId, message: ReconfigurationMessage);
    fn as_emit_sink(self: Arc<Self>) -> Arc<dyn EmitSink>;
}

struct Registry {
    pipelines: HashMap<PipelineId, PipelineRuntime>,
    sinks: HashMap<SinkId, Arc<dyn Sink>>,
}

/// Owns the worker pool and the shared data queues `mode` requires, plus
/// the registry of pipelines and sinks a running query deploys into them.
///
/// One `QueryManager` serves the whole process (spec.md §4.4): a query's
/// pipelines are registered into it, not the other way around, so multiple
/// concurrently running queries share one worker pool and one set of
/// queues.
pub struct QueryManager {
    mode: QueryManagerMode,
    worker_count: usize,
    queues: Vec<DataQueue>,
    worker_control: Mutex<Vec<Sender<WorkerMessage>>>,
    worker_handles: Mutex<Vec<thread::JoinHandle<()>>>,
    registry: RwLock<Registry>,
    next_queue: AtomicUsize,
}

impl QueryManager {
    /// Builds the worker pool and queues described by `mode`/`worker_count`
    /// and starts every worker thread. Returns an `Arc` because each
    /// worker holds a `Arc<dyn SchedulerHandle>` back-reference to it.
    pub fn start(mode: QueryManagerMode, worker_count: WorkerCount) -> Result<Arc<Self>, PipelineError> {
        mode.validate(worker_count.get())?;

        let queues: Vec<DataQueue> = (0..mode.queue_count()).map(|_| DataQueue::new()).collect();
        let manager = Arc::new(Self {
            mode,
            worker_count: worker_count.get(),
            queues,
            worker_control: Mutex::new(Vec::new()),
            worker_handles: Mutex::new(Vec::new()),
            registry: RwLock::new(Registry { pipelines: HashMap::new(), sinks: HashMap::new() }),
            next_queue: AtomicUsize::new(0),
        });
        manager.spawn_workers();
        Ok(manager)
    }

    fn spawn_workers(self: &Arc<Self>) {
        let mut control_senders = Vec::with_capacity(self.worker_count);
        let mut handles = Vec::with_capacity(self.worker_count);
        for index in 0..self.worker_count {
            let (control_tx, control_rx) = crossbeam::channel::unbounded();
            let queue_index = self.mode.queue_for_worker(index);
            let data_rx = self.queues[queue_index].receiver();
            let scheduler: Arc<dyn SchedulerHandle> = self.clone();
            let worker = Worker { index, data: data_rx, control: control_rx, scheduler };
            let handle = thread::Builder::new()
                .name(format!("nes-worker-{index}"))
                .spawn(move || worker.run())
                .expect("failed to spawn worker thread");
            control_senders.push(control_tx);
            handles.push(handle);
        }
        *self.worker_control.lock() = control_senders;
        *self.worker_handles.lock() = handles;
        info!(workers = self.worker_count, queues = self.queues.len(), "query manager worker pool started");
    }

    /// Registers a compiled pipeline, assigning it the next queue in
    /// round-robin order across `mode.queue_count()` slots.
    pub fn register_pipeline(
        &self,
        pipeline: Pipeline,
        buffers: BufferSource,
        origin_id: OriginId,
        stats_window: usize,
    ) -> PipelineId {
        let id = pipeline.id();
        let queue_index = self.next_queue.fetch_add(1, Ordering::Relaxed) % self.queues.len().max(1);
        let runtime = PipelineRuntime {
            pipeline: Arc::new(pipeline),
            stats: Arc::new(PipelineStatistics::new(stats_window)),
            buffers,
            origin_id,
            queue_index,
        };
        self.registry.write().pipelines.insert(id.clone(), runtime);
        id
    }

    pub fn register_sink(&self, sink_id: SinkId, sink: Arc<dyn Sink>) {
        self.registry.write().sinks.insert(sink_id, sink);
    }

    /// Pushes a data task onto the queue `pipeline_id` was assigned.
    pub fn submit_data(&self, pipeline_id: PipelineId, buffer: TupleBuffer) -> Result<(), PipelineError> {
        let Some(runtime) = self.pipeline(pipeline_id.clone()) else {
            return Err(PipelineError::internal_error(format!("submit_data: unknown pipeline {pipeline_id}")));
        };
        self.queues[runtime.queue_index].push(Task::Data { pipeline_id, buffer });
        Ok(())
    }

    /// Broadcasts `message` to every worker servicing `pipeline_id` and
    /// blocks the calling thread until all of them have observed it
    /// (spec.md §4.4 "reconfiguration" — `postWait()` on a blocking
    /// submission).
    pub fn reconfigure_blocking(&self, pipeline_id: PipelineId, message: ReconfigurationMessage) -> Result<(), PipelineError> {
        let barrier = self.broadcast(pipeline_id, message)?;
        barrier.wait_for_release();
        Ok(())
    }

    /// Same as `reconfigure_blocking`, but returns immediately after
    /// dispatching: used for propagating end-of-stream downstream from
    /// inside a worker's own control-message handler, where waiting on a
    /// barrier that worker itself might be a party of would deadlock.
    fn broadcast(&self, pipeline_id: PipelineId, message: ReconfigurationMessage) -> Result<Arc<ReconfigurationBarrier>, PipelineError> {
        let Some(runtime) = self.pipeline(pipeline_id.clone()) else {
            return Err(PipelineError::internal_error(format!("reconfigure: unknown pipeline {pipeline_id}")));
        };
        let workers = self.workers_for_queue(runtime.queue_index);
        let barrier = Arc::new(ReconfigurationBarrier::new(workers.len()));
        let control = self.worker_control.lock();
        for worker_index in workers {
            let envelope = ControlEnvelope { pipeline_id: pipeline_id.clone(), message: message.clone(), barrier: barrier.clone() };
            if control[worker_index].send(WorkerMessage::Control(envelope)).is_err() {
                warn!(worker = worker_index, "control channel closed, worker already shut down");
            }
        }
        Ok(barrier)
    }

    fn workers_for_queue(&self, queue_index: usize) -> Vec<usize> {
        (0..self.worker_count).filter(|&i| self.mode.queue_for_worker(i) == queue_index).collect()
    }

    /// Sends every worker its poison pill and joins the threads. Idempotent
    /// only in the sense that a second call finds empty handle/sender
    /// lists and does nothing.
    pub fn shutdown(&self) {
        for sender in self.worker_control.lock().iter() {
            let _ = sender.send(WorkerMessage::Shutdown);
        }
        for handle in self.worker_handles.lock().drain(..) {
            let _ = handle.join();
        }
        info!("query manager worker pool shut down");
    }

    /// Hands `buffer` to every successor in `successors`: forwarded as a
    /// data task for a pipeline successor, written directly for a sink
    /// successor. Shared by `EmitSink::emit`'s `Emit` arm and by the
    /// source-lifecycle glue (`nes_execution::source`), which has no
    /// pipeline of its own to address an `EmitSink` call through.
    pub fn route_to_successors(&self, successors: &[SuccessorRef], buffer: TupleBuffer) -> Result<(), PipelineError> {
        for successor in successors {
            match successor {
                SuccessorRef::Pipeline(next_id) => self.submit_data(next_id.clone(), buffer.clone())?,
                SuccessorRef::Sink(sink_id) => self.write_to_sink(*sink_id, buffer.clone())?,
            }
        }
        Ok(())
    }

    fn write_to_sink(&self, sink_id: SinkId, buffer: TupleBuffer) -> Result<(), PipelineError> {
        let sink = self.registry.read().sinks.get(&sink_id).cloned();
        match sink {
            Some(sink) => sink.write_data(buffer),
            None => Err(PipelineError::internal_error(format!("emit: unknown sink {sink_id}"))),
        }
    }

    /// Looks up `sink_id` and runs its end-of-stream teardown (spec.md §6
    /// "sink plugin contract" `shutdown(graceful)`). Used both by a source
    /// whose `executable_successors` names a sink directly, and by
    /// `propagate_reconfiguration` for a pipeline whose own successors name
    /// a sink with no further pipeline downstream (spec.md §4.8's
    /// `addEndOfStream` fans out to "each successor pipeline, and each
    /// successor sink").
    pub fn shutdown_sink(&self, sink_id: SinkId, graceful: bool) -> Result<(), PipelineError> {
        let sink = self.registry.read().sinks.get(&sink_id).cloned();
        match sink {
            Some(sink) => sink.shutdown(graceful),
            None => Err(PipelineError::internal_error(format!("shutdown: unknown sink {sink_id}"))),
        }
    }
}

impl SchedulerHandle for QueryManager {
    fn pipeline(&self, pipeline_id: PipelineId) -> Option<PipelineRuntime> {
        self.registry.read().pipelines.get(&pipeline_id).cloned()
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }

    fn propagate_reconfiguration(&self, pipeline_id: PipelineId, message: ReconfigurationMessage) {
        let Some(runtime) = self.pipeline(pipeline_id) else { return };
        for successor in runtime.pipeline.successors() {
            match successor {
                SuccessorRef::Pipeline(next_id) => {
                    if let Err(e) = self.broadcast(next_id.clone(), message.clone()) {
                        warn!(error = %e, "failed to propagate reconfiguration downstream");
                    }
                }
                SuccessorRef::Sink(sink_id) => {
                    if let Some(graceful) = message.is_graceful() {
                        if let Err(e) = self.shutdown_sink(*sink_id, graceful) {
                            warn!(error = %e, "failed to shut down sink during reconfiguration propagation");
                        }
                    }
                }
            }
        }
    }

    fn as_emit_sink(self: Arc<Self>) -> Arc<dyn EmitSink> {
        self
    }
}

impl EmitSink for QueryManager {
    fn emit(
        &self,
        pipeline_id: PipelineId,
        successors: &[SuccessorRef],
        buffer: TupleBuffer,
        policy: ContinuationPolicy,
    ) -> Result<(), PipelineError> {
        match policy {
            ContinuationPolicy::Repeat => self.submit_data(pipeline_id, buffer),
            ContinuationPolicy::Emit => self.route_to_successors(successors, buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::pool::BufferManagerConfig;
    use crate::buffers::BufferManager;
    use nes_execution_domain::handlers::HandlerTable;
    use nes_execution_domain::value_objects::ExecutionResult;
    use nes_execution_domain::{ExecutionContext, PipelineStage};
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::Duration;

    struct CountingStage {
        executed: Arc<StdAtomicUsize>,
    }

    impl PipelineStage for CountingStage {
        fn setup(&self, _ctx: &dyn ExecutionContext) -> Result<(), PipelineError> {
            Ok(())
        }
        fn execute(&self, _buffer: TupleBuffer, _ctx: &dyn ExecutionContext) -> ExecutionResult {
            self.executed.fetch_add(1, Ordering::SeqCst);
            ExecutionResult::Ok
        }
        fn stop(&self, _ctx: &dyn ExecutionContext) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn buffer_manager() -> BufferManager {
        BufferManager::new(BufferManagerConfig { buffer_size: 256, number_of_buffers: 8, alignment: 64 }).unwrap()
    }

    fn allocate(source: &BufferSource, origin_id: OriginId) -> TupleBuffer {
        match source {
            BufferSource::Global(manager) => manager.get_buffer_blocking(origin_id),
            BufferSource::SubPool(pool) => pool.get_buffer_blocking(origin_id).unwrap(),
        }
    }

    #[test]
    fn registers_and_runs_a_pipeline_end_to_end() {
        let manager = QueryManager::start(QueryManagerMode::Dynamic, WorkerCount::new(2).unwrap()).unwrap();
        let executed = Arc::new(StdAtomicUsize::new(0));
        let stage = Arc::new(CountingStage { executed: executed.clone() });
        let pipeline = Pipeline::new(PipelineId::new(), stage, Vec::new(), HandlerTable::new());
        let pipeline_id = manager.register_pipeline(pipeline, BufferSource::Global(buffer_manager()), OriginId::new(1), 16);

        manager.reconfigure_blocking(pipeline_id.clone(), ReconfigurationMessage::Setup).unwrap();
        manager.reconfigure_blocking(pipeline_id.clone(), ReconfigurationMessage::Start).unwrap();

        let runtime = manager.pipeline(pipeline_id.clone()).unwrap();
        let buf = allocate(&runtime.buffers, runtime.origin_id);
        manager.submit_data(pipeline_id, buf).unwrap();

        // Give the worker a moment to dequeue and execute.
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(executed.load(Ordering::SeqCst), 1);

        manager.shutdown();
    }

    struct RecordingSink {
        shutdown_calls: Mutex<Vec<bool>>,
    }

    impl Sink for RecordingSink {
        fn setup(&self) -> Result<(), PipelineError> {
            Ok(())
        }
        fn write_data(&self, _buffer: TupleBuffer) -> Result<(), PipelineError> {
            Ok(())
        }
        fn shutdown(&self, graceful: bool) -> Result<(), PipelineError> {
            self.shutdown_calls.lock().push(graceful);
            Ok(())
        }
    }

    #[test]
    fn soft_end_of_stream_shuts_down_a_pipelines_own_sink_successor() {
        let manager = QueryManager::start(QueryManagerMode::Dynamic, WorkerCount::new(1).unwrap()).unwrap();
        let executed = Arc::new(StdAtomicUsize::new(0));
        let stage = Arc::new(CountingStage { executed });
        let sink_id = SinkId::new(1);
        let pipeline = Pipeline::new(PipelineId::new(), stage, vec![SuccessorRef::Sink(sink_id)], HandlerTable::new());
        let pipeline_id = manager.register_pipeline(pipeline, BufferSource::Global(buffer_manager()), OriginId::new(2), 16);

        let sink = Arc::new(RecordingSink { shutdown_calls: Mutex::new(Vec::new()) });
        manager.register_sink(sink_id, sink.clone());

        manager.reconfigure_blocking(pipeline_id.clone(), ReconfigurationMessage::Setup).unwrap();
        manager.reconfigure_blocking(pipeline_id, ReconfigurationMessage::SoftEndOfStream { origin: OriginId::new(2) }).unwrap();

        assert_eq!(sink.shutdown_calls.lock().as_slice(), &[true]);
        manager.shutdown();
    }
}
