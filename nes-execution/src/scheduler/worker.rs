// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The worker thread loop (spec.md §4.4, §5): plain `std::thread`, no
//! `tokio` runtime — a stage's `execute` must run to completion without
//! yielding, so there is nothing for an async executor to do here.
//!
//! Each worker owns two receivers: the queue it shares with its peers
//! (data tasks, routed by pipeline id) and a private single-consumer
//! mailbox the scheduler addresses it by directly. Routing a
//! reconfiguration through the private mailbox, instead of pushing N
//! copies onto the shared queue and hoping they land one-per-worker, is
//! what makes "every worker servicing this pipeline observes the message
//! exactly once" an actual guarantee rather than a race: nobody else can
//! ever drain a message out of a channel this worker alone holds the
//! receiving end of.

use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{select, Receiver};
use nes_execution_domain::value_objects::{ContinuationPolicy, PipelineId};
use nes_execution_domain::ReconfigurationMessage;
use tracing::{debug, error, warn};

use super::query_manager::{PipelineRuntime, SchedulerHandle};
use super::task::{Task, WorkerMessage};
use crate::pipeline::PipelineExecutionContext;
use crate::stats::pipeline_statistics::TaskStatistics;

pub struct Worker {
    pub index: usize,
    pub data: Receiver<Task>,
    pub control: Receiver<WorkerMessage>,
    pub scheduler: Arc<dyn SchedulerHandle>,
}

impl Worker {
    pub fn run(self) {
        debug!(worker = self.index, "worker starting");
        loop {
            select! {
                recv(self.control) -> msg => match msg {
                    Ok(WorkerMessage::Control(envelope)) => {
                        self.handle_control(envelope.pipeline_id, envelope.message);
                        envelope.barrier.arrive_and_wait();
                    }
                    Ok(WorkerMessage::Shutdown) | Err(_) => break,
                },
                recv(self.data) -> msg => match msg {
                    Ok(Task::Data { pipeline_id, buffer }) => self.handle_data(pipeline_id, buffer),
                    Err(_) => break,
                },
            }
        }
        debug!(worker = self.index, "worker stopped");
    }

    fn handle_control(&self, pipeline_id: PipelineId, message: ReconfigurationMessage) {
        let Some(runtime) = self.scheduler.pipeline(pipeline_id.clone()) else {
            warn!(?pipeline_id, "control message for unknown pipeline");
            return;
        };
        let ctx = self.context_for(&runtime);
        let result = match &message {
            ReconfigurationMessage::Setup => runtime.pipeline.stage().setup(&ctx),
            ReconfigurationMessage::Start => {
                runtime.pipeline.set_running(true);
                Ok(())
            }
            ReconfigurationMessage::Destroy => {
                runtime.pipeline.set_running(false);
                runtime.pipeline.stage().stop(&ctx)
            }
            ReconfigurationMessage::SoftEndOfStream { .. } | ReconfigurationMessage::HardEndOfStream { .. } => {
                // None of the stages this engine ships ever return
                // `Finished`/`AllFinished` on end-of-stream (windowing and
                // join handlers only ever return `Ok`/`Error`), so EOS must
                // flip `running` itself or `wait_for_termination`
                // (application::service) would poll until its deadline.
                runtime.pipeline.set_running(false);
                Ok(())
            }
        };
        if let Err(e) = result {
            error!(?pipeline_id, error = %e, "reconfiguration handler failed");
        }
        if message.is_end_of_stream() {
            self.scheduler.propagate_reconfiguration(pipeline_id, message);
        }
    }

    fn handle_data(&self, pipeline_id: PipelineId, buffer: nes_execution_domain::buffers::TupleBuffer) {
        let Some(runtime) = self.scheduler.pipeline(pipeline_id.clone()) else {
            warn!(?pipeline_id, "data task for unknown pipeline");
            return;
        };
        if !runtime.pipeline.is_running() {
            return;
        }
        let tuples = buffer.number_of_tuples() as u64;
        let started = Instant::now();
        let ctx = self.context_for(&runtime);
        let result = runtime.pipeline.stage().execute(buffer, &ctx);
        let elapsed = started.elapsed();
        let latency_ms = elapsed.as_secs_f64() * 1000.0;
        let throughput = if elapsed.as_secs_f64() > 0.0 { tuples as f64 / elapsed.as_secs_f64() } else { tuples as f64 };
        runtime.stats.record(TaskStatistics { throughput, latency_ms, tuples });

        match result {
            nes_execution_domain::value_objects::ExecutionResult::Ok => {}
            nes_execution_domain::value_objects::ExecutionResult::Finished => runtime.pipeline.set_running(false),
            nes_execution_domain::value_objects::ExecutionResult::Error(e) => {
                error!(?pipeline_id, error = %e, "pipeline stage execution failed");
                runtime.pipeline.set_running(false);
            }
            nes_execution_domain::value_objects::ExecutionResult::AllFinished => runtime.pipeline.set_running(false),
        }
    }

    fn context_for(&self, runtime: &PipelineRuntime) -> PipelineExecutionContext {
        PipelineExecutionContext::new(
            runtime.pipeline.id(),
            self.index,
            self.scheduler.worker_count(),
            runtime.pipeline.handlers().clone(),
            runtime.pipeline.successors().to_vec(),
            runtime.buffers.clone(),
            runtime.origin_id,
            self.scheduler.clone().as_emit_sink(),
        )
    }
}

/// Continuation policy routing the scheduler's `EmitSink` implements:
/// `Repeat` re-enqueues onto the same pipeline's queue, `Emit` forwards to
/// every successor (spec.md §4.3).
pub fn route_policy_name(policy: ContinuationPolicy) -> &'static str {
    match policy {
        ContinuationPolicy::Repeat => "repeat",
        ContinuationPolicy::Emit => "emit",
    }
}
