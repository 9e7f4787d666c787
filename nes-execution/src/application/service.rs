// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The query submission interface (spec.md §6, §4.4 "Query lifecycle"):
//! `register`/`start`/`stop`/`fail`/`status`/`statistics`, the surface the
//! bootstrap CLI and any future RPC front end call into. Everything here
//! operates on whole QEPs; per-pipeline mechanics stay in
//! [`crate::scheduler::QueryManager`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{info, warn};

use nes_execution_domain::value_objects::QueryId;
use nes_execution_domain::{PipelineError, QepStatus, ReconfigurationMessage};

use crate::scheduler::QueryManager;

use super::qep::{Qep, QepSpec};

/// Default termination wait (spec.md §6 `termination.timeout`).
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// How often [`QueryExecutionService`] polls pipeline running-state while
/// waiting on a qep's termination future. Not part of the spec; an
/// implementation choice for how finely to sample the deadline.
const TERMINATION_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Owns every deployed [`Qep`] and drives its lifecycle transitions
/// against one shared [`QueryManager`] (spec.md §4.4: "one scheduler
/// object serves the whole process").
pub struct QueryExecutionService {
    scheduler: Arc<QueryManager>,
    termination_timeout: Duration,
    qeps: RwLock<HashMap<QueryId, Arc<Qep>>>,
}

impl QueryExecutionService {
    pub fn new(scheduler: Arc<QueryManager>) -> Self {
        Self::with_termination_timeout(scheduler, DEFAULT_TERMINATION_TIMEOUT)
    }

    pub fn with_termination_timeout(scheduler: Arc<QueryManager>, termination_timeout: Duration) -> Self {
        Self { scheduler, termination_timeout, qeps: RwLock::new(HashMap::new()) }
    }

    /// spec.md §4.4 `register(qep)`: records sources and sinks, creates
    /// per-query statistics. Task-queue assignment happened already, when
    /// each pipeline was registered with the scheduler.
    pub fn register(&self, spec: QepSpec) -> QueryId {
        for (sink_id, sink) in &spec.sinks {
            self.scheduler.register_sink(*sink_id, sink.clone());
        }
        let qep = Arc::new(Qep::new(spec));
        let id = qep.id();
        self.qeps.write().insert(id.clone(), qep);
        info!(%id, "qep registered");
        id
    }

    fn get(&self, qep_id: &QueryId) -> Result<Arc<Qep>, PipelineError> {
        self.qeps.read().get(qep_id).cloned().ok_or_else(|| PipelineError::internal_error(format!("unknown qep {qep_id}")))
    }

    /// spec.md §4.4 `start(qep)`: setup every pipeline, then bring up
    /// receivers before producers — network sinks, network sources,
    /// non-network sinks, non-network sources, in that fixed order.
    pub fn start(&self, qep_id: &QueryId) -> Result<(), PipelineError> {
        let qep = self.get(qep_id)?;

        for pipeline_id in qep.pipelines() {
            self.scheduler.reconfigure_blocking(pipeline_id.clone(), ReconfigurationMessage::Setup)?;
        }
        for pipeline_id in qep.pipelines() {
            self.scheduler.reconfigure_blocking(pipeline_id.clone(), ReconfigurationMessage::Start)?;
        }

        for sink in qep.sinks().iter().filter(|s| s.is_network()) {
            sink.setup().map_err(|e| PipelineError::CannotOpenSink(e.to_string()))?;
        }
        for source in qep.sources().iter().filter(|s| s.is_network()) {
            source.start().map_err(|e| PipelineError::CannotOpenSource(e.to_string()))?;
        }
        for sink in qep.sinks().iter().filter(|s| !s.is_network()) {
            sink.setup().map_err(|e| PipelineError::CannotOpenSink(e.to_string()))?;
        }
        for source in qep.sources().iter().filter(|s| !s.is_network()) {
            source.start().map_err(|e| PipelineError::CannotOpenSource(e.to_string()))?;
        }

        qep.set_status(QepStatus::Running);
        Ok(())
    }

    /// spec.md §4.4 `stop(qep, graceful)`: graceful stops only leaf
    /// (non-network) sources and lets soft-EOS propagate from there toward
    /// the sinks; non-graceful stops every source hard. Either way, waits
    /// up to `termination.timeout` for the qep's pipelines to finish
    /// draining, demoting the qep to `ErrorState` rather than panicking if
    /// the deadline passes (SPEC_FULL.md §D Open Question 2), then posts a
    /// `Destroy` reconfiguration to every pipeline and tears down every sink
    /// — mirroring what `fail` already does once a qep has drained.
    pub fn stop(&self, qep_id: &QueryId, graceful: bool) -> Result<(), PipelineError> {
        let qep = self.get(qep_id)?;

        let sources_to_stop: Vec<_> =
            if graceful { qep.sources().iter().filter(|s| !s.is_network()).collect() } else { qep.sources().iter().collect() };
        for source in sources_to_stop {
            source.stop(graceful)?;
        }

        self.wait_for_termination(&qep)?;

        for pipeline_id in qep.pipelines() {
            self.scheduler.reconfigure_blocking(pipeline_id.clone(), ReconfigurationMessage::Destroy)?;
        }
        for sink in qep.sinks() {
            sink.shutdown(graceful)?;
        }

        qep.set_status(QepStatus::Stopped);
        Ok(())
    }

    /// spec.md §4.4 `fail(qep)`: fails every source, waits on the same
    /// termination future `stop` does, then posts a destroy reconfiguration
    /// to every pipeline once the qep has drained.
    pub fn fail(&self, qep_id: &QueryId) -> Result<(), PipelineError> {
        let qep = self.get(qep_id)?;
        qep.set_status(QepStatus::ErrorState);

        for source in qep.sources() {
            if let Err(e) = source.fail(PipelineError::internal_error("qep failed")) {
                warn!(%qep_id, error = %e, "error failing source during qep fail");
            }
        }

        let termination = self.wait_for_termination(&qep);
        for pipeline_id in qep.pipelines() {
            self.scheduler.reconfigure_blocking(pipeline_id.clone(), ReconfigurationMessage::Destroy)?;
        }
        for sink in qep.sinks() {
            if let Err(e) = sink.shutdown(false) {
                warn!(%qep_id, error = %e, "error shutting down sink during qep fail");
            }
        }
        termination
    }

    pub fn status(&self, qep_id: &QueryId) -> Result<QepStatus, PipelineError> {
        Ok(self.get(qep_id)?.status())
    }

    pub fn statistics(&self, qep_id: &QueryId) -> Result<crate::stats::QueryStatistics, PipelineError> {
        Ok(self.get(qep_id)?.statistics())
    }

    /// Polls every pipeline's running flag until all have stopped or
    /// `termination_timeout` elapses (spec.md §4.4: "wait up to a fixed
    /// deadline on the qep's termination future; timeout is a fatal
    /// assertion" — resolved as `DeadlineExceeded` rather than a panic).
    fn wait_for_termination(&self, qep: &Qep) -> Result<(), PipelineError> {
        let deadline = Instant::now() + self.termination_timeout;
        loop {
            let all_stopped = qep
                .pipelines()
                .iter()
                .all(|id| self.scheduler.pipeline(id.clone()).map(|r| !r.pipeline.is_running()).unwrap_or(true));
            if all_stopped {
                return Ok(());
            }
            if Instant::now() >= deadline {
                qep.set_status(QepStatus::ErrorState);
                return Err(PipelineError::DeadlineExceeded(format!("qep {} did not terminate in time", qep.id())));
            }
            std::thread::sleep(TERMINATION_POLL_INTERVAL);
        }
    }
}
