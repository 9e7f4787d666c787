// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A query execution plan (spec.md §3 "QEP"): a deployed set of pipelines,
//! the sources that feed them, and the sinks they drain into, tracked as
//! one unit for `start`/`stop`/`fail`/`status`/`statistics` (spec.md §6).

use std::sync::Arc;

use parking_lot::Mutex;

use nes_execution_domain::value_objects::{PipelineId, QueryId, SinkId};
use nes_execution_domain::{QepStatus, Sink};

use crate::source::SourceHandle;
use crate::stats::{QueryInfo, QueryStatistics, Sla};

/// Everything `register` needs to deploy a new query: the pipelines and
/// sinks are expected to already be registered with the scheduler
/// (`QueryManager::register_pipeline`/`register_sink`) — a `QepSpec` just
/// groups the ids/handles the qep needs to drive lifecycle transitions
/// across.
pub struct QepSpec {
    pub pipelines: Vec<PipelineId>,
    pub sources: Vec<Arc<SourceHandle>>,
    pub sinks: Vec<(SinkId, Arc<dyn Sink>)>,
    pub sla: Sla,
    pub initial_tuples_per_task: u64,
}

/// One deployed query, tracked from `register` through a terminal status
/// (spec.md §6 `status(qepId)`).
pub struct Qep {
    id: QueryId,
    pipelines: Vec<PipelineId>,
    sources: Vec<Arc<SourceHandle>>,
    sinks: Vec<Arc<dyn Sink>>,
    status: Mutex<QepStatus>,
    info: Arc<QueryInfo>,
}

impl Qep {
    pub fn new(spec: QepSpec) -> Self {
        let sinks = spec.sinks.into_iter().map(|(_, sink)| sink).collect();
        Self {
            id: QueryId::new(),
            pipelines: spec.pipelines,
            sources: spec.sources,
            sinks,
            status: Mutex::new(QepStatus::Created),
            info: Arc::new(QueryInfo::new(spec.sla, spec.initial_tuples_per_task.max(1))),
        }
    }

    pub fn id(&self) -> QueryId {
        self.id.clone()
    }

    pub fn pipelines(&self) -> &[PipelineId] {
        &self.pipelines
    }

    pub fn sources(&self) -> &[Arc<SourceHandle>] {
        &self.sources
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }

    pub fn info(&self) -> &Arc<QueryInfo> {
        &self.info
    }

    pub fn status(&self) -> QepStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: QepStatus) {
        *self.status.lock() = status;
    }

    pub fn statistics(&self) -> QueryStatistics {
        self.info.snapshot()
    }
}
