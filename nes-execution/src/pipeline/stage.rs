// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A deployed, runnable pipeline (spec.md §3 "Pipeline"): one compiled
//! [`PipelineStage`], its successor list, and the operator handler table the
//! code generator populated at deployment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nes_execution_domain::handlers::HandlerTable;
use nes_execution_domain::value_objects::{PipelineId, SuccessorRef};
use nes_execution_domain::PipelineStage;

/// A scan→op→emit chain plus the bookkeeping the query manager needs to
/// route tasks to it and tear it down.
pub struct Pipeline {
    id: PipelineId,
    stage: Arc<dyn PipelineStage>,
    successors: Vec<SuccessorRef>,
    handlers: HandlerTable,
    running: AtomicBool,
}

impl Pipeline {
    pub fn new(id: PipelineId, stage: Arc<dyn PipelineStage>, successors: Vec<SuccessorRef>, handlers: HandlerTable) -> Self {
        Self { id, stage, successors, handlers, running: AtomicBool::new(false) }
    }

    pub fn id(&self) -> PipelineId {
        self.id.clone()
    }

    pub fn stage(&self) -> &Arc<dyn PipelineStage> {
        &self.stage
    }

    pub fn successors(&self) -> &[SuccessorRef] {
        &self.successors
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}
