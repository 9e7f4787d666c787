// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The two things a worker pulls off its queues (spec.md §4.4): a plain
//! data task, and the per-worker control envelope a reconfiguration
//! broadcasts.

use std::sync::Arc;

use nes_execution_domain::buffers::TupleBuffer;
use nes_execution_domain::value_objects::PipelineId;
use nes_execution_domain::ReconfigurationMessage;

use super::barrier::ReconfigurationBarrier;

/// One unit of work on a pipeline's shared data queue.
pub enum Task {
    /// Run the pipeline's stage against one input buffer.
    Data { pipeline_id: PipelineId, buffer: TupleBuffer },
}

/// Control-plane message delivered to exactly one worker's private mailbox
/// (see `worker` module docs for why a private channel, rather than N
/// copies on the shared data queue, is what makes "every worker observes
/// this exactly once" actually true under concurrent dequeuing).
pub struct ControlEnvelope {
    pub pipeline_id: PipelineId,
    pub message: ReconfigurationMessage,
    pub barrier: Arc<ReconfigurationBarrier>,
}

/// What a worker's private mailbox carries: either a control envelope, or
/// the poison signal that ends the worker loop (spec.md §4.4 "poison
/// task").
pub enum WorkerMessage {
    Control(ControlEnvelope),
    Shutdown,
}
