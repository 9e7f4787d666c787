// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Source lifecycle glue (spec.md §4.8, C8): the bridge between a
//! [`Source`] plugin — which owns its own sequence numbering and produces
//! buffers at its own pace — and the scheduler's task queues and
//! reconfiguration machinery. The engine never pulls from a source; it
//! only drives `start`/`stop`/`fail` and, once a source has stopped,
//! propagates end-of-stream downstream on its behalf.

use std::sync::Arc;

use nes_execution_domain::buffers::TupleBuffer;
use nes_execution_domain::value_objects::{OriginId, SuccessorRef};
use nes_execution_domain::{BufferSink, PipelineError, ReconfigurationMessage, Source};

use crate::scheduler::QueryManager;

pub mod csv_source;
pub use csv_source::CsvSource;

/// The `BufferSink` a source's `start` is handed: every produced buffer is
/// routed to the source's `executable_successors`, exactly like a
/// pipeline's `ContinuationPolicy::Emit` (spec.md §4.3), except there is no
/// pipeline here to re-enqueue into under `Repeat` — a source has nothing
/// upstream of itself.
struct SourceEmitSink {
    scheduler: Arc<QueryManager>,
    successors: Vec<SuccessorRef>,
}

impl BufferSink for SourceEmitSink {
    fn emit_buffer(&self, buffer: TupleBuffer) -> Result<(), PipelineError> {
        self.scheduler.route_to_successors(&self.successors, buffer)
    }
}

/// Owns one deployed [`Source`] and the scheduler handle it feeds.
pub struct SourceHandle {
    source: Arc<dyn Source>,
    scheduler: Arc<QueryManager>,
}

impl SourceHandle {
    pub fn new(source: Arc<dyn Source>, scheduler: Arc<QueryManager>) -> Self {
        Self { source, scheduler }
    }

    pub fn operator_id(&self) -> OriginId {
        self.source.operator_id()
    }

    /// Network sources/sinks are started/stopped out of the normal
    /// leaf-source order (spec.md §4.4 start order, §4.8).
    pub fn is_network(&self) -> bool {
        self.source.is_network()
    }

    /// Starts production. The returned emit sink fans every produced
    /// buffer out to `executable_successors` — the source drives its own
    /// pace and sequence numbering from here on.
    pub fn start(&self) -> Result<(), PipelineError> {
        let sink: Arc<dyn BufferSink> = Arc::new(SourceEmitSink {
            scheduler: self.scheduler.clone(),
            successors: self.source.executable_successors(),
        });
        self.source.start(sink)
    }

    /// Stops the source, then propagates end-of-stream to every successor
    /// pipeline: `graceful` expects the source's own `stop` to have
    /// already emitted a final `lastChunk = true` buffer before this
    /// returns; `!graceful` propagates without waiting on one (spec.md
    /// §4.8).
    pub fn stop(&self, graceful: bool) -> Result<(), PipelineError> {
        self.source.stop(graceful)?;
        let origin = self.source.operator_id();
        let message = if graceful {
            ReconfigurationMessage::SoftEndOfStream { origin }
        } else {
            ReconfigurationMessage::HardEndOfStream { origin }
        };
        for successor in self.source.executable_successors() {
            match successor {
                SuccessorRef::Pipeline(pipeline_id) => {
                    self.scheduler.reconfigure_blocking(pipeline_id, message.clone())?;
                }
                SuccessorRef::Sink(sink_id) => {
                    self.scheduler.shutdown_sink(sink_id, graceful)?;
                }
            }
        }
        Ok(())
    }

    pub fn fail(&self, reason: PipelineError) -> Result<(), PipelineError> {
        self.source.fail(reason)
    }
}
