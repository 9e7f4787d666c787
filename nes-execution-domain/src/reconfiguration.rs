// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Reconfiguration messages (GLOSSARY, spec.md §4.4, §4.8) — the control
//! envelopes dispatched through the same task queues as data, carrying a
//! barrier every worker servicing the subject pipeline must observe exactly
//! once. The barrier implementation itself (atomic countdown + condvar)
//! lives in the engine crate, next to the worker pool it synchronizes; this
//! type is only the envelope's payload.

use crate::value_objects::OriginId;

/// One control envelope a pipeline, source, or sink may receive.
///
/// Mirrors the closed operation set the original scheduler's `Task`
/// actually carries (`nes-query-engine/Task.hpp`: `Start`, `StopSource`,
/// `FailSource`, `StopPipeline`, `SetupPipeline`, in addition to plain
/// data `Task`s) rather than the flattened "setup/start/soft-EOS/hard-
/// EOS/destroy" list spec.md §3 names; `Setup`/`Start`/`Destroy` here are
/// that same set restricted to what pipelines (as opposed to sources) are
/// addressed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconfigurationMessage {
    /// Run the pipeline stage's `setup(ctx)`.
    Setup,
    /// Mark the pipeline as running; workers may now dequeue data tasks
    /// for it.
    Start,
    /// Graceful end-of-stream for `origin`: drain, then propagate
    /// downstream once every chunk of the origin's final sequence has been
    /// seen (§4.5).
    SoftEndOfStream { origin: OriginId },
    /// Immediate end-of-stream for `origin`: propagate without draining.
    HardEndOfStream { origin: OriginId },
    /// Run the pipeline stage's `stop(ctx)` and release its operator
    /// handlers.
    Destroy,
}

impl ReconfigurationMessage {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ReconfigurationMessage::SoftEndOfStream { .. } | ReconfigurationMessage::HardEndOfStream { .. })
    }

    pub fn origin(&self) -> Option<OriginId> {
        match self {
            ReconfigurationMessage::SoftEndOfStream { origin } | ReconfigurationMessage::HardEndOfStream { origin } => {
                Some(*origin)
            }
            _ => None,
        }
    }

    pub fn is_graceful(&self) -> Option<bool> {
        match self {
            ReconfigurationMessage::SoftEndOfStream { .. } => Some(true),
            ReconfigurationMessage::HardEndOfStream { .. } => Some(false),
            _ => None,
        }
    }
}
