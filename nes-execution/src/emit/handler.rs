// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Grounded on `EmitOperatorHandler.hpp` (`examples/original_source`,
//! SPEC_FULL.md §C): a pipeline's emit stage owns one of these per its
//! `HandlerIndex` slot. `folly::Synchronized<std::map<...>>` becomes a
//! single `parking_lot::Mutex` guarding a `BTreeMap` per map — same shape,
//! no folly dependency (spec.md's ambient stack has no counterpart for it;
//! `parking_lot` already covers every other lock in this engine).

use std::any::Any;
use std::collections::BTreeMap;

use nes_execution_domain::handlers::OperatorHandler;
use nes_execution_domain::value_objects::{ChunkNumber, OriginId, SequenceNumber};
use parking_lot::Mutex;

/// Identity of one logical sequence: the origin that produced it plus its
/// sequence number (spec.md §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNumberOriginId {
    pub sequence_number: SequenceNumber,
    pub origin_id: OriginId,
}

impl SeqNumberOriginId {
    pub fn new(sequence_number: SequenceNumber, origin_id: OriginId) -> Self {
        Self { sequence_number, origin_id }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SequenceState {
    last_chunk_number: Option<ChunkNumber>,
    seen_chunks: u64,
}

/// Per-pipeline chunk-ordering state for the emit operator (spec.md §4.5).
///
/// Two maps, one lock each role: `chunk_state` tracks how many chunks of a
/// sequence have been seen so far (and, once known, how many there will be
/// in total); `output_chunk_number` is a monotonically increasing counter
/// per sequence, handed out independent of which worker thread processes
/// which chunk first.
#[derive(Default)]
pub struct EmitOperatorHandler {
    chunk_state: Mutex<BTreeMap<SeqNumberOriginId, SequenceState>>,
    output_chunk_number: Mutex<BTreeMap<SeqNumberOriginId, u64>>,
}

impl EmitOperatorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next output chunk number for `key`, starting at 1
    /// (spec.md §4.5's `ChunkNumber::FIRST`).
    pub fn next_chunk_number(&self, key: SeqNumberOriginId) -> ChunkNumber {
        let mut map = self.output_chunk_number.lock();
        let next = map.entry(key).or_insert(0);
        *next += 1;
        ChunkNumber::new(*next)
    }

    /// Records that `chunk_number` of `key`'s sequence has been emitted and
    /// reports whether every chunk of that sequence has now been seen.
    /// `is_last_chunk` marks the highest chunk number this sequence will
    /// ever produce (the producing operator's own `lastChunk` flag,
    /// spec.md §3); once observed, this handler knows the sequence's total
    /// chunk count and can answer definitively from then on.
    pub fn is_last_chunk(&self, key: SeqNumberOriginId, chunk_number: ChunkNumber, is_last_chunk: bool) -> bool {
        let mut map = self.chunk_state.lock();
        let state = map.entry(key).or_default();
        state.seen_chunks += 1;
        if is_last_chunk {
            state.last_chunk_number = Some(chunk_number);
        }
        match state.last_chunk_number {
            Some(last) => state.seen_chunks >= last.get(),
            None => false,
        }
    }

    /// Drops a sequence's bookkeeping once it has fully drained (spec.md
    /// §4.5 `removeSequenceState`), called after `is_last_chunk` reports
    /// true so the maps don't grow unbounded over a long-running query.
    pub fn remove_sequence_state(&self, key: SeqNumberOriginId) {
        self.chunk_state.lock().remove(&key);
        self.output_chunk_number.lock().remove(&key);
    }
}

impl OperatorHandler for EmitOperatorHandler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
