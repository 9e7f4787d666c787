// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Spanning-tuple reassembly (spec.md §4.10, C10): a record whose bytes
//! straddle two or more buffers produced by the same origin is only
//! recognizable once every buffer it touches has arrived. Grounded on
//! `examples/original_source/nes-input-formatters/private/SequenceRingBuffer.hpp`.
//!
//! [`SequenceRingBuffer`] does the actual slot bookkeeping for one origin;
//! [`SpanningTupleIndexer`] is the per-query facade that owns one ring per
//! origin, created lazily the first time that origin's sequence numbers are
//! seen, mirroring how [`crate::windowing::handler::WindowOperatorHandler`]
//! keys its slice stores by the tuples flowing through it rather than by a
//! fixed, pre-registered set.

mod ring;
mod slot;

pub use ring::{split_on_delimiter, SequenceRingBuffer};
pub use slot::{SlotState, StateView};

use std::collections::HashMap;

use parking_lot::RwLock;

use nes_execution_domain::value_objects::OriginId;

/// Default ring capacity: a span crossing more buffers than this is reported
/// as [`nes_execution_domain::PipelineError::ResourceExhausted`] by the
/// caller rather than silently dropped — spec.md §4.10 leaves the limit
/// implementation-defined, and 64 in-flight buffers per origin is generous
/// for any source whose buffer size is sane relative to its record size.
pub const DEFAULT_RING_CAPACITY: usize = 64;

/// Owns one [`SequenceRingBuffer`] per origin, created on first use. A
/// single query may read from several sources concurrently, each with its
/// own independent sequence-number space (spec.md §6's `OriginId`), so
/// reassembly state must never be shared across origins.
pub struct SpanningTupleIndexer {
    ring_capacity: usize,
    rings: RwLock<HashMap<OriginId, SequenceRingBuffer>>,
}

impl SpanningTupleIndexer {
    pub fn new(ring_capacity: usize) -> Self {
        Self { ring_capacity, rings: RwLock::new(HashMap::new()) }
    }

    fn with_ring<T>(&self, origin: OriginId, f: impl FnOnce(&SequenceRingBuffer) -> T) -> T {
        if let Some(ring) = self.rings.read().get(&origin) {
            return f(ring);
        }
        let mut rings = self.rings.write();
        let ring = rings.entry(origin).or_insert_with(|| SequenceRingBuffer::new(self.ring_capacity));
        f(ring)
    }

    /// Stages one arriving buffer's framing fragments, splitting `payload`
    /// on `delimiter` first (spec.md §4.10 step 1).
    pub fn stage(&self, origin: OriginId, sequence: u64, payload: &[u8], delimiter: u8) {
        let (leading, trailing, has_delimiter) = split_on_delimiter(payload, delimiter);
        self.with_ring(origin, |ring| ring.stage(sequence, leading, trailing, has_delimiter));
    }

    /// Attempts to assemble the spanning tuple touching `sequence` for
    /// `origin`. Safe to call redundantly from every buffer along a span.
    pub fn try_assemble(&self, origin: OriginId, sequence: u64) -> Option<Vec<u8>> {
        self.with_ring(origin, |ring| ring.try_assemble(sequence))
    }
}

impl Default for SpanningTupleIndexer {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}
