// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tuple buffer — the zero-copy carrier tuples ride through the engine in
//! (spec.md §3, §4.1). A `TupleBuffer` is a cheap `Clone` handle
//! (`Arc`-backed) over a [`MemorySegment`]; the last clone to drop invokes
//! the segment's recycler, returning it to its owning pool (pooled) or the
//! unpooled arena.
//!
//! Metadata fields (`sequenceNumber`, `chunkNumber`, `watermark`, ...) use
//! atomics rather than requiring `&mut self`: a buffer is typically built by
//! one owner and then shared read-mostly downstream, but the scan/emit
//! operator contract (spec.md §4.3) does not forbid a pipeline stage from
//! stamping metadata on a buffer it has just cloned for re-emission (§4.5
//! chunk numbering happens exactly this way), so plain fields would force an
//! awkward unique-ownership dance for no real benefit.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::value_objects::origin_id::OriginId;
use crate::value_objects::sequence_number::{ChunkNumber, SequenceNumber};
use crate::PipelineError;

use super::memory_segment::MemorySegment;

/// Invoked exactly once, when the last `TupleBuffer` clone referencing a
/// segment is dropped. Implementations live in the engine crate (buffer
/// pool / unpooled arena); the domain crate only defines the contract.
pub type Recycler = Arc<dyn Fn(Arc<MemorySegment>) + Send + Sync>;

struct TupleBufferInner {
    segment: Arc<MemorySegment>,
    recycler: Option<Recycler>,

    origin_id: OriginId,
    creation_timestamp_us: u64,

    payload_size: AtomicUsize,
    number_of_tuples: AtomicUsize,
    sequence_number: AtomicU64,
    chunk_number: AtomicU64,
    last_chunk: AtomicBool,
    watermark_ms: AtomicU64,

    children: Mutex<Vec<TupleBuffer>>,
}

impl Drop for TupleBufferInner {
    fn drop(&mut self) {
        if let Some(recycler) = self.recycler.take() {
            recycler(self.segment.clone());
        }
    }
}

/// A reference-counted handle onto a pinned, aligned byte region plus its
/// per-buffer metadata (spec.md §3).
#[derive(Clone)]
pub struct TupleBuffer(Arc<TupleBufferInner>);

impl TupleBuffer {
    /// Wraps a pool-owned segment into a fresh buffer handle. `recycler` is
    /// called with the segment once every clone of the returned buffer has
    /// been dropped.
    pub fn new(segment: Arc<MemorySegment>, origin_id: OriginId, recycler: Recycler) -> Self {
        let now_us = now_micros();
        Self(Arc::new(TupleBufferInner {
            segment,
            recycler: Some(recycler),
            origin_id,
            creation_timestamp_us: now_us,
            payload_size: AtomicUsize::new(0),
            number_of_tuples: AtomicUsize::new(0),
            sequence_number: AtomicU64::new(0),
            chunk_number: AtomicU64::new(ChunkNumber::FIRST.get()),
            last_chunk: AtomicBool::new(false),
            watermark_ms: AtomicU64::new(0),
            children: Mutex::new(Vec::new()),
        }))
    }

    /// Fixed capacity of the backing segment (spec.md §4.1 `allocate`
    /// reserves at most this many bytes).
    pub fn fixed_buffer_size(&self) -> usize {
        self.0.segment.capacity()
    }

    /// Reserves `size` bytes of the backing segment as this buffer's
    /// logical payload. Never fails on an already-sized segment: the
    /// *source* of the buffer (the pool) is responsible for allocation
    /// failures (spec.md §4.1), so this only validates the request fits the
    /// segment it was already handed.
    pub fn allocate(&self, size: usize) -> Result<(), PipelineError> {
        if size > self.fixed_buffer_size() {
            return Err(PipelineError::invalid_config(format!(
                "payload size {size} exceeds fixed buffer size {}",
                self.fixed_buffer_size()
            )));
        }
        self.0.payload_size.store(size, Ordering::Release);
        Ok(())
    }

    pub fn payload_size(&self) -> usize {
        self.0.payload_size.load(Ordering::Acquire)
    }

    /// # Safety
    /// Caller must not read past `payload_size()` bytes and must not alias
    /// this with a concurrent mutable view of the same buffer.
    pub unsafe fn payload_ptr(&self) -> *const u8 {
        self.0.segment.as_ptr()
    }

    /// # Safety
    /// See [`Self::payload_ptr`]; additionally the caller must have
    /// exclusive access to the buffer's payload (spec.md §4.3: a pipeline
    /// stage's scan/emit operators do not execute concurrently against the
    /// same buffer).
    pub unsafe fn payload_mut_ptr(&self) -> *mut u8 {
        self.0.segment.as_ptr()
    }

    pub fn payload_slice(&self) -> &[u8] {
        // SAFETY: bounded to `payload_size()` <= segment capacity, checked
        // in `allocate`.
        unsafe { &self.0.segment.as_slice()[..self.payload_size()] }
    }

    #[allow(clippy::mut_from_ref)]
    pub fn payload_mut_slice(&self) -> &mut [u8] {
        // SAFETY: see `payload_mut_ptr`.
        unsafe { &mut self.0.segment.as_mut_slice()[..self.payload_size()] }
    }

    pub fn number_of_tuples(&self) -> usize {
        self.0.number_of_tuples.load(Ordering::Acquire)
    }

    pub fn set_number_of_tuples(&self, count: usize) {
        self.0.number_of_tuples.store(count, Ordering::Release);
    }

    pub fn origin_id(&self) -> OriginId {
        self.0.origin_id
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        SequenceNumber::new(self.0.sequence_number.load(Ordering::Acquire))
    }

    pub fn set_sequence_number(&self, seq: SequenceNumber) {
        self.0.sequence_number.store(seq.get(), Ordering::Release);
    }

    pub fn chunk_number(&self) -> ChunkNumber {
        ChunkNumber::new(self.0.chunk_number.load(Ordering::Acquire).max(1))
    }

    pub fn set_chunk_number(&self, chunk: ChunkNumber) {
        self.0.chunk_number.store(chunk.get(), Ordering::Release);
    }

    pub fn last_chunk(&self) -> bool {
        self.0.last_chunk.load(Ordering::Acquire)
    }

    pub fn set_last_chunk(&self, last: bool) {
        self.0.last_chunk.store(last, Ordering::Release);
    }

    /// Watermark timestamp in milliseconds; invariant `watermark <=
    /// max(tupleTimestamp)` for tuples in the buffer is the producing
    /// operator's responsibility (spec.md §3).
    pub fn watermark(&self) -> u64 {
        self.0.watermark_ms.load(Ordering::Acquire)
    }

    pub fn set_watermark(&self, watermark_ms: u64) {
        self.0.watermark_ms.store(watermark_ms, Ordering::Release);
    }

    pub fn creation_timestamp_us(&self) -> u64 {
        self.0.creation_timestamp_us
    }

    /// Appends a nested child buffer (for variable-length payloads that
    /// overflow a single segment) and returns its index.
    pub fn add_child_buffer(&self, child: TupleBuffer) -> usize {
        let mut children = self.0.children.lock().unwrap_or_else(|e| e.into_inner());
        children.push(child);
        children.len() - 1
    }

    pub fn child_buffer(&self, index: usize) -> Option<TupleBuffer> {
        let children = self.0.children.lock().unwrap_or_else(|e| e.into_inner());
        children.get(index).cloned()
    }

    pub fn child_buffer_count(&self) -> usize {
        self.0.children.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of live clones of this handle, including `self`. Used by
    /// pool-destruction assertions (spec.md §4.2 P1): a correctly
    /// implemented shutdown waits until every outstanding buffer reaches 1
    /// (i.e. only the pool's own bookkeeping, if any, holds it) before
    /// tearing down the segment it wraps.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

fn now_micros() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_buffer() -> (TupleBuffer, Arc<std::sync::atomic::AtomicUsize>) {
        let segment = Arc::new(MemorySegment::allocate(4096, 64).unwrap());
        let recycled = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let recycled_clone = recycled.clone();
        let recycler: Recycler = Arc::new(move |_seg| {
            recycled_clone.fetch_add(1, Ordering::SeqCst);
        });
        (TupleBuffer::new(segment, OriginId::new(1), recycler), recycled)
    }

    #[test]
    fn recycler_runs_exactly_once_when_last_clone_drops() {
        let (buf, recycled) = test_buffer();
        let clone = buf.clone();
        assert_eq!(buf.strong_count(), 2);
        drop(buf);
        assert_eq!(recycled.load(Ordering::SeqCst), 0);
        drop(clone);
        assert_eq!(recycled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn allocate_rejects_oversized_payload() {
        let (buf, _recycled) = test_buffer();
        assert!(buf.allocate(8192).is_err());
        assert!(buf.allocate(100).is_ok());
        assert_eq!(buf.payload_size(), 100);
    }

    #[test]
    fn child_buffers_are_indexed_in_insertion_order() {
        let (buf, _r) = test_buffer();
        let (child_a, _ra) = test_buffer();
        let (child_b, _rb) = test_buffer();
        assert_eq!(buf.add_child_buffer(child_a.clone()), 0);
        assert_eq!(buf.add_child_buffer(child_b.clone()), 1);
        assert_eq!(buf.child_buffer_count(), 2);
        assert!(buf.child_buffer(0).is_some());
    }

    #[test]
    fn metadata_setters_and_getters_round_trip() {
        let (buf, _r) = test_buffer();
        buf.set_sequence_number(SequenceNumber::new(7));
        buf.set_chunk_number(ChunkNumber::new(2));
        buf.set_last_chunk(true);
        buf.set_watermark(1234);
        buf.set_number_of_tuples(10);

        assert_eq!(buf.sequence_number(), SequenceNumber::new(7));
        assert_eq!(buf.chunk_number(), ChunkNumber::new(2));
        assert!(buf.last_chunk());
        assert_eq!(buf.watermark(), 1234);
        assert_eq!(buf.number_of_tuples(), 10);
    }
}
