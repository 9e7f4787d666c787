// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Unpooled arena (spec.md §4.2 `getUnpooledBuffer`) — variable-size
//! segments for payloads that overflow the fixed buffer size, e.g. a single
//! oversized tuple or a spilled child buffer. Unlike the fixed pool, these
//! segments are not pre-allocated; the arena grows on demand and recycles
//! individual segments back into its own free list rather than returning
//! memory to the allocator, trading peak memory for avoiding a
//! malloc/munmap churn under bursty oversized traffic.
//!
//! Grounded on `nes-memory/include/Runtime/BufferManager.hpp`'s unpooled
//! path (`examples/original_source`): requests are tracked with a rolling
//! average so that a segment freed by one caller is likely to be large
//! enough to satisfy the next, without growing unboundedly.

use std::sync::Arc;

use parking_lot::Mutex;

use nes_execution_domain::buffers::{MemorySegment, TupleBuffer};
use nes_execution_domain::value_objects::OriginId;
use nes_execution_domain::PipelineError;

const ALIGNMENT: usize = 64;

/// New unpooled allocations are sized to this multiple of the rolling
/// average request size, so a handful of same-ballpark requests in a row
/// converge on reusing each other's segments instead of each allocating
/// fresh.
const PREALLOC_FACTOR: f64 = 1.25;

struct Inner {
    free: Vec<Arc<MemorySegment>>,
    rolling_avg: f64,
}

/// Grows on demand; segments are recycled into an internal free list and
/// only actually deallocated when the arena itself (and every outstanding
/// buffer referencing one of its segments) drops.
pub struct UnpooledArena {
    inner: Arc<Mutex<Inner>>,
}

impl UnpooledArena {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner { free: Vec::new(), rolling_avg: 0.0 })) }
    }

    /// Hands back a segment with capacity at least `size` bytes, reusing a
    /// free segment if one is large enough, otherwise allocating a fresh
    /// one sized off the rolling average (spec.md §4.2).
    pub fn acquire(&self, origin_id: OriginId, size: usize) -> Result<TupleBuffer, PipelineError> {
        if size == 0 {
            return Err(PipelineError::invalid_config("unpooled buffer size must be non-zero"));
        }

        let segment = {
            let mut guard = self.inner.lock();
            guard.rolling_avg = if guard.rolling_avg == 0.0 {
                size as f64
            } else {
                guard.rolling_avg * 0.8 + size as f64 * 0.2
            };

            if let Some(pos) = guard.free.iter().position(|seg| seg.capacity() >= size) {
                Some(guard.free.swap_remove(pos))
            } else {
                None
            }
        };

        let segment = match segment {
            Some(segment) => segment,
            None => {
                let prealloc_size = ((self.inner.lock().rolling_avg * PREALLOC_FACTOR) as usize).max(size);
                Arc::new(MemorySegment::allocate(prealloc_size, ALIGNMENT)?)
            }
        };

        Ok(TupleBuffer::new(segment, origin_id, self.recycler()))
    }

    fn recycler(&self) -> nes_execution_domain::buffers::Recycler {
        let inner = self.inner.clone();
        Arc::new(move |segment: Arc<MemorySegment>| {
            inner.lock().free.push(segment);
        })
    }

    /// Number of segments currently idle in the arena's free list. Exposed
    /// for tests and diagnostics, not part of the acquisition contract.
    pub fn idle_segments(&self) -> usize {
        self.inner.lock().free.len()
    }
}

impl Default for UnpooledArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_at_least_requested_size() {
        let arena = UnpooledArena::new();
        let buf = arena.acquire(OriginId::new(1), 1024).unwrap();
        assert!(buf.fixed_buffer_size() >= 1024);
    }

    #[test]
    fn recycled_segment_is_reused_for_a_same_sized_request() {
        let arena = UnpooledArena::new();
        let buf = arena.acquire(OriginId::new(1), 1024).unwrap();
        assert_eq!(arena.idle_segments(), 0);
        drop(buf);
        assert_eq!(arena.idle_segments(), 1);

        let buf2 = arena.acquire(OriginId::new(1), 1024).unwrap();
        assert_eq!(arena.idle_segments(), 0);
        drop(buf2);
        assert_eq!(arena.idle_segments(), 1);
    }

    #[test]
    fn rejects_zero_sized_request() {
        let arena = UnpooledArena::new();
        assert!(arena.acquire(OriginId::new(1), 0).is_err());
    }

    #[test]
    fn oversized_free_segment_satisfies_a_smaller_request() {
        let arena = UnpooledArena::new();
        let big = arena.acquire(OriginId::new(1), 8192).unwrap();
        drop(big);
        assert_eq!(arena.idle_segments(), 1);

        let small = arena.acquire(OriginId::new(1), 512).unwrap();
        assert_eq!(arena.idle_segments(), 0);
        assert!(small.fixed_buffer_size() >= 8192);
    }
}
