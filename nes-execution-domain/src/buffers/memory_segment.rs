// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Memory segment — a contiguous aligned byte region owned by a pool
//! (spec.md §3, §4.2). A segment is allocated once, at pool initialization,
//! and deallocated only when the pool itself is torn down; it is never
//! allocated or freed per-buffer. [`crate::buffers::tuple_buffer::TupleBuffer`]
//! hands out shared, refcounted views over a segment without touching its
//! lifetime.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::PipelineError;

/// A contiguous, page-aligned byte allocation.
///
/// Owns its memory outright (`Drop` deallocates it); nothing else may free
/// this memory. Pools keep segments alive in an `Arc<MemorySegment>` for the
/// whole of the pool's lifetime and only hand out *views* (via
/// [`TupleBuffer`](crate::buffers::tuple_buffer::TupleBuffer)) that come and
/// go.
pub struct MemorySegment {
    ptr: NonNull<u8>,
    capacity: usize,
    layout: Layout,
}

// SAFETY: `MemorySegment` owns its allocation outright and exposes it only
// through `&self`/raw-pointer accessors; no aliasing mutable access is ever
// handed out concurrently by this type itself (callers coordinate that, as
// the scan/emit operator contract requires exclusive access to a buffer's
// payload before it is shared downstream).
unsafe impl Send for MemorySegment {}
unsafe impl Sync for MemorySegment {}

impl MemorySegment {
    /// Allocates `capacity` bytes aligned to `alignment`.
    ///
    /// `alignment` must be a power of two no larger than the platform page
    /// size (spec.md §4.2 invariant); `capacity` must be non-zero.
    pub fn allocate(capacity: usize, alignment: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::invalid_config("memory segment capacity must be non-zero"));
        }
        if !alignment.is_power_of_two() {
            return Err(PipelineError::invalid_config(format!(
                "alignment {alignment} is not a power of two"
            )));
        }
        let page_size = page_size_hint();
        if alignment > page_size {
            return Err(PipelineError::invalid_config(format!(
                "alignment {alignment} exceeds page size {page_size}"
            )));
        }

        let layout = Layout::from_size_align(capacity, alignment)
            .map_err(|e| PipelineError::invalid_config(format!("invalid layout: {e}")))?;

        // SAFETY: layout has non-zero size (checked above).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| PipelineError::resource_exhausted("allocator returned null"))?;

        Ok(Self { ptr, capacity, layout })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Raw pointer to the start of the segment. Valid for `capacity()`
    /// bytes for the lifetime of this `MemorySegment`.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// # Safety
    /// Caller must ensure no other live reference observes overlapping
    /// bytes mutably at the same time; the scan/emit contract (spec.md
    /// §4.3) guarantees a buffer's payload has a single writer before it is
    /// shared downstream.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity)
    }

    /// # Safety
    /// See [`Self::as_slice`].
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity)
    }

    pub fn is_address_aligned_to(&self, alignment: usize) -> bool {
        (self.ptr.as_ptr() as usize) % alignment == 0
    }
}

impl Drop for MemorySegment {
    fn drop(&mut self) {
        // SAFETY: `self.layout` is the exact layout used in `allocate`, and
        // `self.ptr` was returned by `alloc_zeroed` with that layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

fn page_size_hint() -> usize {
    // No portable std API for this; 4 KiB covers every mainstream target
    // this engine runs on and keeps the domain crate free of a libc/page_size
    // dependency for a single constant.
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_aligned_memory() {
        let seg = MemorySegment::allocate(8192, 64).unwrap();
        assert_eq!(seg.capacity(), 8192);
        assert!(seg.is_address_aligned_to(64));
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        assert!(MemorySegment::allocate(8192, 100).is_err());
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(MemorySegment::allocate(0, 64).is_err());
    }

    #[test]
    fn rejects_alignment_above_page_size() {
        assert!(MemorySegment::allocate(8192, 1 << 20).is_err());
    }
}
