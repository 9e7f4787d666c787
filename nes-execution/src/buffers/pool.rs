// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The global buffer manager (spec.md §4.2, C2).
//!
//! Grounded on `nes-memory/include/Runtime/BufferManager.hpp`
//! (`examples/original_source`): a fixed-size pool of pre-allocated,
//! pinned segments plus an unpooled arena for oversized payloads. The free
//! list is a lock-free MPMC queue (`crossbeam::queue::ArrayQueue`, spec.md
//! §5 "lock-free MPMC for the free list"); blocking acquisition pairs it
//! with a `parking_lot::Mutex` + `Condvar` (§5 "plus a mutex + condition").
//!
//! Memory lifetime falls out of `Arc<MemorySegment>` strong-count semantics
//! rather than manual bookkeeping: a segment is only actually deallocated
//! when its last `Arc` clone drops, whether that clone is held by this
//! pool's free queue, a live `TupleBuffer`, or a `FixedSizeBufferPool`
//! sub-pool — so "does not deallocate while outstanding buffers exist"
//! (spec.md §4.2 invariant) is the default, not something this type has to
//! enforce.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};

use nes_execution_domain::buffers::{MemorySegment, TupleBuffer};
use nes_execution_domain::value_objects::OriginId;
use nes_execution_domain::PipelineError;

use super::sub_pool::FixedSizeBufferPool;
use super::unpooled::UnpooledArena;

/// `(bufferSize, numberOfBuffers, alignment)` — spec.md §4.2.
#[derive(Debug, Clone, Copy)]
pub struct BufferManagerConfig {
    pub buffer_size: usize,
    pub number_of_buffers: usize,
    pub alignment: usize,
}

impl Default for BufferManagerConfig {
    fn default() -> Self {
        Self { buffer_size: 8192, number_of_buffers: 1024, alignment: 64 }
    }
}

pub(super) struct Inner {
    buffer_size: usize,
    total_buffers: usize,
    free: ArrayQueue<Arc<MemorySegment>>,
    wait_lock: Mutex<()>,
    wait_cv: Condvar,
    in_use: AtomicUsize,
    unpooled: UnpooledArena,
}

/// A process-wide pool of pinned memory segments feeding zero-copy tuple
/// buffers to the engine (spec.md §4.2).
#[derive(Clone)]
pub struct BufferManager(Arc<Inner>);

impl BufferManager {
    pub fn new(config: BufferManagerConfig) -> Result<Self, PipelineError> {
        let free = ArrayQueue::new(config.number_of_buffers);
        for _ in 0..config.number_of_buffers {
            let segment = Arc::new(MemorySegment::allocate(config.buffer_size, config.alignment)?);
            // Capacity matches `number_of_buffers` exactly, so this never fails.
            let _ = free.push(segment);
        }

        Ok(Self(Arc::new(Inner {
            buffer_size: config.buffer_size,
            total_buffers: config.number_of_buffers,
            free,
            wait_lock: Mutex::new(()),
            wait_cv: Condvar::new(),
            in_use: AtomicUsize::new(0),
            unpooled: UnpooledArena::new(),
        })))
    }

    pub fn buffer_size(&self) -> usize {
        self.0.buffer_size
    }

    pub fn total_buffers(&self) -> usize {
        self.0.total_buffers
    }

    pub fn available_buffers(&self) -> usize {
        self.0.total_buffers - self.0.in_use.load(Ordering::Acquire)
    }

    fn recycler(&self) -> nes_execution_domain::buffers::Recycler {
        let inner = self.0.clone();
        Arc::new(move |segment: Arc<MemorySegment>| {
            let _ = inner.free.push(segment);
            inner.in_use.fetch_sub(1, Ordering::AcqRel);
            let _guard = inner.wait_lock.lock();
            inner.wait_cv.notify_all();
        })
    }

    fn wrap(&self, segment: Arc<MemorySegment>, origin_id: OriginId) -> TupleBuffer {
        self.0.in_use.fetch_add(1, Ordering::AcqRel);
        TupleBuffer::new(segment, origin_id, self.recycler())
    }

    /// Waits indefinitely for a buffer to become available.
    pub fn get_buffer_blocking(&self, origin_id: OriginId) -> TupleBuffer {
        loop {
            if let Some(segment) = self.0.free.pop() {
                return self.wrap(segment, origin_id);
            }
            let mut guard = self.0.wait_lock.lock();
            if self.0.free.is_empty() {
                self.0.wait_cv.wait(&mut guard);
            }
        }
    }

    /// Bounded wait; `None` on timeout (spec.md §4.2 `getBufferWithTimeout`).
    pub fn get_buffer_with_timeout(&self, origin_id: OriginId, timeout: Duration) -> Option<TupleBuffer> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(segment) = self.0.free.pop() {
                return Some(self.wrap(segment, origin_id));
            }
            let mut guard = self.0.wait_lock.lock();
            if self.0.free.is_empty() {
                let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                let timed_out = self.0.wait_cv.wait_for(&mut guard, remaining).timed_out();
                if timed_out && self.0.free.is_empty() {
                    return None;
                }
            }
        }
    }

    /// `None` immediately if the pool is empty (spec.md §4.2
    /// `getBufferNoBlocking`).
    pub fn get_buffer_no_blocking(&self, origin_id: OriginId) -> Option<TupleBuffer> {
        self.0.free.pop().map(|segment| self.wrap(segment, origin_id))
    }

    /// A buffer whose payload is at least `size` bytes, backed by the
    /// unpooled chunk arena (spec.md §4.2 `getUnpooledBuffer`).
    pub fn get_unpooled_buffer(&self, origin_id: OriginId, size: usize) -> Result<TupleBuffer, PipelineError> {
        self.0.unpooled.acquire(origin_id, size)
    }

    /// Carves a sub-pool of `n` buffers reserved exclusively for one
    /// pipeline/thread (spec.md §4.2 `createFixedSizeBufferPool`). Blocks
    /// the caller (not the global pool's other consumers) until `n`
    /// buffers are available.
    pub fn create_fixed_size_buffer_pool(&self, n: usize, origin_id: OriginId) -> Result<FixedSizeBufferPool, PipelineError> {
        if n == 0 || n > self.0.total_buffers {
            return Err(PipelineError::invalid_config(format!(
                "sub-pool size {n} must be in 1..={}",
                self.0.total_buffers
            )));
        }
        let mut reserved = Vec::with_capacity(n);
        for _ in 0..n {
            let segment = loop {
                if let Some(segment) = self.0.free.pop() {
                    break segment;
                }
                let mut guard = self.0.wait_lock.lock();
                if self.0.free.is_empty() {
                    self.0.wait_cv.wait(&mut guard);
                }
            };
            self.0.in_use.fetch_add(1, Ordering::AcqRel);
            reserved.push(segment);
        }
        let _ = origin_id;
        Ok(FixedSizeBufferPool::new(Arc::downgrade(&self.0), reserved, self.0.buffer_size))
    }

    /// Explicit, checked teardown (spec.md §4.2 P1): every buffer must
    /// have returned to the free list before the manager is dropped.
    pub fn assert_all_returned(&self) -> Result<(), PipelineError> {
        let outstanding = self.0.in_use.load(Ordering::Acquire);
        if outstanding != 0 {
            return Err(PipelineError::InternalError(format!(
                "buffer manager destroyed with {outstanding} outstanding buffer(s)"
            )));
        }
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let outstanding = self.in_use.load(Ordering::Acquire);
        if outstanding != 0 {
            tracing::error!(outstanding, "buffer manager dropped with outstanding buffers still live");
        }
    }
}

// Allow `FixedSizeBufferPool` (in a sibling module) to return reclaimed
// segments without exposing `Inner` publicly.
impl Inner {
    pub(super) fn recycle_segment(&self, segment: Arc<MemorySegment>) {
        let _ = self.free.push(segment);
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        let _guard = self.wait_lock.lock();
        self.wait_cv.notify_all();
    }
}

pub(super) type ManagerWeak = std::sync::Weak<Inner>;

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(n: usize) -> BufferManagerConfig {
        BufferManagerConfig { buffer_size: 4096, number_of_buffers: n, alignment: 64 }
    }

    #[test]
    fn hands_out_and_recycles_buffers() {
        let mgr = BufferManager::new(cfg(2)).unwrap();
        assert_eq!(mgr.available_buffers(), 2);

        let buf = mgr.get_buffer_blocking(OriginId::new(1));
        assert_eq!(mgr.available_buffers(), 1);

        drop(buf);
        assert_eq!(mgr.available_buffers(), 2);
        assert!(mgr.assert_all_returned().is_ok());
    }

    #[test]
    fn no_blocking_returns_none_when_exhausted() {
        let mgr = BufferManager::new(cfg(1)).unwrap();
        let _buf = mgr.get_buffer_blocking(OriginId::new(1));
        assert!(mgr.get_buffer_no_blocking(OriginId::new(1)).is_none());
    }

    #[test]
    fn timeout_returns_none_when_pool_stays_empty() {
        let mgr = BufferManager::new(cfg(1)).unwrap();
        let _buf = mgr.get_buffer_blocking(OriginId::new(1));
        let got = mgr.get_buffer_with_timeout(OriginId::new(1), Duration::from_millis(20));
        assert!(got.is_none());
    }

    #[test]
    fn blocking_get_wakes_up_once_a_buffer_is_recycled() {
        let mgr = BufferManager::new(cfg(1)).unwrap();
        let held = mgr.get_buffer_blocking(OriginId::new(1));

        let mgr2 = mgr.clone();
        let handle = std::thread::spawn(move || mgr2.get_buffer_blocking(OriginId::new(1)));

        std::thread::sleep(Duration::from_millis(20));
        drop(held);

        let got = handle.join().unwrap();
        assert_eq!(got.fixed_buffer_size(), 4096);
    }

    #[test]
    fn assert_all_returned_fails_with_outstanding_buffer() {
        let mgr = BufferManager::new(cfg(1)).unwrap();
        let _buf = mgr.get_buffer_blocking(OriginId::new(1));
        assert!(mgr.assert_all_returned().is_err());
    }

    #[test]
    fn sub_pool_reservation_does_not_exceed_global_pool() {
        let mgr = BufferManager::new(cfg(2)).unwrap();
        assert!(mgr.create_fixed_size_buffer_pool(3, OriginId::new(1)).is_err());
        let sub = mgr.create_fixed_size_buffer_pool(2, OriginId::new(1)).unwrap();
        assert_eq!(mgr.available_buffers(), 0);
        drop(sub);
        assert_eq!(mgr.available_buffers(), 2);
    }
}
