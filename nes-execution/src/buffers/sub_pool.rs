// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Fixed-size sub-pool (spec.md §4.2 `createFixedSizeBufferPool`) — `n`
//! buffers reserved exclusively for one pipeline/worker. Holds only a weak
//! reference to the owning [`BufferManager`](super::pool::BufferManager):
//! once the manager is gone, further local allocation fails, but buffers
//! already reserved keep working until this sub-pool itself drops, at which
//! point any segments still held locally are returned to the global pool
//! (spec.md §4.2 invariant).

use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use nes_execution_domain::buffers::{MemorySegment, Recycler, TupleBuffer};
use nes_execution_domain::value_objects::OriginId;
use nes_execution_domain::PipelineError;

use super::pool::Inner as ManagerInner;

/// Local free list shared between a [`FixedSizeBufferPool`] and every
/// recycler closure it has handed out. Kept behind its own `Arc` (rather
/// than borrowed from `&self`) so a recycler can safely outlive any
/// particular borrow of the pool.
struct LocalState {
    segments: Mutex<Vec<Arc<MemorySegment>>>,
    cv: Condvar,
}

/// A pipeline- or thread-local reservation of buffers carved out of the
/// global [`BufferManager`](super::pool::BufferManager). Never blocks
/// other consumers of the global pool (spec.md §4.2): reservation happens
/// once, up front, at `create_fixed_size_buffer_pool` time.
pub struct FixedSizeBufferPool {
    owner: Weak<ManagerInner>,
    state: Arc<LocalState>,
    buffer_size: usize,
}

impl FixedSizeBufferPool {
    pub(super) fn new(owner: Weak<ManagerInner>, reserved: Vec<Arc<MemorySegment>>, buffer_size: usize) -> Self {
        Self {
            owner,
            state: Arc::new(LocalState { segments: Mutex::new(reserved), cv: Condvar::new() }),
            buffer_size,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn available(&self) -> usize {
        self.state.segments.lock().len()
    }

    /// Blocks until a locally-reserved segment is free, wraps it, and
    /// returns it. Only ever competes with other callers of *this*
    /// sub-pool, never with the global pool's other consumers.
    pub fn get_buffer_blocking(&self, origin_id: OriginId) -> Result<TupleBuffer, PipelineError> {
        self.ensure_owner_alive()?;
        let mut guard = self.state.segments.lock();
        loop {
            if let Some(segment) = guard.pop() {
                return Ok(self.wrap(segment, origin_id));
            }
            self.state.cv.wait(&mut guard);
        }
    }

    pub fn get_buffer_no_blocking(&self, origin_id: OriginId) -> Result<Option<TupleBuffer>, PipelineError> {
        self.ensure_owner_alive()?;
        let mut guard = self.state.segments.lock();
        Ok(guard.pop().map(|segment| self.wrap(segment, origin_id)))
    }

    fn ensure_owner_alive(&self) -> Result<(), PipelineError> {
        if self.owner.upgrade().is_none() {
            return Err(PipelineError::ResourceExhausted("owning buffer manager has been destroyed".into()));
        }
        Ok(())
    }

    fn wrap(&self, segment: Arc<MemorySegment>, origin_id: OriginId) -> TupleBuffer {
        TupleBuffer::new(segment, origin_id, self.recycler())
    }

    /// Recycling returns the segment to *this* sub-pool's local free list,
    /// not the global one: the reservation stays exclusive for the
    /// sub-pool's lifetime. The closure clones the shared `Arc<LocalState>`
    /// rather than borrowing `self`, so it remains valid even if the
    /// `FixedSizeBufferPool` that created it has since been dropped (the
    /// segment simply waits in `state` until nothing references it).
    fn recycler(&self) -> Recycler {
        let state = self.state.clone();
        Arc::new(move |segment: Arc<MemorySegment>| {
            state.segments.lock().push(segment);
            state.cv.notify_all();
        })
    }
}

impl Drop for FixedSizeBufferPool {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            let mut guard = self.state.segments.lock();
            for segment in guard.drain(..) {
                owner.recycle_segment(segment);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::pool::{BufferManager, BufferManagerConfig};

    fn manager(n: usize) -> BufferManager {
        BufferManager::new(BufferManagerConfig { buffer_size: 256, number_of_buffers: n, alignment: 64 }).unwrap()
    }

    #[test]
    fn reserved_buffers_do_not_shrink_the_global_free_list_below_reservation() {
        let mgr = manager(8);
        let sub = mgr.create_fixed_size_buffer_pool(3, OriginId::new(1)).unwrap();
        assert_eq!(sub.available(), 3);
        assert_eq!(mgr.available_buffers(), 5);
    }

    #[test]
    fn sub_pool_buffers_recycle_locally_not_globally() {
        let mgr = manager(4);
        let sub = mgr.create_fixed_size_buffer_pool(2, OriginId::new(1)).unwrap();
        let buf = sub.get_buffer_blocking(OriginId::new(1)).unwrap();
        assert_eq!(sub.available(), 0);
        drop(buf);
        assert_eq!(sub.available(), 1);
        assert_eq!(mgr.available_buffers(), 2);
    }

    #[test]
    fn dropping_sub_pool_returns_segments_to_global_pool() {
        let mgr = manager(4);
        {
            let sub = mgr.create_fixed_size_buffer_pool(3, OriginId::new(1)).unwrap();
            assert_eq!(mgr.available_buffers(), 1);
            let _buf = sub.get_buffer_blocking(OriginId::new(1)).unwrap();
        }
        assert_eq!(mgr.available_buffers(), 4);
    }

    #[test]
    fn no_blocking_returns_none_once_reservation_is_exhausted() {
        let mgr = manager(4);
        let sub = mgr.create_fixed_size_buffer_pool(1, OriginId::new(1)).unwrap();
        let _buf = sub.get_buffer_blocking(OriginId::new(1)).unwrap();
        assert!(sub.get_buffer_no_blocking(OriginId::new(1)).unwrap().is_none());
    }
}
