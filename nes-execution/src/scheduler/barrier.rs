// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! K-way rendezvous barrier (spec.md §4.4): every worker servicing a
//! pipeline must call [`ReconfigurationBarrier::arrive_and_wait`] exactly
//! once before any of them proceeds to the next task. Plain atomic
//! countdown plus condvar, the same style of primitive the buffer manager
//! uses for blocking acquisition (`nes-execution::buffers::pool`).

use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::{Condvar, Mutex};

/// A single-use barrier for `expected` parties. Each party calls
/// `arrive_and_wait` once; the last one to arrive wakes the rest and runs
/// the barrier's `postReconfigurationCallback` (spec.md §4.4/P5), exactly
/// once, before releasing anyone.
pub struct ReconfigurationBarrier {
    expected: usize,
    arrived: Mutex<usize>,
    condvar: Condvar,
    released: AtomicUsize,
    on_release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ReconfigurationBarrier {
    pub fn new(expected: usize) -> Self {
        Self::with_callback(expected, None)
    }

    /// Same as `new`, but `on_release` runs exactly once, on whichever
    /// thread turns out to be the last arriver, before any party is woken.
    pub fn with_callback(expected: usize, on_release: Option<Box<dyn FnOnce() + Send>>) -> Self {
        Self {
            expected,
            arrived: Mutex::new(0),
            condvar: Condvar::new(),
            released: AtomicUsize::new(0),
            on_release: Mutex::new(on_release),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Blocks until `expected` parties (including this one) have called
    /// this method. A barrier created with `expected == 0` releases
    /// immediately — no worker services the target queue, so there is
    /// nothing to rendezvous with.
    pub fn arrive_and_wait(&self) {
        if self.expected == 0 {
            self.release();
            return;
        }
        let mut arrived = self.arrived.lock();
        *arrived += 1;
        if *arrived >= self.expected {
            self.release();
            self.condvar.notify_all();
        } else {
            while self.released.load(Ordering::Acquire) == 0 {
                self.condvar.wait(&mut arrived);
            }
        }
    }

    /// Blocks a non-party caller (e.g. a blocking `QueryManager`
    /// reconfiguration submission, `postWait()`) until the barrier has
    /// released, without counting toward `expected`.
    pub fn wait_for_release(&self) {
        if self.released.load(Ordering::Acquire) != 0 {
            return;
        }
        let mut arrived = self.arrived.lock();
        while self.released.load(Ordering::Acquire) == 0 {
            self.condvar.wait(&mut arrived);
        }
    }

    fn release(&self) {
        if let Some(callback) = self.on_release.lock().take() {
            callback();
        }
        self.released.store(1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn releases_only_once_every_party_has_arrived() {
        let barrier = Arc::new(ReconfigurationBarrier::new(3));
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let barrier = barrier.clone();
                let order = order.clone();
                thread::spawn(move || {
                    barrier.arrive_and_wait();
                    order.lock().push(i);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(order.lock().len(), 3);
    }

    #[test]
    fn zero_expected_releases_immediately() {
        let barrier = ReconfigurationBarrier::new(0);
        barrier.arrive_and_wait();
    }

    #[test]
    fn on_release_callback_runs_exactly_once() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        let barrier = Arc::new(ReconfigurationBarrier::with_callback(
            3,
            Some(Box::new(move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })),
        ));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.arrive_and_wait())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_party_waiter_unblocks_once_every_party_has_arrived() {
        let barrier = Arc::new(ReconfigurationBarrier::new(2));
        let waiter_barrier = barrier.clone();
        let waiter = thread::spawn(move || waiter_barrier.wait_for_release());

        for _ in 0..2 {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.arrive_and_wait()).join().unwrap();
        }
        waiter.join().unwrap();
    }
}
