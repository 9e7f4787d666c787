// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared MPMC data-task queues (spec.md §4.4): one [`DataQueue`] per
//! `QueryManagerMode::queue_count()` slot, fed by producers (sources,
//! `emitBuffer(Repeat/Emit)`) and drained by every worker assigned to it.

use crossbeam::channel::{unbounded, Receiver, Sender};

use super::task::Task;

/// One shared data queue. Cloning a `DataQueue` clones the channel handles,
/// not the queue itself — cheap, and exactly what's needed to hand every
/// worker assigned to this queue its own `Receiver` end.
#[derive(Clone)]
pub struct DataQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl DataQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn push(&self, task: Task) {
        // An unbounded channel's send only fails once every receiver has
        // been dropped, i.e. the scheduler has already torn down every
        // worker reading this queue — nothing left to notify.
        let _ = self.sender.send(task);
    }

    pub fn receiver(&self) -> Receiver<Task> {
        self.receiver.clone()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for DataQueue {
    fn default() -> Self {
        Self::new()
    }
}
