// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Query manager and task scheduler (spec.md §4.4, C4): task queues, an
//! OS-thread worker pool (no `tokio` inside a worker — spec.md §5
//! "Suspension points" forbids cooperative yielding mid-pipeline), and the
//! reconfiguration barrier that carries setup/start/stop/destroy control
//! messages through a running query's pipelines.

pub mod barrier;
pub mod queue;
pub mod query_manager;
pub mod task;
pub mod worker;

pub use barrier::ReconfigurationBarrier;
pub use query_manager::{PipelineRuntime, QueryManager, SchedulerHandle};
pub use task::{ControlEnvelope, Task, WorkerMessage};
