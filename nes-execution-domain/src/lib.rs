// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # NebulaStream execution-core domain layer
//!
//! Pure types the execution core is built from: the tuple buffer/memory
//! segment data model (spec.md §3, §4.1), the value objects the query
//! manager and code generator exchange (ids, window/join descriptors,
//! reconfiguration messages), the `PipelineError` taxonomy (§7), and the
//! capability traits (`Source`, `Sink`, `PipelineStage`, `OperatorHandler`)
//! the engine dispatches through (§9).
//!
//! This crate is synchronous and dependency-light by design: no `tokio`, no
//! `async-trait`. The engine crate (`nes-execution`) owns every runtime
//! concern — thread pools, task queues, locks held across operator calls —
//! and depends on this crate, not the other way around.

pub mod buffers;
pub mod error;
pub mod handlers;
pub mod qep_status;
pub mod reconfiguration;
pub mod traits;
pub mod value_objects;

pub use error::PipelineError;
pub use handlers::{HandlerIndex, HandlerTable, OperatorHandler};
pub use qep_status::QepStatus;
pub use reconfiguration::ReconfigurationMessage;
pub use traits::{BufferSink, ExecutionContext, PipelineStage, Sink, Source};
