// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A pipeline's or source's downstream target: another pipeline, or a sink
//! (spec.md §3 "successor list").

use serde::{Deserialize, Serialize};

use super::pipeline_id::PipelineId;
use super::sink_id::SinkId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuccessorRef {
    Pipeline(PipelineId),
    Sink(SinkId),
}
