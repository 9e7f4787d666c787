// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Pipeline identifier — labels one compiled executable pipeline within a QEP
//! (spec.md §3). Distinct from [`QueryId`](super::query_id::QueryId) by
//! phantom type, even though both wrap a [`GenericId`].

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use ulid::Ulid;

use super::generic_id::{GenericId, IdCategory};
use crate::PipelineError;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct PipelineMarker;

impl IdCategory for PipelineMarker {
    fn category_name() -> &'static str {
        "pipeline"
    }
}

/// Type-safe, time-ordered identifier for an executable pipeline.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PipelineId(GenericId<PipelineMarker>);

impl PipelineId {
    pub fn new() -> Self {
        Self(GenericId::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Result<Self, PipelineError> {
        Ok(Self(GenericId::from_ulid(ulid)?))
    }

    pub fn from_string(s: &str) -> Result<Self, PipelineError> {
        Ok(Self(GenericId::from_string(s)?))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0.as_ulid()
    }

    #[cfg(test)]
    pub fn nil() -> Self {
        Self(GenericId::nil())
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PipelineId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_pipeline_ids_are_not_equal() {
        assert_ne!(PipelineId::new(), PipelineId::new());
    }

    #[test]
    fn roundtrips_through_string() {
        let id = PipelineId::new();
        let parsed: PipelineId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
