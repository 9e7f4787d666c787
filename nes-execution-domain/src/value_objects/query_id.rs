// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Query identifier — labels one deployed query execution plan (§3 QEP).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use ulid::Ulid;

use super::generic_id::{GenericId, IdCategory};
use crate::PipelineError;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct QueryMarker;

impl IdCategory for QueryMarker {
    fn category_name() -> &'static str {
        "query"
    }
}

/// Type-safe, time-ordered identifier for a query execution plan.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct QueryId(GenericId<QueryMarker>);

impl QueryId {
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

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for QueryId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}
