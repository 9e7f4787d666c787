// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Origin identifier — a producing endpoint, typically a source, unique
//! within one query (GLOSSARY). Wire representation is a plain `u64` per
//! spec.md §6's buffer header layout, unlike the ULID-backed [`QueryId`]/
//! [`PipelineId`]: origins are assigned by the plan layer at deployment, not
//! generated at runtime, so they carry no useful creation-time ordering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a producing endpoint (source) within a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OriginId(u64);

impl OriginId {
    pub const INVALID: OriginId = OriginId(u64::MAX);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "origin#{}", self.0)
    }
}

impl From<u64> for OriginId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
