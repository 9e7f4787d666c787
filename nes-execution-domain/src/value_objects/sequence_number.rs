// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Sequence and chunk numbering (spec.md §3, §4.5). A `SequenceNumber` is
//! monotonically increasing per origin; a `ChunkNumber` subdivides one
//! sequence number when an operator splits a logical buffer into chunks.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub const INITIAL: SequenceNumber = SequenceNumber(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq#{}", self.0)
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A chunk number within one sequence. Per spec.md §3, `chunkNumber >= 1`;
/// enforced at construction rather than by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkNumber(u64);

impl ChunkNumber {
    pub const FIRST: ChunkNumber = ChunkNumber(1);

    /// Panics on 0: every call site constructs chunk numbers from the
    /// emit-ordering handler's atomic counter (§4.5), which starts at 1 and
    /// only increments — a 0 here means the handler itself is broken.
    pub fn new(value: u64) -> Self {
        assert!(value >= 1, "chunk numbers start at 1");
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChunkNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk#{}", self.0)
    }
}
