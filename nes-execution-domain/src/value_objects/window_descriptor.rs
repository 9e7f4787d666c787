// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Window and aggregation descriptors (spec.md §4.6, §4.7) — the types the
//! code generator hands to the windowing/join operator handlers. These are
//! plan-time, immutable configuration; the mutable per-slice state they drive
//! lives in `nes-execution::windowing`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tumbling or sliding window shape over event time or ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowKind {
    /// Disjoint `[k*size, (k+1)*size)` slices.
    Tumbling { size_ms: u64 },
    /// One open slice per active `start in {k*slide : start <= now < start+size}`.
    Sliding { size_ms: u64, slide_ms: u64 },
}

impl WindowKind {
    pub fn size_ms(&self) -> u64 {
        match self {
            WindowKind::Tumbling { size_ms } => *size_ms,
            WindowKind::Sliding { size_ms, .. } => *size_ms,
        }
    }

    pub fn slide_ms(&self) -> u64 {
        match self {
            WindowKind::Tumbling { size_ms } => *size_ms,
            WindowKind::Sliding { slide_ms, .. } => *slide_ms,
        }
    }
}

/// Which clock advances the watermark for this window (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeCharacteristic {
    /// Watermark tracks `max(tupleTimestamp)` over an origin-specific field.
    EventTime,
    /// Watermark tracks wall-clock time at buffer arrival.
    IngestionTime,
}

/// Commutative-associative aggregate kinds (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationFunction {
    Sum,
    Min,
    Max,
    Avg,
    Count,
}

/// A window specification: shape, time domain, key field (absent = global
/// window), the field being aggregated, and the aggregate function.
///
/// `allowed_lateness` defaults to zero per spec.md §4.6 and the Open
/// Question resolution in `SPEC_FULL.md` §D.4, but is stored per-descriptor
/// so a multi-level window (§4.6) can override its outer stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDescriptor {
    pub kind: WindowKind,
    pub time_characteristic: TimeCharacteristic,
    /// Field name carrying the record timestamp.
    pub timestamp_field: String,
    /// Field name used as the grouping key; `None` means a single global
    /// slot (non-keyed window).
    pub key_field: Option<String>,
    /// Field name the aggregate function is applied to.
    pub value_field: String,
    pub aggregation: AggregationFunction,
    pub allowed_lateness_ms: u64,
}

impl WindowDescriptor {
    pub fn new(
        kind: WindowKind,
        time_characteristic: TimeCharacteristic,
        timestamp_field: impl Into<String>,
        value_field: impl Into<String>,
        aggregation: AggregationFunction,
    ) -> Self {
        Self {
            kind,
            time_characteristic,
            timestamp_field: timestamp_field.into(),
            key_field: None,
            value_field: value_field.into(),
            aggregation,
            allowed_lateness_ms: 0,
        }
    }

    pub fn keyed_by(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = Some(key_field.into());
        self
    }

    pub fn with_allowed_lateness(mut self, lateness: Duration) -> Self {
        self.allowed_lateness_ms = lateness.as_millis() as u64;
        self
    }

    pub fn is_keyed(&self) -> bool {
        self.key_field.is_some()
    }

    /// Every `slide`-aligned window start that is active for timestamp `t`.
    /// For `Tumbling`, this is always exactly one slice start.
    pub fn active_slice_starts(&self, t: u64) -> Vec<u64> {
        let size = self.kind.size_ms();
        let slide = self.kind.slide_ms();
        if slide == 0 {
            return Vec::new();
        }
        let last_candidate = (t / slide) * slide;
        let mut starts = Vec::new();
        let mut start = last_candidate;
        loop {
            if start + size <= t {
                break;
            }
            starts.push(start);
            if start < slide {
                break;
            }
            start -= slide;
        }
        starts
    }
}
