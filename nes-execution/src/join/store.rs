// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Two-sided window slice accumulation for stream joins (spec.md §4.7).
//! Structurally the same striped-slice scheme as [`crate::windowing::SliceStore`]
//! — a slice keyed by window start, sharded across stripes — except each
//! slice buffers raw rows per side rather than an incremental aggregate,
//! since matching can only happen once both sides of a slice are complete.

use std::collections::HashMap;

use nes_execution_domain::value_objects::{EqualityPredicate, JoinStrategy, WindowDescriptor};
use parking_lot::Mutex;

use crate::record::Record;

use super::matcher::{hash_match, nested_loop_match};

const STRIPE_COUNT: usize = 16;

/// One matched pair, ready to be written out as a joined record (spec.md
/// §4.7: output schema is `start, end, key` followed by both sides'
/// fields).
pub struct FiredJoin {
    pub start_ms: u64,
    pub end_ms: u64,
    pub left: Record,
    pub right: Record,
}

struct JoinSlice {
    end_ms: u64,
    left: Vec<Record>,
    right: Vec<Record>,
}

/// Which input stream a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Sharded store of in-flight join slices for one [`WindowDescriptor`].
pub struct JoinSliceStore {
    window: WindowDescriptor,
    stripes: Vec<Mutex<HashMap<u64, JoinSlice>>>,
}

impl JoinSliceStore {
    pub fn new(window: WindowDescriptor) -> Self {
        let stripes = (0..STRIPE_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self { window, stripes }
    }

    pub fn window(&self) -> &WindowDescriptor {
        &self.window
    }

    fn stripe_for(&self, start_ms: u64) -> &Mutex<HashMap<u64, JoinSlice>> {
        &self.stripes[(start_ms as usize) % STRIPE_COUNT]
    }

    /// Buffers `record` (observed at timestamp `t` on `side`) into every
    /// window instance active at `t`, unless every candidate slice has
    /// already fired. Mirrors [`crate::windowing::SliceStore::record`]'s
    /// lateness rule.
    pub fn add(&self, side: Side, t: u64, record: Record, watermark_ms: u64) -> bool {
        let size_ms = self.window.kind.size_ms();
        let mut accepted = false;
        for start_ms in self.window.active_slice_starts(t) {
            let end_ms = start_ms + size_ms;
            if end_ms + self.window.allowed_lateness_ms <= watermark_ms {
                continue;
            }
            let mut stripe = self.stripe_for(start_ms).lock();
            let slice = stripe.entry(start_ms).or_insert_with(|| JoinSlice { end_ms, left: Vec::new(), right: Vec::new() });
            match side {
                Side::Left => slice.left.push(record.clone()),
                Side::Right => slice.right.push(record.clone()),
            }
            accepted = true;
        }
        accepted
    }

    /// Removes every slice past its firing deadline and matches its two
    /// sides with `predicate` using `strategy`'s algorithm.
    pub fn fire_ready(&self, watermark_ms: u64, predicate: &EqualityPredicate, strategy: JoinStrategy) -> Vec<FiredJoin> {
        let mut fired = Vec::new();
        for stripe_lock in &self.stripes {
            let mut stripe = stripe_lock.lock();
            let ready: Vec<u64> = stripe
                .iter()
                .filter(|(_, slice)| slice.end_ms + self.window.allowed_lateness_ms <= watermark_ms)
                .map(|(start, _)| *start)
                .collect();
            for start_ms in ready {
                if let Some(slice) = stripe.remove(&start_ms) {
                    let pairs = match strategy {
                        JoinStrategy::NestedLoop => nested_loop_match(&slice.left, &slice.right, predicate),
                        JoinStrategy::Hash => hash_match(&slice.left, &slice.right, predicate),
                    };
                    for (l, r) in pairs {
                        fired.push(FiredJoin { start_ms, end_ms: slice.end_ms, left: l.clone(), right: r.clone() });
                    }
                }
            }
        }
        fired
    }

    pub fn active_slice_count(&self) -> usize {
        self.stripes.iter().map(|s| s.lock().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use nes_execution_domain::value_objects::{AggregationFunction, TimeCharacteristic, WindowKind};

    fn window(size_ms: u64) -> WindowDescriptor {
        WindowDescriptor::new(WindowKind::Tumbling { size_ms }, TimeCharacteristic::EventTime, "ts", "amount", AggregationFunction::Sum)
    }

    fn row(field: &str, value: i64) -> Record {
        let mut r = Record::new();
        r.insert(field.to_string(), FieldValue::Int64(value));
        r
    }

    #[test]
    fn matches_both_sides_once_the_slice_fires() {
        let store = JoinSliceStore::new(window(1000));
        let predicate = EqualityPredicate::new("id", "order_id");

        store.add(Side::Left, 100, row("id", 1), 0);
        store.add(Side::Right, 200, row("order_id", 1), 0);
        assert!(store.fire_ready(999, &predicate, JoinStrategy::Hash).is_empty());

        let fired = store.fire_ready(1000, &predicate, JoinStrategy::Hash);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].start_ms, 0);
        assert_eq!(fired[0].end_ms, 1000);
    }

    #[test]
    fn unmatched_rows_produce_no_output() {
        let store = JoinSliceStore::new(window(1000));
        let predicate = EqualityPredicate::new("id", "order_id");
        store.add(Side::Left, 100, row("id", 1), 0);
        store.add(Side::Right, 200, row("order_id", 2), 0);
        assert!(store.fire_ready(1000, &predicate, JoinStrategy::NestedLoop).is_empty());
    }

    #[test]
    fn a_one_sided_slice_still_fires_empty_once_its_deadline_passes() {
        let store = JoinSliceStore::new(window(1000));
        let predicate = EqualityPredicate::new("id", "order_id");
        store.add(Side::Left, 100, row("id", 1), 0);
        assert_eq!(store.active_slice_count(), 1);
        assert!(store.fire_ready(1000, &predicate, JoinStrategy::Hash).is_empty());
        assert_eq!(store.active_slice_count(), 0);
    }
}
