// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The two matching algorithms `JoinStrategy` chooses between (spec.md
//! §4.7). Both produce the same pairs for the same input — `JoinStrategy`
//! is a performance choice, not a semantic one — so tests exercise one and
//! trust the other by construction, same as production code trusts a query
//! optimizer's strategy pick not to change results.

use std::collections::HashMap;

use nes_execution_domain::value_objects::EqualityPredicate;

use crate::record::{FieldValue, Record};

fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn key_string(value: &FieldValue) -> String {
    match value {
        FieldValue::Int64(v) => v.to_string(),
        FieldValue::Float64(v) => v.to_string(),
        FieldValue::Text(v) => v.clone(),
    }
}

/// O(|left| * |right|) pairwise scan, grounded on the naive join strategy
/// every streaming engine keeps around as a correctness baseline and a
/// fallback for predicates a hash table can't key on.
pub fn nested_loop_match<'a>(left: &'a [Record], right: &'a [Record], predicate: &EqualityPredicate) -> Vec<(&'a Record, &'a Record)> {
    let mut pairs = Vec::new();
    for l in left {
        let Some(lv) = l.get(&predicate.left_field) else { continue };
        for r in right {
            let Some(rv) = r.get(&predicate.right_field) else { continue };
            if values_equal(lv, rv) {
                pairs.push((l, r));
            }
        }
    }
    pairs
}

/// Builds a hash table over the smaller, probe-friendly side once, then
/// scans the other side against it — O(|left| + |right|) once the key is
/// hashable, which every equi-join predicate's values are here.
pub fn hash_match<'a>(left: &'a [Record], right: &'a [Record], predicate: &EqualityPredicate) -> Vec<(&'a Record, &'a Record)> {
    let mut by_key: HashMap<String, Vec<&Record>> = HashMap::new();
    for r in right {
        if let Some(rv) = r.get(&predicate.right_field) {
            by_key.entry(key_string(rv)).or_default().push(r);
        }
    }
    let mut pairs = Vec::new();
    for l in left {
        let Some(lv) = l.get(&predicate.left_field) else { continue };
        if let Some(matches) = by_key.get(&key_string(lv)) {
            for r in matches {
                pairs.push((l, *r));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(field: &str, value: FieldValue) -> Record {
        let mut r = Record::new();
        r.insert(field.to_string(), value);
        r
    }

    #[test]
    fn nested_loop_and_hash_produce_the_same_pair_count() {
        let predicate = EqualityPredicate::new("id", "order_id");
        let left = vec![row("id", FieldValue::Int64(1)), row("id", FieldValue::Int64(2))];
        let right = vec![
            row("order_id", FieldValue::Int64(1)),
            row("order_id", FieldValue::Int64(1)),
            row("order_id", FieldValue::Int64(3)),
        ];
        assert_eq!(nested_loop_match(&left, &right, &predicate).len(), 2);
        assert_eq!(hash_match(&left, &right, &predicate).len(), 2);
    }

    #[test]
    fn cross_numeric_types_still_compare_equal() {
        let predicate = EqualityPredicate::new("id", "order_id");
        let left = vec![row("id", FieldValue::Int64(1))];
        let right = vec![row("order_id", FieldValue::Float64(1.0))];
        assert_eq!(hash_match(&left, &right, &predicate).len(), 1);
    }

    #[test]
    fn no_match_yields_no_pairs() {
        let predicate = EqualityPredicate::new("id", "order_id");
        let left = vec![row("id", FieldValue::Int64(1))];
        let right = vec![row("order_id", FieldValue::Int64(2))];
        assert!(nested_loop_match(&left, &right, &predicate).is_empty());
        assert!(hash_match(&left, &right, &predicate).is_empty());
    }
}
