// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Stream join configuration (spec.md §4.7): predicate, strategy, and the
//! shared windowing specification the two input streams are sliced by.

use serde::{Deserialize, Serialize};

use super::window_descriptor::WindowDescriptor;

/// Join implementation chosen by the plan layer (spec.md §6
/// `joinStrategy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinStrategy {
    NestedLoop,
    Hash,
}

impl Default for JoinStrategy {
    fn default() -> Self {
        JoinStrategy::NestedLoop
    }
}

/// `Attribute(left) equalsTo Attribute(right)` equi-join predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualityPredicate {
    pub left_field: String,
    pub right_field: String,
}

impl EqualityPredicate {
    pub fn new(left_field: impl Into<String>, right_field: impl Into<String>) -> Self {
        Self {
            left_field: left_field.into(),
            right_field: right_field.into(),
        }
    }
}

/// Configuration for one windowed stream join (spec.md §4.7). The window
/// descriptor's key field is unused for joins — the join key comes from
/// `predicate` — but the window shape, time characteristic, and timestamp
/// field are shared between both input sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDescriptor {
    pub window: WindowDescriptor,
    pub predicate: EqualityPredicate,
    pub strategy: JoinStrategy,
    /// Schema field names from the left/right input, in order; the output
    /// schema prepends `start, end, key` to their concatenation (§4.7).
    pub left_schema: Vec<String>,
    pub right_schema: Vec<String>,
}

impl JoinDescriptor {
    pub fn new(
        window: WindowDescriptor,
        predicate: EqualityPredicate,
        left_schema: Vec<String>,
        right_schema: Vec<String>,
    ) -> Self {
        Self {
            window,
            predicate,
            strategy: JoinStrategy::default(),
            left_schema,
            right_schema,
        }
    }

    pub fn with_strategy(mut self, strategy: JoinStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn output_schema(&self) -> Vec<String> {
        let mut schema = vec!["start".to_string(), "end".to_string(), "key".to_string()];
        schema.extend(self.left_schema.iter().cloned());
        schema.extend(self.right_schema.iter().cloned());
        schema
    }
}
