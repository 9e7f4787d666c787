// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Operator handlers — named, typed side structures a pipeline owns
//! (spec.md §3, §9 "Dynamic reflection over operator handlers").
//!
//! The original engine downcasts a handler by a generator-assigned index at
//! runtime. The Rust-native replacement keeps the index (so the generator
//! and runtime still agree on handler *slots*) but replaces the downcast
//! with a single `Any`-based helper hidden behind a statically-typed
//! accessor (`HandlerTable::get::<ConcreteHandler>`); call sites never
//! pattern-match on a type tag themselves, so there is no runtime type
//! switch anywhere in engine code — see `DESIGN.md`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A compile-time-declared slot a pipeline's operator handlers are stored
/// and looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerIndex(usize);

impl HandlerIndex {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

/// Marker trait every operator handler (emit ordering state, window slice
/// store, join hash tables, ...) implements.
pub trait OperatorHandler: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// A pipeline's handler slots, indexed by [`HandlerIndex`].
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<HandlerIndex, Arc<dyn OperatorHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: HandlerIndex, handler: Arc<dyn OperatorHandler>) {
        self.handlers.insert(index, handler);
    }

    /// Looks up the handler at `index` and downcasts it to `H`. Returns
    /// `None` if the slot is empty or was populated with a different
    /// concrete type than the caller expects (a code-generation bug, not a
    /// runtime condition callers are expected to branch on).
    pub fn get<H: OperatorHandler + 'static>(&self, index: HandlerIndex) -> Option<Arc<H>> {
        let handler = self.handlers.get(&index)?;
        let any = handler.clone();
        // `Arc<dyn OperatorHandler>` doesn't support `Arc::downcast` directly
        // (that's only on `Arc<dyn Any>`); go through a raw pointer cast
        // instead, guarded by the `Any` type-id check.
        if (*any).as_any().is::<H>() {
            let raw = Arc::into_raw(any) as *const H;
            // SAFETY: just verified the concrete type matches via `is::<H>()`.
            Some(unsafe { Arc::from_raw(raw) })
        } else {
            None
        }
    }
}
