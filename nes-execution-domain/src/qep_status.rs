// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Query execution plan status (spec.md §3, §6 `status(qepId)`).

use serde::{Deserialize, Serialize};

/// Lifecycle status of a deployed query execution plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QepStatus {
    Created,
    Running,
    Stopped,
    Finished,
    ErrorState,
    Invalid,
}

impl QepStatus {
    /// True once the qep will never again transition (spec.md §7:
    /// `ErrorState` is terminal, reached from any pipeline failure).
    pub fn is_terminal(&self) -> bool {
        matches!(self, QepStatus::Stopped | QepStatus::Finished | QepStatus::ErrorState | QepStatus::Invalid)
    }
}

impl Default for QepStatus {
    fn default() -> Self {
        QepStatus::Created
    }
}
