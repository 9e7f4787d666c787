// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic ID Value Object
//!
//! A type-safe ULID wrapper shared by the few identifiers in this crate that
//! need time-ordered, globally-unique generation (`QueryId`, `PipelineId`).
//! Phantom-typed on an `IdCategory` marker so `QueryId` and `PipelineId`
//! cannot be confused at compile time despite sharing an implementation.
//!
//! The wire-level identifiers that label *data* (`OriginId`, `SequenceNumber`,
//! `ChunkNumber`) are plain `u64` newtypes instead — spec.md §6 pins their
//! wire representation to fixed-width integers, so ULID's sortable-but-128-bit
//! shape doesn't fit there.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use ulid::Ulid;

use crate::PipelineError;

/// Per-category validation hook for [`GenericId`].
pub trait IdCategory {
    fn category_name() -> &'static str;

    fn validate_id(ulid: &Ulid) -> Result<(), PipelineError> {
        if *ulid == Ulid::nil() {
            return Err(PipelineError::InvalidConfiguration(format!(
                "{} id cannot be nil",
                Self::category_name()
            )));
        }
        Ok(())
    }
}

/// A ULID-backed identifier, specialized per entity by a zero-sized
/// `IdCategory` marker type.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct GenericId<T: IdCategory> {
    value: Ulid,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: IdCategory> Serialize for GenericId<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.to_string().serialize(serializer)
    }
}

impl<'de, T: IdCategory> Deserialize<'de> for GenericId<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ulid = Ulid::from_string(&s).map_err(|e| serde::de::Error::custom(e.to_string()))?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }
}

impl<T: IdCategory> GenericId<T> {
    pub fn new() -> Self {
        Self {
            value: Ulid::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn from_ulid(ulid: Ulid) -> Result<Self, PipelineError> {
        T::validate_id(&ulid)?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }

    pub fn from_timestamp_ms(timestamp_ms: u64) -> Result<Self, PipelineError> {
        let random = rand::random::<u128>() & ((1u128 << 80) - 1);
        let ulid = Ulid::from_parts(timestamp_ms, random);
        T::validate_id(&ulid)?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }

    pub fn from_string(s: &str) -> Result<Self, PipelineError> {
        let ulid = Ulid::from_str(s)
            .map_err(|e| PipelineError::InvalidConfiguration(format!("invalid id format: {e}")))?;
        Self::from_ulid(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.value
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.value.timestamp_ms()
    }

    pub fn category(&self) -> &'static str {
        T::category_name()
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        T::validate_id(&self.value)
    }

    pub fn is_nil(&self) -> bool {
        self.value.0 == 0
    }

    #[cfg(test)]
    pub fn nil() -> Self {
        Self {
            value: Ulid(0),
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdCategory> Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T: IdCategory> Hash for GenericId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdCategory> FromStr for GenericId<T> {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl<T: IdCategory> From<GenericId<T>> for Ulid {
    fn from(id: GenericId<T>) -> Self {
        id.value
    }
}

impl<T: IdCategory> AsRef<Ulid> for GenericId<T> {
    fn as_ref(&self) -> &Ulid {
        &self.value
    }
}
