// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Structured access to a [`TupleBuffer`]'s payload (spec.md §3, §4.6,
//! §4.7). The buffer manager and wire header treat a buffer's payload as
//! opaque bytes; windowing and join operators need to read and write
//! individual fields, so this module is the one place that interprets
//! those bytes as rows.
//!
//! Every operator in this crate agrees on one row encoding: newline-delimited
//! JSON objects, one per tuple, matching the field names a [`WindowDescriptor`]
//! or [`JoinDescriptor`] names. This plays the role the code generator's
//! compiled memory layout plays in the original engine (`TestTupleBuffer.hpp`,
//! `examples/original_source`) without requiring an actual code generator:
//! it is slower per-tuple than a packed layout, but keeps every operator
//! free of unsafe pointer arithmetic over schema-dependent offsets.

use std::collections::BTreeMap;

use nes_execution_domain::buffers::TupleBuffer;
use nes_execution_domain::PipelineError;
use serde::{Deserialize, Serialize};

/// One field's value. `Int64`/`Float64` cover numeric aggregation and join
/// keys; `Text` covers everything else a CSV fixture might carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int64(i64),
    Float64(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int64(v) => Some(*v as f64),
            FieldValue::Float64(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_u64_timestamp(&self) -> Option<u64> {
        match self {
            FieldValue::Int64(v) if *v >= 0 => Some(*v as u64),
            FieldValue::Float64(v) if *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }
}

/// One logical row, keyed by field name. A `BTreeMap` keeps key iteration
/// order deterministic, which matters for join-output key formatting and
/// for tests asserting on exact record contents.
pub type Record = BTreeMap<String, FieldValue>;

/// Serializes `records` into `buffer`'s payload as newline-delimited JSON,
/// recording the tuple count and requesting the buffer to size itself to
/// fit. Fails if the encoded payload exceeds the buffer's fixed capacity
/// (spec.md §4.1: the buffer manager, not this codec, owns buffer sizing).
pub fn write_records(buffer: &TupleBuffer, records: &[Record]) -> Result<(), PipelineError> {
    let mut encoded = String::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| PipelineError::SerializationError(format!("record encode failed: {e}")))?;
        encoded.push_str(&line);
        encoded.push('\n');
    }
    let bytes = encoded.as_bytes();
    buffer.allocate(bytes.len())?;
    buffer.payload_mut_slice().copy_from_slice(bytes);
    buffer.set_number_of_tuples(records.len());
    Ok(())
}

/// Parses `buffer`'s payload back into records (the inverse of
/// [`write_records`]).
pub fn read_records(buffer: &TupleBuffer) -> Result<Vec<Record>, PipelineError> {
    let payload = buffer.payload_slice();
    let text = std::str::from_utf8(payload)
        .map_err(|e| PipelineError::SerializationError(format!("payload is not valid utf-8: {e}")))?;
    text.lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| PipelineError::SerializationError(format!("record decode failed: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nes_execution_domain::buffers::{MemorySegment, TupleBuffer};
    use nes_execution_domain::value_objects::OriginId;
    use std::sync::Arc;

    fn buffer(capacity: usize) -> TupleBuffer {
        let segment = Arc::new(MemorySegment::allocate(capacity, 64).unwrap());
        TupleBuffer::new(segment, OriginId::new(1), Arc::new(|_| {}))
    }

    fn record(fields: &[(&str, FieldValue)]) -> Record {
        fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn round_trips_records_through_a_buffer() {
        let records = vec![
            record(&[("id", FieldValue::Int64(1)), ("value", FieldValue::Float64(2.5))]),
            record(&[("id", FieldValue::Int64(2)), ("value", FieldValue::Float64(3.5))]),
        ];
        let buf = buffer(4096);
        write_records(&buf, &records).unwrap();
        assert_eq!(buf.number_of_tuples(), 2);

        let decoded = read_records(&buf).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn rejects_payloads_that_do_not_fit() {
        let records = vec![record(&[("id", FieldValue::Text("x".repeat(200)))])];
        let buf = buffer(32);
        assert!(write_records(&buf, &records).is_err());
    }
}
