// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Buffer wire header (spec.md §6 "Buffer wire semantics") — the fixed
//! layout used when a tuple buffer is persisted or transferred across a
//! process boundary (network sink/source, spill to disk). The in-process
//! `TupleBuffer` never serializes through this type on the hot path; it
//! exists for the I/O boundary only.

use serde::{Deserialize, Serialize};

use super::tuple_buffer::TupleBuffer;
use crate::value_objects::{ChunkNumber, OriginId, SequenceNumber};
use crate::PipelineError;

/// `originId(u64) · sequenceNumber(u64) · chunkNumber(u64) · lastChunk(u8) ·
/// watermark(u64 ms) · creationTimestamp(u64 us) · numberOfTuples(u64) ·
/// payloadBytes(u64) · childBufferCount(u16)`, spec.md §6, fixed 73-byte
/// layout ahead of the payload and child-buffer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferHeader {
    pub origin_id: u64,
    pub sequence_number: u64,
    pub chunk_number: u64,
    pub last_chunk: u8,
    pub watermark_ms: u64,
    pub creation_timestamp_us: u64,
    pub number_of_tuples: u64,
    pub payload_bytes: u64,
    pub child_buffer_count: u16,
}

pub const WIRE_HEADER_LEN: usize = 8 * 7 + 1 + 2;

impl BufferHeader {
    pub fn from_buffer(buffer: &TupleBuffer) -> Self {
        Self {
            origin_id: buffer.origin_id().get(),
            sequence_number: buffer.sequence_number().get(),
            chunk_number: buffer.chunk_number().get(),
            last_chunk: buffer.last_chunk() as u8,
            watermark_ms: buffer.watermark(),
            creation_timestamp_us: buffer.creation_timestamp_us(),
            number_of_tuples: buffer.number_of_tuples() as u64,
            payload_bytes: buffer.payload_size() as u64,
            child_buffer_count: buffer.child_buffer_count() as u16,
        }
    }

    pub fn apply_to(&self, buffer: &TupleBuffer) {
        buffer.set_sequence_number(SequenceNumber::new(self.sequence_number));
        buffer.set_chunk_number(ChunkNumber::new(self.chunk_number.max(1)));
        buffer.set_last_chunk(self.last_chunk != 0);
        buffer.set_watermark(self.watermark_ms);
        buffer.set_number_of_tuples(self.number_of_tuples as usize);
        let _ = buffer.origin_id();
    }

    pub fn origin(&self) -> OriginId {
        OriginId::new(self.origin_id)
    }

    pub fn to_bytes(&self) -> [u8; WIRE_HEADER_LEN] {
        let mut out = [0u8; WIRE_HEADER_LEN];
        let mut offset = 0;
        macro_rules! put_u64 {
            ($value:expr) => {{
                out[offset..offset + 8].copy_from_slice(&$value.to_le_bytes());
                offset += 8;
            }};
        }
        put_u64!(self.origin_id);
        put_u64!(self.sequence_number);
        put_u64!(self.chunk_number);
        out[offset] = self.last_chunk;
        offset += 1;
        put_u64!(self.watermark_ms);
        put_u64!(self.creation_timestamp_us);
        put_u64!(self.number_of_tuples);
        put_u64!(self.payload_bytes);
        out[offset..offset + 2].copy_from_slice(&self.child_buffer_count.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PipelineError> {
        if bytes.len() < WIRE_HEADER_LEN {
            return Err(PipelineError::SerializationError(format!(
                "buffer header needs {WIRE_HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut offset = 0;
        macro_rules! take_u64 {
            () => {{
                let v = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
                offset += 8;
                v
            }};
        }
        let origin_id = take_u64!();
        let sequence_number = take_u64!();
        let chunk_number = take_u64!();
        let last_chunk = bytes[offset];
        offset += 1;
        let watermark_ms = take_u64!();
        let creation_timestamp_us = take_u64!();
        let number_of_tuples = take_u64!();
        let payload_bytes = take_u64!();
        let child_buffer_count = u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap());

        Ok(Self {
            origin_id,
            sequence_number,
            chunk_number,
            last_chunk,
            watermark_ms,
            creation_timestamp_us,
            number_of_tuples,
            payload_bytes,
            child_buffer_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::memory_segment::MemorySegment;
    use std::sync::Arc;

    #[test]
    fn header_round_trips_through_bytes() {
        let header = BufferHeader {
            origin_id: 7,
            sequence_number: 42,
            chunk_number: 3,
            last_chunk: 1,
            watermark_ms: 123_456,
            creation_timestamp_us: 999,
            number_of_tuples: 10,
            payload_bytes: 4096,
            child_buffer_count: 2,
        };
        let bytes = header.to_bytes();
        let back = BufferHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header, back);
    }

    #[test]
    fn header_derived_from_buffer_matches_its_fields() {
        let segment = Arc::new(MemorySegment::allocate(4096, 64).unwrap());
        let buffer = TupleBuffer::new(segment, OriginId::new(5), Arc::new(|_| {}));
        buffer.set_sequence_number(SequenceNumber::new(3));
        buffer.set_chunk_number(ChunkNumber::new(1));
        buffer.set_watermark(10);
        buffer.set_number_of_tuples(2);
        buffer.allocate(128).unwrap();

        let header = BufferHeader::from_buffer(&buffer);
        assert_eq!(header.origin_id, 5);
        assert_eq!(header.sequence_number, 3);
        assert_eq!(header.payload_bytes, 128);
    }

    #[test]
    fn from_bytes_rejects_truncated_input() {
        assert!(BufferHeader::from_bytes(&[0u8; 4]).is_err());
    }
}
