// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A CSV-backed [`Source`] (spec.md §8 "Testable properties" fixtures):
//! reads a fixture file once at `start`, chunks its rows into
//! `rows_per_buffer`-sized tuple buffers in file order, and stops with a
//! final `lastChunk = true` buffer the way spec.md §4.8 requires of a
//! graceful shutdown. Column names come from the CSV header row and become
//! the record field names [`crate::record`] operators key off of.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nes_execution_domain::buffers::{MemorySegment, TupleBuffer};
use nes_execution_domain::value_objects::{OriginId, SuccessorRef};
use nes_execution_domain::{BufferSink, PipelineError, Source};

use crate::record::{FieldValue, Record};

const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Source plugin that replays a CSV fixture file (spec.md §8 `window.csv`,
/// `window2.csv`) as a sequence of tuple buffers.
pub struct CsvSource {
    path: PathBuf,
    operator_id: OriginId,
    successors: Vec<SuccessorRef>,
    rows_per_buffer: usize,
    stopped: AtomicBool,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, operator_id: OriginId, successors: Vec<SuccessorRef>, rows_per_buffer: usize) -> Self {
        Self { path: path.into(), operator_id, successors, rows_per_buffer: rows_per_buffer.max(1), stopped: AtomicBool::new(false) }
    }

    fn read_rows(&self) -> Result<Vec<Record>, PipelineError> {
        read_csv(&self.path)
    }
}

/// Parses `path` into records keyed by the CSV header, interpreting every
/// field as `Int64` when it parses as one, `Float64` when it parses as a
/// float, and `Text` otherwise — the fixtures this engine ships only ever
/// carry integers, but a `Text` fallback keeps this usable with arbitrary
/// CSVs.
pub fn read_csv(path: &Path) -> Result<Vec<Record>, PipelineError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| PipelineError::IoError(e.to_string()))?;
    let headers = reader.headers().map_err(|e| PipelineError::IoError(e.to_string()))?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| PipelineError::IoError(e.to_string()))?;
        let mut row = Record::new();
        for (name, value) in headers.iter().zip(record.iter()) {
            row.insert(name.to_string(), parse_field(value));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn parse_field(value: &str) -> FieldValue {
    if let Ok(i) = value.parse::<i64>() {
        FieldValue::Int64(i)
    } else if let Ok(f) = value.parse::<f64>() {
        FieldValue::Float64(f)
    } else {
        FieldValue::Text(value.to_string())
    }
}

impl Source for CsvSource {
    fn start(&self, emit: Arc<dyn BufferSink>) -> Result<(), PipelineError> {
        let rows = self.read_rows()?;
        let chunks: Vec<&[Record]> = rows.chunks(self.rows_per_buffer).collect();
        let last_index = chunks.len().checked_sub(1);

        for (index, chunk) in chunks.into_iter().enumerate() {
            let segment = Arc::new(MemorySegment::allocate(DEFAULT_BUFFER_CAPACITY, 64)?);
            let buffer = TupleBuffer::new(segment, self.operator_id, Arc::new(|_| {}));
            crate::record::write_records(&buffer, chunk)?;
            buffer.set_sequence_number((index as u64 + 1).into());
            if Some(index) == last_index {
                buffer.set_last_chunk(true);
            }
            emit.emit_buffer(buffer)?;
        }
        Ok(())
    }

    fn stop(&self, _graceful: bool) -> Result<(), PipelineError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn fail(&self, _reason: PipelineError) -> Result<(), PipelineError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn operator_id(&self) -> OriginId {
        self.operator_id
    }

    fn executable_successors(&self) -> Vec<SuccessorRef> {
        self.successors.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;

    struct CollectingSink {
        buffers: Mutex<Vec<TupleBuffer>>,
    }

    impl BufferSink for CollectingSink {
        fn emit_buffer(&self, buffer: TupleBuffer) -> Result<(), PipelineError> {
            self.buffers.lock().push(buffer);
            Ok(())
        }
    }

    #[test]
    fn replays_csv_rows_in_chunks_with_a_terminal_last_chunk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "value,id,ts").unwrap();
        for i in 0..5 {
            writeln!(file, "{},1,{}", i, i * 100).unwrap();
        }
        let source = CsvSource::new(file.path(), OriginId::new(1), Vec::new(), 2);
        let sink = Arc::new(CollectingSink { buffers: Mutex::new(Vec::new()) });
        source.start(sink.clone()).unwrap();

        let buffers = sink.buffers.lock();
        assert_eq!(buffers.len(), 3);
        assert!(!buffers[0].last_chunk());
        assert!(buffers.last().unwrap().last_chunk());
        assert_eq!(buffers[0].number_of_tuples() + buffers[1].number_of_tuples() + buffers[2].number_of_tuples(), 5);
    }

    #[test]
    fn parses_headers_into_typed_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "value,label").unwrap();
        writeln!(file, "42,hello").unwrap();
        let rows = read_csv(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("value"), Some(&FieldValue::Int64(42)));
        assert_eq!(rows[0].get("label"), Some(&FieldValue::Text("hello".to_string())));
    }
}
