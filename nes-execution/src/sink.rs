// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Sink plugins (spec.md §6 "sink plugin contract"): consumers of
//! whatever a query's terminal pipelines emit. Sinks write in arrival
//! order on their own queue — there is no sequence-ordering reconstruction
//! here, matching [`nes_execution_domain::Sink`]'s contract.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use nes_execution_domain::buffers::TupleBuffer;
use nes_execution_domain::{PipelineError, Sink};

use crate::record;

/// Appends every record it receives, newline-delimited JSON, to a file
/// (spec.md §8 S4 "sink contains 60 tuples total"). Buffers arrive and are
/// written in whatever order the scheduler's worker pool delivers them.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    tuples_written: Mutex<usize>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), writer: Mutex::new(None), tuples_written: Mutex::new(0) }
    }

    pub fn tuples_written(&self) -> usize {
        *self.tuples_written.lock()
    }
}

impl Sink for FileSink {
    fn setup(&self) -> Result<(), PipelineError> {
        let file = File::create(&self.path).map_err(|e| PipelineError::CannotOpenSink(e.to_string()))?;
        *self.writer.lock() = Some(BufWriter::new(file));
        Ok(())
    }

    fn write_data(&self, buffer: TupleBuffer) -> Result<(), PipelineError> {
        let records = record::read_records(&buffer)?;
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or_else(|| PipelineError::internal_error("file sink written to before setup"))?;
        for row in &records {
            let line = serde_json::to_string(row).map_err(|e| PipelineError::SerializationError(e.to_string()))?;
            writeln!(writer, "{line}").map_err(|e| PipelineError::IoError(e.to_string()))?;
        }
        *self.tuples_written.lock() += records.len();
        Ok(())
    }

    fn shutdown(&self, _graceful: bool) -> Result<(), PipelineError> {
        if let Some(writer) = self.writer.lock().as_mut() {
            writer.flush().map_err(|e| PipelineError::IoError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Logs every record it receives through `tracing` rather than persisting
/// anything — the default sink for the scenario runner's demonstration
/// output (spec.md §8 S1/S2/S3's expected-output samples).
pub struct ConsoleSink {
    label: String,
}

impl ConsoleSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl Sink for ConsoleSink {
    fn setup(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn write_data(&self, buffer: TupleBuffer) -> Result<(), PipelineError> {
        for row in record::read_records(&buffer)? {
            info!(sink = %self.label, record = ?row, "sink output");
        }
        Ok(())
    }

    fn shutdown(&self, _graceful: bool) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Used in place of `Arc<dyn Sink>` by call sites that need a concrete
/// handle to a `FileSink` (to read back `tuples_written()` after a run)
/// while still registering it with the scheduler as a trait object.
pub fn shared_file_sink(path: impl Into<PathBuf>) -> Arc<FileSink> {
    Arc::new(FileSink::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nes_execution_domain::buffers::MemorySegment;
    use nes_execution_domain::value_objects::OriginId;

    fn buffer(rows: Vec<record::Record>) -> TupleBuffer {
        let segment = Arc::new(MemorySegment::allocate(4096, 64).unwrap());
        let buf = TupleBuffer::new(segment, OriginId::new(1), Arc::new(|_| {}));
        record::write_records(&buf, &rows).unwrap();
        buf
    }

    #[test]
    fn file_sink_accumulates_tuple_counts_across_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = FileSink::new(&path);
        sink.setup().unwrap();

        let mut row = record::Record::new();
        row.insert("value".to_string(), record::FieldValue::Int64(1));
        sink.write_data(buffer(vec![row.clone(), row.clone()])).unwrap();
        sink.write_data(buffer(vec![row])).unwrap();
        sink.shutdown(true).unwrap();

        assert_eq!(sink.tuples_written(), 3);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }
}
